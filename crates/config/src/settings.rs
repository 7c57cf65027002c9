//! Engine settings (~/.config/gridcalc/engine.toml)

use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot write settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// New-grid layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub default_rows: usize,
    pub default_columns: usize,
    pub default_sheets: Vec<String>,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            default_rows: 100,
            default_columns: 15,
            default_sheets: vec!["Sheet1".to_string(), "Sheet2".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    /// Changed-cell count from which a whole-view invalidate is sent
    /// instead of a cell list.
    pub change_threshold: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self { change_threshold: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecalcSettings {
    /// Passes with more dirty cells than this report progress.
    pub progress_min_cells: usize,
    pub progress_every: usize,
}

impl Default for RecalcSettings {
    fn default() -> Self {
        Self { progress_min_cells: 1000, progress_every: 1000 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub grid: GridSettings,
    pub events: EventSettings,
    pub recalc: RecalcSettings,
}

impl EngineSettings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gridcalc")
            .join("engine.toml")
    }

    /// Load settings from the default path, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load settings from `path`. A missing file gives the defaults; an
    /// unreadable or malformed one is logged and also gives the defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Error parsing {}: {}", path.display(), e);
                    warn!("Using default settings");
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save settings to `path`, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let text = toml::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}
