//! gridcalc - headless driver for the formula engine
//!
//! Reads JSON commands from stdin, one per line, and writes one JSON event
//! per line to stdout. Logging goes to stderr.

mod command;
mod driver;
mod exit_codes;

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use gridcalc_config::EngineSettings;
use gridcalc_engine::grid::{Grid, GridOptions};
use log::{error, info};

use driver::{Driver, Outcome};
use exit_codes::{EXIT_IO, EXIT_REJECTED, EXIT_SNAPSHOT, EXIT_SUCCESS};

#[derive(Parser)]
#[command(name = "gridcalc")]
#[command(about = "Spreadsheet formula engine driven by JSON lines on stdin")]
#[command(version)]
#[command(after_help = "\
Examples:
  echo '{\"op\":\"set\",\"cell\":\"A1\",\"text\":\"=1+2\"}' | gridcalc
  gridcalc --load book.json --save book.json < edits.jsonl
  gridcalc --strict -vv < script.jsonl
  gridcalc --write-config --config ./engine.toml")]
struct Cli {
    /// Settings file (defaults to the per-user engine.toml)
    #[arg(long, env = "GRIDCALC_CONFIG")]
    config: Option<PathBuf>,

    /// Start from this grid snapshot instead of an empty grid
    #[arg(long)]
    load: Option<PathBuf>,

    /// Write the final grid snapshot here
    #[arg(long)]
    save: Option<PathBuf>,

    /// Write the effective settings to the settings file and exit
    #[arg(long)]
    write_config: bool,

    /// Stop at the first rejected command
    #[arg(long)]
    strict: bool,

    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn grid_options(settings: &EngineSettings) -> GridOptions {
    GridOptions {
        default_rows: settings.grid.default_rows,
        default_cols: settings.grid.default_columns,
        default_sheets: settings.grid.default_sheets.clone(),
        change_threshold: settings.events.change_threshold,
        progress_min_cells: settings.recalc.progress_min_cells,
        progress_every: settings.recalc.progress_every,
    }
}

fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn load_grid(cli: &Cli, options: GridOptions) -> Result<Grid, u8> {
    let Some(path) = &cli.load else {
        return Ok(Grid::new(options));
    };
    let json = fs::read_to_string(path).map_err(|e| {
        error!("{}: {}", path.display(), e);
        EXIT_IO
    })?;
    let grid = Grid::from_json(&json, options).map_err(|e| {
        error!("{}: {}", path.display(), e);
        EXIT_SNAPSHOT
    })?;
    info!("loaded {} sheets from {}", grid.sheet_count(), path.display());
    Ok(grid)
}

fn run(cli: &Cli) -> Result<(), u8> {
    let settings = match &cli.config {
        Some(path) => EngineSettings::load_from(path),
        None => EngineSettings::load(),
    };
    if cli.write_config {
        let path = cli.config.clone().unwrap_or_else(EngineSettings::config_path);
        settings.save_to(&path).map_err(|e| {
            error!("{}: {}", path.display(), e);
            EXIT_IO
        })?;
        info!("wrote settings to {}", path.display());
        return Ok(());
    }

    let grid = load_grid(cli, grid_options(&settings))?;

    let mut driver = Driver::new(grid, cli.strict);
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let outcome = driver.run(stdin.lock(), &mut stdout).map_err(|e| {
        error!("{e}");
        EXIT_IO
    })?;
    stdout.flush().map_err(|_| EXIT_IO)?;

    if let Some(path) = &cli.save {
        let json = driver.grid.to_json().map_err(|e| {
            error!("{e}");
            EXIT_SNAPSHOT
        })?;
        fs::write(path, json).map_err(|e| {
            error!("{}: {}", path.display(), e);
            EXIT_IO
        })?;
        info!("saved snapshot to {}", path.display());
    }

    match outcome {
        Outcome::Completed => Ok(()),
        Outcome::Rejected => Err(EXIT_REJECTED),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(cli.verbose))).init();

    match run(&cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(code) => ExitCode::from(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_grid_options_follow_settings() {
        let mut settings = EngineSettings::default();
        settings.grid.default_columns = 4;
        settings.events.change_threshold = 7;

        let options = grid_options(&settings);
        assert_eq!(options.default_cols, 4);
        assert_eq!(options.change_threshold, 7);
        assert_eq!(options.default_sheets, vec!["Sheet1", "Sheet2"]);
        assert_eq!(grid_options(&EngineSettings::default()), GridOptions::default());
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter(0), "warn");
        assert_eq!(log_filter(1), "info");
        assert_eq!(log_filter(5), "debug");
    }
}
