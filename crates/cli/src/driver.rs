//! Reads commands line by line, applies them to one grid and writes one JSON
//! event per line.

use std::fs;
use std::io::{self, BufRead, Write};

use gridcalc_engine::events::{ChangedCell, GridEvent};
use gridcalc_engine::grid::Grid;
use gridcalc_engine::recalc::RecalcHooks;
use log::{info, warn};
use serde::Serialize;

use crate::command::Command;

/// Replies that are not grid events. Same `event`/`data` shape.
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum Reply<'a> {
    Cell(ChangedCell),
    Saved(&'a str),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Stopped at the first rejected command (strict mode only).
    Rejected,
}

pub struct Driver {
    pub grid: Grid,
    strict: bool,
}

fn emit<W: Write, T: Serialize>(out: &mut W, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    out.write_all(b"\n")
}

impl Driver {
    pub fn new(grid: Grid, strict: bool) -> Self {
        Self { grid, strict }
    }

    /// Run every command in `input`. Blank lines and `#` comments are skipped.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> io::Result<Outcome> {
        for (number, line) in input.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if let Err(message) = self.handle(trimmed, out)? {
                warn!("line {}: {}", number + 1, message);
                emit(out, &Reply::Error(message))?;
                if self.strict {
                    out.flush()?;
                    return Ok(Outcome::Rejected);
                }
            }
            out.flush()?;
        }
        Ok(Outcome::Completed)
    }

    /// Handle one command. The outer error is an output failure, the inner
    /// one a rejected command.
    fn handle<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<Result<(), String>> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(message) => return Ok(Err(message)),
        };

        match &command {
            Command::Get { cell, sheet } => {
                return match self.grid.resolve_cell(cell, *sheet) {
                    Ok(id) => emit(out, &Reply::Cell(ChangedCell::from_grid(&self.grid, id))).map(Ok),
                    Err(e) => Ok(Err(e.to_string())),
                };
            }
            Command::Save { path } => {
                let written = self
                    .grid
                    .to_json()
                    .map_err(|e| e.to_string())
                    .and_then(|json| fs::write(path, json).map_err(|e| format!("{path}: {e}")));
                return match written {
                    Ok(()) => {
                        info!("saved snapshot to {path}");
                        emit(out, &Reply::Saved(path)).map(Ok)
                    }
                    Err(message) => Ok(Err(message)),
                };
            }
            Command::Import { rows, sheet } => {
                return match self.grid.import_rows(*sheet, rows) {
                    Ok(result) => emit(out, &result.event(&self.grid)).map(Ok),
                    Err(e) => Ok(Err(e.to_string())),
                };
            }
            _ => {}
        }

        let intent = match command.to_intent(&self.grid) {
            Ok(Some(intent)) => intent,
            Ok(None) => return Ok(Ok(())),
            Err(e) => return Ok(Err(e.to_string())),
        };

        let mut write_error = None;
        let applied = {
            let mut progress = |fraction: f64| {
                if write_error.is_none() {
                    if let Err(e) = emit(out, &GridEvent::Progress(fraction)) {
                        write_error = Some(e);
                    }
                }
            };
            let hooks = RecalcHooks { progress: Some(&mut progress), cancel: None };
            self.grid.apply_with(intent, hooks)
        };
        if let Some(e) = write_error {
            return Err(e);
        }

        match applied {
            Ok(result) => {
                if let Some(cycle) = &result.report.cycle {
                    info!("{cycle}");
                }
                emit(out, &result.event(&self.grid)).map(Ok)
            }
            Err(e) => Ok(Err(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcalc_engine::grid::GridOptions;
    use serde_json::Value;

    fn run(driver: &mut Driver, script: &str) -> (Outcome, Vec<Value>) {
        let mut out = Vec::new();
        let outcome = driver.run(script.as_bytes(), &mut out).unwrap();
        let lines = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (outcome, lines)
    }

    #[test]
    fn test_set_reports_changed_cells() {
        let mut driver = Driver::new(Grid::default(), false);
        let (outcome, lines) = run(
            &mut driver,
            r#"{"op":"set","cell":"A1","text":"3"}
{"op":"set","cell":"A2","text":"=A1*2"}
{"op":"set","cell":"A1","text":"5"}
"#,
        );

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2]["event"], "changed");
        let displays: Vec<&str> = lines[2]["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["display"].as_str().unwrap())
            .collect();
        assert_eq!(displays, vec!["5", "10"]);
    }

    #[test]
    fn test_get_and_comments() {
        let mut driver = Driver::new(Grid::default(), false);
        let (_, lines) = run(
            &mut driver,
            r#"# setup
{"op":"set","cell":"Sheet2!B1","text":"=1+1"}

{"op":"get","cell":"B1","sheet":1}
"#,
        );

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["event"], "cell");
        assert_eq!(lines[1]["data"]["display"], "2");
        assert_eq!(lines[1]["data"]["sheet"], 1);
    }

    #[test]
    fn test_errors_continue_unless_strict() {
        let script = r#"not json
{"op":"set","cell":"ZZ999","text":"1"}
{"op":"set","cell":"A1","text":"1"}
"#;
        let mut lenient = Driver::new(Grid::default(), false);
        let (outcome, lines) = run(&mut lenient, script);
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["event"], "error");
        assert_eq!(lines[1]["event"], "error");
        assert_eq!(lines[2]["event"], "changed");

        let mut strict = Driver::new(Grid::default(), true);
        let (outcome, lines) = run(&mut strict, script);
        assert_eq!(outcome, Outcome::Rejected);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_structural_edit_invalidates() {
        let mut driver = Driver::new(Grid::default(), false);
        let (_, lines) = run(&mut driver, r#"{"op":"add_sheet","name":"Data"}"#);
        assert_eq!(lines[0], serde_json::json!({ "event": "invalidate" }));
        assert_eq!(driver.grid.sheet_count(), 3);
    }

    #[test]
    fn test_progress_events_precede_change() {
        let options = GridOptions { progress_min_cells: 1, progress_every: 1, change_threshold: 10, ..Default::default() };
        let mut driver = Driver::new(Grid::new(options), false);
        let (_, lines) = run(
            &mut driver,
            r#"{"op":"batch","cells":["A1","A2"],"texts":["1","=A1+1"]}"#,
        );

        let kinds: Vec<&str> = lines.iter().map(|l| l["event"].as_str().unwrap()).collect();
        assert_eq!(kinds, vec!["progress", "progress", "changed"]);
        assert_eq!(lines[1]["data"], 1.0);
    }

    #[test]
    fn test_import_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");
        let script = format!(
            "{}\n{}\n",
            r#"{"op":"import","rows":[["1","2"],["3","4"]]}"#,
            serde_json::json!({ "op": "save", "path": path.to_str().unwrap() }),
        );

        let mut driver = Driver::new(Grid::default(), false);
        let (_, lines) = run(&mut driver, &script);
        assert_eq!(lines[0]["event"], "invalidate");
        assert_eq!(lines[1]["event"], "saved");

        let restored = Grid::from_json(&fs::read_to_string(&path).unwrap(), GridOptions::default()).unwrap();
        assert_eq!(restored.bounding_rectangle(0), (2, 2));
    }
}
