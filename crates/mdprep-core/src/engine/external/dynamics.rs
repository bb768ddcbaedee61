//! Run-configuration writer and log parsing for the MD engine.
//!
//! The MD engine consumes a key-value run configuration referencing the
//! current connectivity, coordinate, and (optionally) box files, and emits
//! updated coordinates, an updated box file, and a log. The orchestrator
//! parses the log only for scalar time series (ETITLE/ENERGY rows) on behalf
//! of the plotting collaborator.

use crate::engine::external::{EngineKind, Invocation};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogParseError {
    #[error("failed to read dynamics log '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dynamics log '{path}' has no ETITLE header")]
    NoHeader { path: String },

    #[error("column '{column}' not present in dynamics log '{path}'")]
    NoColumn { column: String, path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensemble {
    Minimize,
    Nvt,
    Npt,
}

/// One stage of a dynamics protocol; doubles as the parameter set of the
/// `run-dynamics` task kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MdStage {
    pub ensemble: Ensemble,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Target pressure in bar; only meaningful for NPT.
    #[serde(default)]
    pub pressure: Option<f64>,
}

fn default_steps() -> u32 {
    1000
}

fn default_temperature() -> f64 {
    310.0
}

impl MdStage {
    pub fn minimize(steps: u32) -> Self {
        Self {
            ensemble: Ensemble::Minimize,
            steps,
            temperature: default_temperature(),
            pressure: None,
        }
    }

    pub fn nvt(steps: u32, temperature: f64) -> Self {
        Self {
            ensemble: Ensemble::Nvt,
            steps,
            temperature,
            pressure: None,
        }
    }

    pub fn npt(steps: u32, temperature: f64, pressure: f64) -> Self {
        Self {
            ensemble: Ensemble::Npt,
            steps,
            temperature,
            pressure: Some(pressure),
        }
    }

    pub fn ensemble_name(&self) -> &'static str {
        match self.ensemble {
            Ensemble::Minimize => "minimize",
            Ensemble::Nvt => "nvt",
            Ensemble::Npt => "npt",
        }
    }
}

/// A run configuration for one engine invocation.
#[derive(Debug, Clone)]
pub struct MdRunConfig<'a> {
    pub stage: &'a MdStage,
    pub topology: &'a Path,
    pub coordinates: &'a Path,
    pub boxfile: Option<&'a Path>,
    /// Basename the engine writes its outputs under.
    pub output_basename: String,
    /// Steering restraints for ligation pulls: (chain, resid) pairs drawn
    /// together over the run.
    pub steering: Option<(String, String)>,
}

impl<'a> MdRunConfig<'a> {
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("structure {}", self.topology.display()),
            format!("coordinates {}", self.coordinates.display()),
        ];
        if let Some(boxfile) = self.boxfile {
            lines.push(format!("extendedSystem {}", boxfile.display()));
        }
        lines.push(format!("outputName {}", self.output_basename));
        lines.push(format!("temperature {}", self.stage.temperature));
        match self.stage.ensemble {
            Ensemble::Minimize => {
                lines.push(format!("minimize {}", self.stage.steps));
            }
            Ensemble::Nvt => {
                lines.push(format!("run {}", self.stage.steps));
            }
            Ensemble::Npt => {
                lines.push("langevinPiston on".to_string());
                lines.push(format!(
                    "langevinPistonTarget {}",
                    self.stage.pressure.unwrap_or(1.01325)
                ));
                lines.push(format!("run {}", self.stage.steps));
            }
        }
        if let Some((from, to)) = &self.steering {
            lines.push(format!("steer {from} {to}"));
        }
        let mut body = lines.join("\n");
        body.push('\n');
        body
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.render())
    }

    /// Updated coordinates the engine leaves behind under the output
    /// basename.
    pub fn output_coordinates(&self, workdir: &Path) -> PathBuf {
        workdir.join(format!("{}.coor", self.output_basename))
    }

    /// Updated box file. The engine only writes one when the run was given
    /// an `extendedSystem`; a cell-less minimization or NVT run emits none.
    pub fn output_boxfile(&self, workdir: &Path) -> Option<PathBuf> {
        self.boxfile
            .map(|_| workdir.join(format!("{}.xsc", self.output_basename)))
    }

    pub fn invocation(
        &self,
        program: &Path,
        config_path: &Path,
        workdir: &Path,
        log_path: &Path,
    ) -> Invocation {
        let mut expected_outputs = vec![self.output_coordinates(workdir)];
        if let Some(xsc) = self.output_boxfile(workdir) {
            expected_outputs.push(xsc);
        }
        Invocation {
            engine: EngineKind::Dynamics,
            program: program.to_path_buf(),
            args: vec![config_path.display().to_string()],
            stdin_file: None,
            stdout_file: Some(log_path.to_path_buf()),
            workdir: workdir.to_path_buf(),
            expected_outputs,
        }
    }
}

/// Extract the time series of one log column from ETITLE/ENERGY rows.
pub fn parse_series(path: &Path, column: &str) -> Result<Vec<(u64, f64)>, LogParseError> {
    let text = fs::read_to_string(path).map_err(|source| LogParseError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let mut column_index: Option<usize> = None;
    let mut saw_header = false;
    let mut series = Vec::new();

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("ETITLE:") {
            saw_header = true;
            column_index = rest
                .split_whitespace()
                .position(|title| title.eq_ignore_ascii_case(column));
        } else if let Some(rest) = line.strip_prefix("ENERGY:") {
            let Some(idx) = column_index else { continue };
            let fields: Vec<&str> = rest.split_whitespace().collect();
            let step = fields.first().and_then(|f| f.parse::<u64>().ok());
            let value = fields.get(idx).and_then(|f| f.parse::<f64>().ok());
            if let (Some(step), Some(value)) = (step, value) {
                series.push((step, value));
            }
        }
    }

    if !saw_header {
        return Err(LogParseError::NoHeader {
            path: path.display().to_string(),
        });
    }
    if column_index.is_none() {
        return Err(LogParseError::NoColumn {
            column: column.to_string(),
            path: path.display().to_string(),
        });
    }
    Ok(series)
}
