//! Extract a scalar time series from the most recent dynamics log.
//!
//! The series is written as a two-column CSV artifact; rendering is left to
//! whatever the user points at the file.

use crate::core::state::StateHandle;
use crate::engine::error::EngineError;
use crate::engine::external::dynamics::{parse_series, LogParseError};
use crate::engine::tasks::TaskIo;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlotParams {
    /// Log column to extract, matched case-insensitively against the
    /// ETITLE header.
    #[serde(default = "default_column")]
    pub column: String,
}

fn default_column() -> String {
    "density".to_string()
}

impl Default for PlotParams {
    fn default() -> Self {
        Self {
            column: default_column(),
        }
    }
}

pub fn run(
    params: &PlotParams,
    input: &StateHandle,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    let log = input.dynamics_log.as_ref().ok_or_else(|| {
        io.precondition_error("input state has no dynamics log; run a dynamics stage first")
    })?;

    // A nonexistent column is the user's mistake; an unreadable or
    // headerless log is a corrupt engine artifact.
    let series = parse_series(log, &params.column).map_err(|e| match e {
        LogParseError::NoColumn { .. } => io.config_error(e.to_string()),
        other => EngineError::Inconsistency {
            task_index: io.task_index,
            label: io.label.to_string(),
            message: other.to_string(),
        },
    })?;

    let step = io.step()?;
    let out_csv = step.file("csv");
    let mut writer = csv::Writer::from_path(&out_csv)?;
    writer.write_record(["step", params.column.as_str()])?;
    for (ts, value) in &series {
        writer.write_record([ts.to_string(), value.to_string()])?;
    }
    writer.flush()?;

    info!(
        column = %params.column,
        points = series.len(),
        output = %out_csv.display(),
        "Series extracted."
    );

    // A plot consumes the state without changing the system.
    Ok(input.derived(step.id.clone(), step.basename().to_string()))
}
