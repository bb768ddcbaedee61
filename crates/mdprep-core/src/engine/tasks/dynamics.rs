//! Run one dynamics stage against the current state.
//!
//! NPT requires an established periodic cell; minimization and NVT run with
//! or without one. The output state points at the engine's updated
//! coordinates, its updated box file when the input had a cell, and the run
//! log for later series extraction.

use crate::core::state::StateHandle;
use crate::engine::error::EngineError;
use crate::engine::external::dynamics::{Ensemble, MdRunConfig, MdStage};
use crate::engine::external::run_engine;
use crate::engine::tasks::{require_structure, TaskIo};
use tracing::info;

pub fn run(
    stage: &MdStage,
    input: &StateHandle,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    let (topology, coordinates) = require_structure(input, io)?;
    if stage.steps == 0 {
        return Err(io.config_error("run-dynamics requires a non-zero step count"));
    }
    if stage.ensemble == Ensemble::Npt && input.boxfile.is_none() {
        return Err(io.precondition_error(
            "NPT dynamics needs a periodic cell; solvate or restart with a box file first",
        ));
    }

    let step = io.step()?;
    let config = MdRunConfig {
        stage,
        topology,
        coordinates,
        boxfile: input.boxfile.as_deref(),
        output_basename: step.basename().to_string(),
        steering: None,
    };
    let config_path = step.file("conf");
    config.write_to(&config_path)?;
    let log_path = step.file("log");

    let invocation =
        config.invocation(&io.ctx.engines.dynamics, &config_path, io.ctx.workdir, &log_path);
    run_engine(io.ctx.launcher, &invocation).map_err(|e| io.engine_failure(e))?;

    info!(
        ensemble = stage.ensemble_name(),
        steps = stage.steps,
        "Dynamics stage finished."
    );

    let mut state = input.derived(step.id.clone(), step.basename().to_string());
    state.coordinates = Some(config.output_coordinates(io.ctx.workdir));
    if let Some(xsc) = config.output_boxfile(io.ctx.workdir) {
        state.boxfile = Some(xsc);
    }
    state.dynamics_log = Some(log_path);
    Ok(state)
}
