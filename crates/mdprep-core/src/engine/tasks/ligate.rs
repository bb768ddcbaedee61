//! Close unresolved loops left behind by a topology build.
//!
//! Each marked gap is closed in two engine moves: a steered dynamics run
//! that pulls the gap termini within bonding distance, then a builder script
//! that seals every gap into a continuous covalent chain. The output state
//! carries no unresolved loops.

use crate::core::state::StateHandle;
use crate::engine::error::EngineError;
use crate::engine::external::builder::BuildScript;
use crate::engine::external::dynamics::{MdRunConfig, MdStage};
use crate::engine::external::run_engine;
use crate::engine::tasks::{require_structure, verify_consistency, TaskIo};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LigateParams {
    /// Steps of the steering pull per gap.
    #[serde(default = "default_pull_steps")]
    pub pull_steps: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_pull_steps() -> u32 {
    2000
}

fn default_temperature() -> f64 {
    310.0
}

impl Default for LigateParams {
    fn default() -> Self {
        Self {
            pull_steps: default_pull_steps(),
            temperature: default_temperature(),
        }
    }
}

pub fn run(
    params: &LigateParams,
    input: &StateHandle,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    if input.unresolved_loops.is_empty() {
        return Err(io.precondition_error(
            "input state has no unresolved loops; declare gaps in build-topology first",
        ));
    }
    let (topology, _) = require_structure(input, io)?;
    let topology = topology.to_path_buf();
    let mut coordinates = input.coordinates.clone().ok_or_else(|| {
        io.precondition_error("input state has no coordinates")
    })?;

    // One steered pull per gap; each pull starts from the previous pull's
    // output coordinates.
    let stage = MdStage::nvt(params.pull_steps, params.temperature);
    for marker in &input.unresolved_loops {
        let step = io.step()?;
        let config = MdRunConfig {
            stage: &stage,
            topology: &topology,
            coordinates: &coordinates,
            boxfile: input.boxfile.as_deref(),
            output_basename: step.basename().to_string(),
            steering: Some((
                format!("{}:{}", marker.chain, marker.start_resid),
                format!("{}:{}", marker.chain, marker.end_resid),
            )),
        };
        let config_path = step.file("conf");
        config.write_to(&config_path)?;
        let log_path = step.file("log");
        let invocation =
            config.invocation(&io.ctx.engines.dynamics, &config_path, io.ctx.workdir, &log_path);
        run_engine(io.ctx.launcher, &invocation).map_err(|e| io.engine_failure(e))?;

        let coor = config.output_coordinates(io.ctx.workdir);
        info!(
            chain = %marker.chain,
            start = marker.start_resid,
            end = marker.end_resid,
            "Gap termini pulled together."
        );
        coordinates = coor;
    }

    // Seal all gaps in one builder pass.
    let step = io.step()?;
    let script_path = step.file("in");
    let out_psf = step.file("psf");
    let out_pdb = step.file("pdb");

    let mut script = BuildScript::new();
    script.read_structure(Some(&topology), &coordinates);
    for marker in &input.unresolved_loops {
        script.ligate(marker.chain, marker.start_resid, marker.end_resid);
    }
    script.write_outputs(&out_psf, &out_pdb);
    script.write_to(&script_path)?;

    let invocation = BuildScript::invocation(
        &io.ctx.engines.builder,
        &script_path,
        io.ctx.workdir,
        vec![out_psf.clone(), out_pdb.clone()],
    );
    run_engine(io.ctx.launcher, &invocation).map_err(|e| io.engine_failure(e))?;

    let atoms = verify_consistency(&out_psf, &out_pdb, io)?;
    info!(atoms, loops = input.unresolved_loops.len(), "Loops ligated.");

    let mut state = input.derived(step.id.clone(), step.basename().to_string());
    state.topology = Some(out_psf);
    state.coordinates = Some(out_pdb);
    state.unresolved_loops.clear();
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::LoopMarker;
    use crate::engine::tasks::tests_support::TestHarness;

    fn gapped_input(harness: &TestHarness) -> StateHandle {
        let mut state = StateHandle::seed();
        state.topology = Some(harness.write_psf("sys.psf", 12));
        state.coordinates = Some(harness.write_pdb("sys.pdb", 12, &['A']));
        state.unresolved_loops = vec![
            LoopMarker {
                chain: 'A',
                start_resid: 70,
                end_resid: 75,
            },
            LoopMarker {
                chain: 'A',
                start_resid: 120,
                end_resid: 124,
            },
        ];
        state
    }

    #[test]
    fn pulls_each_gap_then_seals() {
        let harness = TestHarness::new();
        let input = gapped_input(&harness);
        let state = harness
            .with_io("ligate", 2, |io| run(&LigateParams::default(), &input, io))
            .unwrap();
        assert!(state.unresolved_loops.is_empty());
        assert!(state.topology.unwrap().ends_with("00-02-02_ligate.psf"));
        // Two steered pulls plus one builder seal.
        assert_eq!(harness.launcher.launches(), 3);

        let seal = std::fs::read_to_string(harness.workdir().join("00-02-02_ligate.in")).unwrap();
        assert!(seal.contains("ligate A 70 75"));
        assert!(seal.contains("ligate A 120 124"));

        let pull = std::fs::read_to_string(harness.workdir().join("00-02-00_ligate.conf")).unwrap();
        assert!(pull.contains("steer A:70 A:75"));
    }

    #[test]
    fn no_gaps_is_a_precondition_error() {
        let harness = TestHarness::new();
        let mut input = StateHandle::seed();
        input.topology = Some(harness.write_psf("sys.psf", 12));
        input.coordinates = Some(harness.write_pdb("sys.pdb", 12, &['A']));
        let err = harness
            .with_io("ligate", 0, |io| run(&LigateParams::default(), &input, io))
            .unwrap_err();
        assert!(matches!(err, EngineError::Precondition { .. }));
    }
}
