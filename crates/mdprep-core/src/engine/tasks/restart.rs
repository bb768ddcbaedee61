//! Rebuild a state handle from artifacts of an earlier run.
//!
//! A restart is the only task that accepts arbitrary files into the state.
//! Everything it admits is verified the same way a build would be: the
//! connectivity and coordinates must agree on the atom count, and the chain
//! map is rebuilt from what the coordinates actually contain.

use crate::core::state::StateHandle;
use crate::core::structure::coordinate_summary;
use crate::engine::error::EngineError;
use crate::engine::tasks::{verify_consistency, TaskIo};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestartParams {
    pub topology: PathBuf,
    pub coordinates: PathBuf,
    #[serde(default)]
    pub boxfile: Option<PathBuf>,
}

// The incoming state is deliberately discarded: a restart replaces it
// wholesale with what the artifacts describe.
pub fn run(
    params: &RestartParams,
    _input: &StateHandle,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    for (name, path) in [
        ("topology", Some(&params.topology)),
        ("coordinates", Some(&params.coordinates)),
        ("boxfile", params.boxfile.as_ref()),
    ] {
        if let Some(path) = path {
            if !path.exists() {
                return Err(io.config_error(format!(
                    "restart {name} file '{}' does not exist",
                    path.display()
                )));
            }
        }
    }

    let atoms = verify_consistency(&params.topology, &params.coordinates, io)?;
    let summary = coordinate_summary(&params.coordinates)?;

    let step = io.step()?;
    info!(
        atoms,
        chains = summary.chain_ids.len(),
        topology = %params.topology.display(),
        "State restored from artifacts."
    );

    let mut state = StateHandle::seed().derived(step.id.clone(), step.basename().to_string());
    state.topology = Some(params.topology.clone());
    state.coordinates = Some(params.coordinates.clone());
    state.boxfile = params.boxfile.clone();
    for chain in &summary.chain_ids {
        state.chain_map.insert(*chain, chain.to_string());
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tasks::tests_support::TestHarness;

    #[test]
    fn hydrates_a_state_from_files() {
        let harness = TestHarness::new();
        let params = RestartParams {
            topology: harness.write_psf("old.psf", 12),
            coordinates: harness.write_pdb("old.pdb", 12, &['A', 'B']),
            boxfile: Some(harness.write_xsc("old.xsc", 40.0, 40.0, 90.0)),
        };
        let state = harness
            .with_io("restart", 0, |io| run(&params, &StateHandle::seed(), io))
            .unwrap();
        assert!(state.has_structure());
        assert!(state.boxfile.is_some());
        assert_eq!(state.chain_map.len(), 2);
        assert_eq!(state.basename, "00-00-00_restart");
    }

    #[test]
    fn mismatched_files_are_an_inconsistency() {
        let harness = TestHarness::new();
        let params = RestartParams {
            topology: harness.write_psf("old.psf", 20),
            coordinates: harness.write_pdb("old.pdb", 12, &['A']),
            boxfile: None,
        };
        let err = harness
            .with_io("restart", 0, |io| run(&params, &StateHandle::seed(), io))
            .unwrap_err();
        assert!(matches!(err, EngineError::Inconsistency { .. }));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let harness = TestHarness::new();
        let params = RestartParams {
            topology: PathBuf::from("/nope/old.psf"),
            coordinates: PathBuf::from("/nope/old.pdb"),
            boxfile: None,
        };
        let err = harness
            .with_io("restart", 0, |io| run(&params, &StateHandle::seed(), io))
            .unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }
}
