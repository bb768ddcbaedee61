//! Fail-closed sanity checks on the current state.
//!
//! Every check runs and every failure is collected before the verdict, so a
//! broken state reports all of its problems at once. With `warn_only` the
//! failures are logged and the pipeline continues.

use crate::core::state::StateHandle;
use crate::core::structure::{coordinate_summary, topology_atom_count};
use crate::engine::error::EngineError;
use crate::engine::tasks::TaskIo;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateParams {
    /// Minimum atom count the system must reach.
    #[serde(default)]
    pub min_atoms: Option<usize>,
    /// Require an established periodic cell.
    #[serde(default)]
    pub require_box: bool,
    /// Log failures instead of stopping the pipeline.
    #[serde(default)]
    pub warn_only: bool,
}

pub fn run(
    params: &ValidateParams,
    input: &StateHandle,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    let mut failures = Vec::new();

    match (&input.topology, &input.coordinates) {
        (Some(topology), Some(coordinates)) => {
            let topo_atoms = topology_atom_count(topology)?;
            let summary = coordinate_summary(coordinates)?;
            if topo_atoms != summary.atom_count {
                failures.push(format!(
                    "connectivity describes {topo_atoms} atoms but coordinates describe {}",
                    summary.atom_count
                ));
            }
            if let Some(min_atoms) = params.min_atoms {
                if summary.atom_count < min_atoms {
                    failures.push(format!(
                        "system has {} atoms, below the required minimum of {min_atoms}",
                        summary.atom_count
                    ));
                }
            }
            for chain in &summary.chain_ids {
                if !input.chain_map.contains_key(chain) {
                    failures.push(format!(
                        "coordinate chain '{chain}' is missing from the chain map"
                    ));
                }
            }
        }
        _ => failures.push("state has no connectivity/coordinate pair".to_string()),
    }

    if params.require_box && input.boxfile.is_none() {
        failures.push("state has no periodic cell".to_string());
    }
    if !input.unresolved_loops.is_empty() {
        failures.push(format!(
            "{} unresolved loop(s) await ligation",
            input.unresolved_loops.len()
        ));
    }

    if failures.is_empty() {
        info!("Validation passed.");
    } else if params.warn_only {
        for failure in &failures {
            warn!(task = io.task_index, "Validation: {failure}");
        }
    } else {
        return Err(EngineError::Validation {
            task_index: io.task_index,
            failures,
        });
    }

    let step = io.step()?;
    Ok(input.derived(step.id.clone(), step.basename().to_string()))
}
