//! Fetch a starting structure into the run's namespace.
//!
//! Either copies a caller-supplied local file or delegates retrieval of a
//! database accession to the fetch collaborator. The result is a
//! coordinates-only seed state; connectivity comes later from
//! build-topology.

use crate::core::state::StateHandle;
use crate::core::structure::coordinate_summary;
use crate::engine::error::EngineError;
use crate::engine::external::{run_engine, EngineKind, Invocation};
use crate::engine::tasks::TaskIo;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchParams {
    /// Database accession, e.g. a four-character PDB id or an AlphaFold
    /// model id. Ignored when `source` is given.
    #[serde(default)]
    pub id: Option<String>,
    /// Local structure file to use instead of a remote fetch.
    #[serde(default)]
    pub source: Option<PathBuf>,
}

pub(crate) fn preflight(params: &FetchParams, task_index: usize) -> Result<(), EngineError> {
    match (&params.id, &params.source) {
        (None, None) => Err(EngineError::Config {
            task_index,
            message: "fetch requires either 'id' or 'source'".into(),
        }),
        (Some(_), Some(_)) => Err(EngineError::Config {
            task_index,
            message: "fetch directives 'id' and 'source' are mutually exclusive".into(),
        }),
        _ => Ok(()),
    }
}

pub fn run(
    params: &FetchParams,
    input: &StateHandle,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    preflight(params, io.task_index)?;

    let step = io.step()?;
    let destination = step.file("pdb");

    match (&params.source, &params.id) {
        (Some(source), _) => {
            info!(source = %source.display(), "Copying local structure.");
            std::fs::copy(source, &destination)?;
        }
        (None, Some(id)) => {
            let url = format!("https://files.rcsb.org/download/{id}.pdb");
            info!(%url, "Fetching structure.");
            let invocation = Invocation {
                engine: EngineKind::Fetch,
                program: io.ctx.engines.fetch.clone(),
                args: vec![
                    "-sf".to_string(),
                    url,
                    "-o".to_string(),
                    destination.display().to_string(),
                ],
                stdin_file: None,
                stdout_file: None,
                workdir: io.ctx.workdir.to_path_buf(),
                expected_outputs: vec![destination.clone()],
            };
            run_engine(io.ctx.launcher, &invocation).map_err(|e| io.engine_failure(e))?;
        }
        (None, None) => unreachable!("rejected by preflight"),
    }

    let summary = coordinate_summary(&destination)?;
    info!(
        atoms = summary.atom_count,
        chains = summary.chain_ids.len(),
        "Structure fetched."
    );

    let mut state = input.derived(step.id.clone(), step.basename().to_string());
    state.coordinates = Some(destination);
    state.topology = None;
    for chain in &summary.chain_ids {
        state.chain_map.insert(*chain, chain.to_string());
    }
    Ok(state)
}
