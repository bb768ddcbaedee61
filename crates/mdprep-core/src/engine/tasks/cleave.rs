//! Split a chain at a proteolytic site.
//!
//! The downstream half of the cleaved chain becomes a new chain with a
//! freshly allocated identifier; connectivity and coordinates are rewritten
//! by the builder in one pass.

use crate::core::chains::ChainIdAllocator;
use crate::core::state::StateHandle;
use crate::engine::error::EngineError;
use crate::engine::external::builder::BuildScript;
use crate::engine::external::run_engine;
use crate::engine::tasks::{require_structure, verify_consistency, TaskIo};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleaveParams {
    pub chain: char,
    /// Last residue of the upstream fragment; the peptide bond to the next
    /// residue is broken.
    pub at_resid: i32,
}

pub fn run(
    params: &CleaveParams,
    input: &StateHandle,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    let (topology, coordinates) = require_structure(input, io)?;
    if !input.chain_map.contains_key(&params.chain) {
        return Err(io.config_error(format!(
            "cleave targets chain '{}' which is not present in the system",
            params.chain
        )));
    }

    let mut allocator = ChainIdAllocator::seeded_from(&input.chain_map);
    let new_chain = allocator.allocate()?;

    let step = io.step()?;
    let script_path = step.file("in");
    let out_psf = step.file("psf");
    let out_pdb = step.file("pdb");

    let mut script = BuildScript::new();
    script
        .read_structure(Some(topology), coordinates)
        .cleave(params.chain, params.at_resid, new_chain)
        .write_outputs(&out_psf, &out_pdb);
    script.write_to(&script_path)?;

    let invocation = BuildScript::invocation(
        &io.ctx.engines.builder,
        &script_path,
        io.ctx.workdir,
        vec![out_psf.clone(), out_pdb.clone()],
    );
    run_engine(io.ctx.launcher, &invocation).map_err(|e| io.engine_failure(e))?;

    let atoms = verify_consistency(&out_psf, &out_pdb, io)?;
    info!(
        atoms,
        chain = %params.chain,
        at = params.at_resid,
        new_chain = %new_chain,
        "Chain cleaved."
    );

    let mut state = input.derived(step.id.clone(), step.basename().to_string());
    state.topology = Some(out_psf);
    state.coordinates = Some(out_pdb);
    state.chain_map.insert(new_chain, new_chain.to_string());
    Ok(state)
}
