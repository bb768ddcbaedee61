//! Replace a residue range with a homologous range from a donor structure.

use crate::core::state::StateHandle;
use crate::engine::error::EngineError;
use crate::engine::external::builder::BuildScript;
use crate::engine::external::run_engine;
use crate::engine::tasks::{require_structure, verify_consistency, TaskIo};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainSwapParams {
    pub chain: char,
    pub start: i32,
    pub end: i32,
    pub donor: PathBuf,
    pub donor_chain: char,
    pub donor_start: i32,
    pub donor_end: i32,
}

pub fn run(
    params: &DomainSwapParams,
    input: &StateHandle,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    let (topology, coordinates) = require_structure(input, io)?;
    if params.start > params.end || params.donor_start > params.donor_end {
        return Err(io.config_error("domain-swap residue ranges must be ascending"));
    }
    if !params.donor.exists() {
        return Err(io.config_error(format!(
            "swap donor file '{}' does not exist",
            params.donor.display()
        )));
    }

    let step = io.step()?;
    let script_path = step.file("in");
    let out_psf = step.file("psf");
    let out_pdb = step.file("pdb");

    let mut script = BuildScript::new();
    script
        .read_structure(Some(topology), coordinates)
        .swap_domain(
            params.chain,
            params.start,
            params.end,
            &params.donor,
            params.donor_chain,
            params.donor_start,
            params.donor_end,
        )
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
        range = format!("{}-{}", params.start, params.end),
        donor = %params.donor.display(),
        "Domain swapped."
    );

    let mut state = input.derived(step.id.clone(), step.basename().to_string());
    state.topology = Some(out_psf);
    state.coordinates = Some(out_pdb);
    Ok(state)
}
