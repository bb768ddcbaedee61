//! Build connectivity from raw coordinates, applying topology edits.
//!
//! This is the gateway from a coordinates-only state to a full
//! connectivity/coordinate pair. All edits of one build run in a single
//! builder script so the engine sees them atomically; gaps declared here
//! surface as unresolved loop markers on the output state for a later
//! ligation.

use crate::core::chains::ChainIdAllocator;
use crate::core::state::{LoopMarker, StateHandle};
use crate::engine::error::EngineError;
use crate::engine::external::builder::BuildScript;
use crate::engine::external::run_engine;
use crate::engine::tasks::{verify_consistency, TaskIo};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mutation {
    pub chain: char,
    pub resid: i32,
    /// Three-letter residue name to mutate to.
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Deletion {
    pub chain: char,
    pub start: i32,
    pub end: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Insertion {
    pub chain: char,
    /// Residue after which the sequence is spliced in.
    pub after: i32,
    /// One-letter amino-acid sequence.
    pub sequence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Disulfide {
    pub chain_a: char,
    pub resid_a: i32,
    pub chain_b: char,
    pub resid_b: i32,
}

/// A donor fragment (typically a glycan) attached to an anchor residue. The
/// fragment lands in a freshly allocated chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Graft {
    pub donor: PathBuf,
    pub donor_chain: char,
    pub at_chain: char,
    pub at_resid: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildTopologyParams {
    #[serde(default)]
    pub mutations: Vec<Mutation>,
    #[serde(default)]
    pub deletions: Vec<Deletion>,
    #[serde(default)]
    pub insertions: Vec<Insertion>,
    #[serde(default)]
    pub disulfides: Vec<Disulfide>,
    #[serde(default)]
    pub grafts: Vec<Graft>,
    /// Gaps the build deliberately leaves open for ligation.
    #[serde(default)]
    pub gaps: Vec<LoopMarker>,
}

pub fn run(
    params: &BuildTopologyParams,
    input: &StateHandle,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    let coordinates = input
        .coordinates
        .as_ref()
        .ok_or_else(|| io.precondition_error("input state has no coordinates; run fetch first"))?;

    for graft in &params.grafts {
        if !graft.donor.exists() {
            return Err(io.config_error(format!(
                "graft donor file '{}' does not exist",
                graft.donor.display()
            )));
        }
    }

    let step = io.step()?;
    let script_path = step.file("in");
    let out_psf = step.file("psf");
    let out_pdb = step.file("pdb");

    let mut allocator = ChainIdAllocator::seeded_from(&input.chain_map);
    let mut grafted_chains = Vec::with_capacity(params.grafts.len());

    let mut script = BuildScript::new();
    script.read_structure(input.topology.as_deref(), coordinates);
    for mutation in &params.mutations {
        script.mutate(mutation.chain, mutation.resid, &mutation.to);
    }
    for deletion in &params.deletions {
        script.delete_range(deletion.chain, deletion.start, deletion.end);
    }
    for insertion in &params.insertions {
        script.insert(insertion.chain, insertion.after, &insertion.sequence);
    }
    for bond in &params.disulfides {
        script.disulfide(bond.chain_a, bond.resid_a, bond.chain_b, bond.resid_b);
    }
    for graft in &params.grafts {
        let new_chain = allocator.allocate()?;
        script.graft(
            &graft.donor,
            graft.donor_chain,
            graft.at_chain,
            graft.at_resid,
            new_chain,
        );
        grafted_chains.push(new_chain);
    }
    for gap in &params.gaps {
        script.mark_gap(gap.chain, gap.start_resid, gap.end_resid);
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
    info!(
        atoms,
        gaps = params.gaps.len(),
        grafts = grafted_chains.len(),
        "Topology built."
    );

    let mut state = input.derived(step.id.clone(), step.basename().to_string());
    state.topology = Some(out_psf);
    state.coordinates = Some(out_pdb);
    for chain in grafted_chains {
        state.chain_map.insert(chain, format!("GLY{chain}"));
    }
    state.unresolved_loops.extend(params.gaps.iter().cloned());
    Ok(state)
}
