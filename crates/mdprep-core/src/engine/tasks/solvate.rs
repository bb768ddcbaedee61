//! Solvate the system in a padded rectangular water box, and the inverse
//! operation that strips solvent again.
//!
//! Solvation is a packing run followed by a builder merge: the packer fills
//! the padded bounding box of the solute with water (and any requested ions),
//! the builder folds the packed coordinates into the connectivity, and the
//! resulting periodic cell is recorded as the state's box file. Water lands
//! in segment `WAT`, ions in segment `ION`; desolvation removes exactly
//! those segments.

use crate::core::boxfile::BoxVectors;
use crate::core::chains::ChainIdAllocator;
use crate::core::state::StateHandle;
use crate::core::structure::coordinate_summary;
use crate::engine::error::EngineError;
use crate::engine::external::builder::BuildScript;
use crate::engine::external::packing::{PackingSpec, Region};
use crate::engine::external::run_engine;
use crate::engine::tasks::{require_structure, verify_consistency, TaskIo};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Segment id the packed water is merged under.
pub const WATER_SEGMENT: &str = "WAT";
/// Segment id packed ions are merged under.
pub const ION_SEGMENT: &str = "ION";

/// Number density of liquid water in molecules per cubic Angstrom.
const WATER_DENSITY: f64 = 0.0334;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IonSpec {
    pub template: PathBuf,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolvateParams {
    /// Padding in Angstroms added around the solute's bounding box.
    #[serde(default = "default_padding")]
    pub padding: f64,
    /// Single-molecule water template for the packer.
    pub water_template: PathBuf,
    #[serde(default)]
    pub ions: Vec<IonSpec>,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_padding() -> f64 {
    10.0
}

fn default_seed() -> u64 {
    1
}

pub fn run(
    params: &SolvateParams,
    input: &StateHandle,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    let (topology, coordinates) = require_structure(input, io)?;
    if params.padding <= 0.0 {
        return Err(io.config_error("solvate padding must be positive"));
    }
    if !params.water_template.exists() {
        return Err(io.config_error(format!(
            "water template '{}' does not exist",
            params.water_template.display()
        )));
    }

    let summary = coordinate_summary(coordinates)?;
    let region = Region {
        min: [
            summary.min[0] - params.padding,
            summary.min[1] - params.padding,
            summary.min[2] - params.padding,
        ],
        max: [
            summary.max[0] + params.padding,
            summary.max[1] + params.padding,
            summary.max[2] + params.padding,
        ],
    };
    let extent = [
        region.max[0] - region.min[0],
        region.max[1] - region.min[1],
        region.max[2] - region.min[2],
    ];
    let volume = extent[0] * extent[1] * extent[2];
    let water_count = (volume * WATER_DENSITY).round() as usize;

    // Pack water and ions around the solute.
    let pack_step = io.step()?;
    let packed = pack_step.file("pdb");
    let mut spec = PackingSpec::new(packed.clone(), params.seed);
    spec.add(params.water_template.clone(), water_count, region);
    for ion in &params.ions {
        if !ion.template.exists() {
            return Err(io.config_error(format!(
                "ion template '{}' does not exist",
                ion.template.display()
            )));
        }
        spec.add(ion.template.clone(), ion.count, region);
    }
    let spec_path = pack_step.file("inp");
    spec.write_to(&spec_path)?;
    let invocation = spec.invocation(&io.ctx.engines.packing, &spec_path, io.ctx.workdir);
    run_engine(io.ctx.launcher, &invocation).map_err(|e| io.engine_failure(e))?;
    info!(waters = water_count, ions = params.ions.len(), "Solvent packed.");

    // Merge the packed solvent into the connectivity.
    let merge_step = io.step()?;
    let script_path = merge_step.file("in");
    let out_psf = merge_step.file("psf");
    let out_pdb = merge_step.file("pdb");
    let mut script = BuildScript::new();
    script
        .read_structure(Some(topology), coordinates)
        .merge_coordinates(&packed)
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

    // The padded region becomes the periodic cell.
    let boxfile = merge_step.file("xsc");
    let cell = BoxVectors {
        a: [extent[0], 0.0, 0.0],
        b: [0.0, extent[1], 0.0],
        c: [0.0, 0.0, extent[2]],
        origin: [
            (region.min[0] + region.max[0]) / 2.0,
            (region.min[1] + region.max[1]) / 2.0,
            (region.min[2] + region.max[2]) / 2.0,
        ],
    };
    cell.write(&boxfile, 0)?;
    info!(atoms, volume, "System solvated.");

    let mut state = input.derived(merge_step.id.clone(), merge_step.basename().to_string());
    state.topology = Some(out_psf);
    state.coordinates = Some(out_pdb);
    state.boxfile = Some(boxfile);
    let mut allocator = ChainIdAllocator::seeded_from(&input.chain_map);
    state
        .chain_map
        .insert(allocator.allocate()?, WATER_SEGMENT.to_string());
    if !params.ions.is_empty() {
        state
            .chain_map
            .insert(allocator.allocate()?, ION_SEGMENT.to_string());
    }
    Ok(state)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesolvateParams {
    /// Keep the ion segment when stripping water.
    #[serde(default)]
    pub keep_ions: bool,
}

pub fn run_desolvate(
    params: &DesolvateParams,
    input: &StateHandle,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    let (topology, coordinates) = require_structure(input, io)?;
    let has_solvent = input.chain_map.values().any(|seg| seg == WATER_SEGMENT);
    if !has_solvent {
        return Err(io.precondition_error("input state carries no solvent segment"));
    }

    let step = io.step()?;
    let script_path = step.file("in");
    let out_psf = step.file("psf");
    let out_pdb = step.file("pdb");

    let mut script = BuildScript::new();
    script.read_structure(Some(topology), coordinates);
    script.delete_segment(WATER_SEGMENT);
    if !params.keep_ions {
        script.delete_segment(ION_SEGMENT);
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
    info!(atoms, keep_ions = params.keep_ions, "Solvent stripped.");

    let mut state = input.derived(step.id.clone(), step.basename().to_string());
    state.topology = Some(out_psf);
    state.coordinates = Some(out_pdb);
    // A desolvated system has no meaningful periodic cell.
    state.boxfile = None;
    state.chain_map.retain(|_, seg| {
        seg != WATER_SEGMENT && (params.keep_ions || seg != ION_SEGMENT)
    });
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tasks::tests_support::TestHarness;

    fn input(harness: &TestHarness) -> StateHandle {
        let mut state = StateHandle::seed();
        state.topology = Some(harness.write_psf("sys.psf", 12));
        state.coordinates = Some(harness.write_pdb("sys.pdb", 12, &['A']));
        state.chain_map.insert('A', "A".into());
        state
    }

    fn params(harness: &TestHarness) -> SolvateParams {
        SolvateParams {
            padding: 10.0,
            water_template: harness.write_pdb("tip3.pdb", 3, &['W']),
            ions: Vec::new(),
            seed: default_seed(),
        }
    }

    #[test]
    fn packs_then_merges_and_sets_the_box() {
        let harness = TestHarness::new();
        let input = input(&harness);
        let state = harness
            .with_io("solvate", 5, |io| run(&params(&harness), &input, io))
            .unwrap();
        assert!(state.boxfile.is_some());
        assert!(state.chain_map.values().any(|seg| seg == WATER_SEGMENT));
        // Packing run, then builder merge.
        assert_eq!(harness.launcher.launches(), 2);

        let spec =
            std::fs::read_to_string(harness.workdir().join("00-05-00_solvate.inp")).unwrap();
        assert!(spec.contains("tip3.pdb"));
        assert!(spec.contains("inside box"));

        let cell = BoxVectors::read(&state.boxfile.unwrap()).unwrap();
        // Solute spans 11 A in x (atoms at 0..=11) plus 10 A padding per side.
        assert!((cell.a[0] - 31.0).abs() < 1e-6);
    }

    #[test]
    fn water_count_scales_with_volume() {
        let harness = TestHarness::new();
        let input = input(&harness);
        harness
            .with_io("solvate", 5, |io| run(&params(&harness), &input, io))
            .unwrap();
        let spec =
            std::fs::read_to_string(harness.workdir().join("00-05-00_solvate.inp")).unwrap();
        let number_line = spec
            .lines()
            .find(|l| l.trim_start().starts_with("number"))
            .unwrap();
        let count: usize = number_line.split_whitespace().nth(1).unwrap().parse().unwrap();
        assert!(count > 0);
    }

    #[test]
    fn desolvate_strips_water_and_drops_the_box() {
        let harness = TestHarness::new();
        let input = input(&harness);
        let solvated = harness
            .with_io("solvate", 5, |io| run(&params(&harness), &input, io))
            .unwrap();
        let dry = harness
            .with_io("desolvate", 6, |io| {
                run_desolvate(&DesolvateParams::default(), &solvated, io)
            })
            .unwrap();
        assert!(dry.boxfile.is_none());
        assert!(!dry.chain_map.values().any(|seg| seg == WATER_SEGMENT));

        let script =
            std::fs::read_to_string(harness.workdir().join("00-06-00_desolvate.in")).unwrap();
        assert!(script.contains("delseg WAT"));
        assert!(script.contains("delseg ION"));
    }

    #[test]
    fn desolvating_a_dry_system_is_a_precondition_error() {
        let harness = TestHarness::new();
        let input = input(&harness);
        let err = harness
            .with_io("desolvate", 0, |io| {
                run_desolvate(&DesolvateParams::default(), &input, io)
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Precondition { .. }));
    }
}
