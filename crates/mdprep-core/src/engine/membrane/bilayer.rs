//! Bilayer construction: pack, relax, merge, replicate, trim.
//!
//! Symmetric bilayers are one packed patch, relaxed and replicated.
//! Asymmetric bilayers are built from two independent symmetric patches,
//! one per target leaflet composition; after each patch equilibrates, the
//! merged patch takes the upper leaflet of patch U and the lower leaflet of
//! patch L at the larger of the two measured lateral areas. The leaflet
//! contributed by the larger-area patch carries excess lipids relative to
//! the other side's areal density; the excess is deleted only after
//! replication, sampled across the whole quilt, so removals are not biased
//! toward any replica position.
//!
//! The builder engine places extracted leaflets in the `MEMU`/`MEML`
//! segments; trims address lipids by residue id within those segments.

use crate::core::boxfile::BoxVectors;
use crate::core::chains::ChainIdAllocator;
use crate::core::composition::LeafletComposition;
use crate::core::state::StateHandle;
use crate::engine::controller::ChildSpawner;
use crate::engine::error::EngineError;
use crate::engine::external::builder::BuildScript;
use crate::engine::external::dynamics::MdStage;
use crate::engine::external::packing::{PackingSpec, Region};
use crate::engine::external::run_engine;
use crate::engine::membrane::patch::{
    excess_lipid_count, patch_side, select_trimmed_residues, trimmed_leaflet, BuildPhase, Leaflet,
    Patch,
};
use crate::engine::progress::Progress;
use crate::engine::tasks::{verify_consistency, TaskDescriptor, TaskIo, TaskKind};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Segment id of a symmetric bilayer, where the leaflets are never
/// addressed separately.
const BILAYER_SEGMENT: &str = "MEMB";

/// Everything the builder needs for one membrane system. Compositions and
/// templates are validated by the task layer before this is constructed.
pub struct BilayerSpec<'a> {
    pub upper: &'a LeafletComposition,
    pub lower: &'a LeafletComposition,
    pub lipids_per_leaflet: usize,
    /// Target surface area per lipid for the initial packing, in square
    /// Angstroms. The equilibrated area is measured, never assumed.
    pub area_per_lipid: f64,
    /// Bilayer thickness used for the packing regions, in Angstroms.
    pub thickness: f64,
    /// Packing template per lipid species name.
    pub templates: &'a BTreeMap<String, PathBuf>,
    /// Lateral replication factors toward the full-size quilt.
    pub replicate: (usize, usize),
    pub seed: u64,
    pub patch_protocol: &'a [MdStage],
    pub quilt_protocol: &'a [MdStage],
}

impl BilayerSpec<'_> {
    pub fn is_symmetric(&self) -> bool {
        self.upper == self.lower
    }
}

fn step_phase(phase: &mut BuildPhase, to: BuildPhase) -> Result<(), EngineError> {
    *phase = phase.advance(to).map_err(EngineError::Internal)?;
    Ok(())
}

/// Build the membrane system and return the state describing it.
pub fn build(
    spec: &BilayerSpec,
    io: &mut TaskIo,
    spawner: &mut ChildSpawner,
) -> Result<StateHandle, EngineError> {
    for composition in [spec.upper, spec.lower] {
        composition
            .validate()
            .map_err(|source| EngineError::Composition {
                task_index: io.task_index,
                source,
            })?;
    }

    let mut phase = BuildPhase::NotStarted;
    let (nx, ny) = spec.replicate;
    let quilt_leaflet_lipids = spec.lipids_per_leaflet * nx * ny;

    let (mut state, trim) = if spec.is_symmetric() {
        info!("Leaflet compositions are equal; following the symmetric path.");
        let patch = build_patch(spec, spec.upper, io, spawner)?;
        step_phase(&mut phase, BuildPhase::PatchBuilt)?;
        step_phase(&mut phase, BuildPhase::PatchRelaxed)?;
        info!(area = patch.lateral_area, sapl = patch.sapl(), "Patch equilibrated.");
        (patch.state, None)
    } else {
        info!("Leaflet compositions differ; following the two-patch merge path.");
        let patch_u = build_patch(spec, spec.upper, io, spawner)?;
        let patch_l = build_patch(spec, spec.lower, io, spawner)?;
        step_phase(&mut phase, BuildPhase::PatchBuilt)?;
        step_phase(&mut phase, BuildPhase::PatchRelaxed)?;
        info!(
            upper_area = patch_u.lateral_area,
            lower_area = patch_l.lateral_area,
            "Both patches equilibrated."
        );

        let merged = merge_patches(spec, &patch_u, &patch_l, io)?;
        step_phase(&mut phase, BuildPhase::Merged)?;

        let trim = trimmed_leaflet(patch_u.lateral_area, patch_l.lateral_area).map(|leaflet| {
            let (larger, smaller) = if leaflet == Leaflet::Upper {
                (patch_u.lateral_area, patch_l.lateral_area)
            } else {
                (patch_l.lateral_area, patch_u.lateral_area)
            };
            let excess = excess_lipid_count(quilt_leaflet_lipids, larger, smaller);
            (leaflet, excess)
        });
        (merged, trim)
    };

    if nx > 1 || ny > 1 {
        state = replicate_quilt(spec, &state, io)?;
    }
    step_phase(&mut phase, BuildPhase::Replicated)?;

    if let Some((leaflet, excess)) = trim {
        if excess > 0 {
            info!(
                leaflet = leaflet.name(),
                excess, "Trimming excess lipids across the quilt."
            );
            state = trim_quilt(spec, &state, leaflet, excess, quilt_leaflet_lipids, io)?;
            step_phase(&mut phase, BuildPhase::ExcessTrimmed)?;
        }
    }

    let state = relax(state, spec.quilt_protocol, io, spawner)?;
    step_phase(&mut phase, BuildPhase::FinalRelaxed)?;
    info!("Membrane system built.");
    Ok(state)
}

/// Pack one symmetric patch, derive its connectivity, relax it, and measure
/// its equilibrated lateral area.
fn build_patch(
    spec: &BilayerSpec,
    composition: &LeafletComposition,
    io: &mut TaskIo,
    spawner: &mut ChildSpawner,
) -> Result<Patch, EngineError> {
    let side = patch_side(spec.lipids_per_leaflet, spec.area_per_lipid);
    let half = spec.thickness / 2.0;

    // Pack both leaflets of the patch from one composition.
    let pack_step = io.step()?;
    let packed = pack_step.file("pdb");
    let mut packing = PackingSpec::new(packed.clone(), spec.seed);
    let upper_region = Region {
        min: [0.0, 0.0, 0.0],
        max: [side, side, half],
    };
    let lower_region = Region {
        min: [0.0, 0.0, -half],
        max: [side, side, 0.0],
    };
    for (name, count) in composition.species_counts(spec.lipids_per_leaflet) {
        let template = spec
            .templates
            .get(&name)
            .ok_or_else(|| io.config_error(format!("no packing template for lipid '{name}'")))?;
        packing.add(template.clone(), count, upper_region);
        packing.add(template.clone(), count, lower_region);
    }
    let spec_path = pack_step.file("inp");
    packing.write_to(&spec_path)?;
    let invocation = packing.invocation(&io.ctx.engines.packing, &spec_path, io.ctx.workdir);
    run_engine(io.ctx.launcher, &invocation).map_err(|e| io.engine_failure(e))?;

    // Derive connectivity for the packed lipids.
    let build_step = io.step()?;
    let script_path = build_step.file("in");
    let out_psf = build_step.file("psf");
    let out_pdb = build_step.file("pdb");
    let mut script = BuildScript::new();
    script
        .read_structure(None, &packed)
        .write_outputs(&out_psf, &out_pdb);
    script.write_to(&script_path)?;
    let invocation = BuildScript::invocation(
        &io.ctx.engines.builder,
        &script_path,
        io.ctx.workdir,
        vec![out_psf.clone(), out_pdb.clone()],
    );
    run_engine(io.ctx.launcher, &invocation).map_err(|e| io.engine_failure(e))?;
    verify_consistency(&out_psf, &out_pdb, io)?;

    // The packing guess becomes the initial periodic cell.
    let boxfile = build_step.file("xsc");
    BoxVectors::orthorhombic(side, side, spec.thickness * 2.0).write(&boxfile, 0)?;

    let mut state = StateHandle::seed().derived(build_step.id.clone(), build_step.basename().to_string());
    state.topology = Some(out_psf);
    state.coordinates = Some(out_pdb);
    state.boxfile = Some(boxfile);

    let relaxed = relax(state, spec.patch_protocol, io, spawner)?;
    let cell_path = relaxed
        .boxfile
        .as_ref()
        .ok_or_else(|| EngineError::Internal("relaxed patch lost its periodic cell".into()))?;
    let lateral_area = BoxVectors::read(cell_path)?.lateral_area()?;

    Ok(Patch {
        state: relaxed,
        lipids_per_leaflet: spec.lipids_per_leaflet,
        lateral_area,
    })
}

/// Run a relaxation protocol as a nested pipeline of dynamics stages.
fn relax(
    state: StateHandle,
    protocol: &[MdStage],
    io: &mut TaskIo,
    spawner: &mut ChildSpawner,
) -> Result<StateHandle, EngineError> {
    if protocol.is_empty() {
        return Ok(state);
    }
    let descriptors = protocol
        .iter()
        .map(|stage| TaskDescriptor::from_kind(TaskKind::RunDynamics(stage.clone())))
        .collect();
    let mut child = spawner.spawn(descriptors)?;
    let id = child.id().to_string();
    io.ctx
        .reporter
        .report(Progress::SubPipelineStart { id: id.clone() });
    let relaxed = child.run(state, io.ctx)?;
    io.ctx.reporter.report(Progress::SubPipelineFinish { id });
    Ok(relaxed)
}

/// Merge the upper leaflet of patch U with the lower leaflet of patch L at
/// the larger of the two measured areas.
fn merge_patches(
    spec: &BilayerSpec,
    patch_u: &Patch,
    patch_l: &Patch,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    let upper_coords = patch_u.state.coordinates.clone().ok_or_else(|| {
        EngineError::Internal("patch U has no coordinates after relaxation".into())
    })?;
    let lower_coords = patch_l.state.coordinates.clone().ok_or_else(|| {
        EngineError::Internal("patch L has no coordinates after relaxation".into())
    })?;

    let step = io.step()?;
    let script_path = step.file("in");
    let out_psf = step.file("psf");
    let out_pdb = step.file("pdb");
    let mut script = BuildScript::new();
    script
        .take_leaflet(&upper_coords, Leaflet::Upper.name())
        .take_leaflet(&lower_coords, Leaflet::Lower.name())
        .write_outputs(&out_psf, &out_pdb);
    script.write_to(&script_path)?;
    let invocation = BuildScript::invocation(
        &io.ctx.engines.builder,
        &script_path,
        io.ctx.workdir,
        vec![out_psf.clone(), out_pdb.clone()],
    );
    run_engine(io.ctx.launcher, &invocation).map_err(|e| io.engine_failure(e))?;
    verify_consistency(&out_psf, &out_pdb, io)?;

    let larger_area = patch_u.lateral_area.max(patch_l.lateral_area);
    let side = larger_area.sqrt();
    let boxfile = step.file("xsc");
    BoxVectors::orthorhombic(side, side, spec.thickness * 2.0).write(&boxfile, 0)?;
    info!(area = larger_area, "Patches merged at the larger measured area.");

    let mut state = StateHandle::seed().derived(step.id.clone(), step.basename().to_string());
    state.topology = Some(out_psf);
    state.coordinates = Some(out_pdb);
    state.boxfile = Some(boxfile);
    Ok(state)
}

fn replicate_quilt(
    spec: &BilayerSpec,
    input: &StateHandle,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    let (nx, ny) = spec.replicate;
    let (topology, coordinates) = match (&input.topology, &input.coordinates) {
        (Some(t), Some(c)) => (t.clone(), c.clone()),
        _ => return Err(EngineError::Internal("patch state lost its structure".into())),
    };

    let step = io.step()?;
    let script_path = step.file("in");
    let out_psf = step.file("psf");
    let out_pdb = step.file("pdb");
    let mut script = BuildScript::new();
    script
        .read_structure(Some(&topology), &coordinates)
        .replicate(nx, ny)
        .write_outputs(&out_psf, &out_pdb);
    script.write_to(&script_path)?;
    let invocation = BuildScript::invocation(
        &io.ctx.engines.builder,
        &script_path,
        io.ctx.workdir,
        vec![out_psf.clone(), out_pdb.clone()],
    );
    run_engine(io.ctx.launcher, &invocation).map_err(|e| io.engine_failure(e))?;

    let cell_path = input
        .boxfile
        .as_ref()
        .ok_or_else(|| EngineError::Internal("patch state lost its periodic cell".into()))?;
    let boxfile = step.file("xsc");
    BoxVectors::read(cell_path)?
        .replicated(nx, ny)
        .write(&boxfile, 0)?;
    info!(nx, ny, "Patch replicated into the quilt.");

    let mut state = input.derived(step.id.clone(), step.basename().to_string());
    state.topology = Some(out_psf);
    state.coordinates = Some(out_pdb);
    state.boxfile = Some(boxfile);
    Ok(state)
}

fn trim_quilt(
    spec: &BilayerSpec,
    input: &StateHandle,
    leaflet: Leaflet,
    excess: usize,
    leaflet_lipids: usize,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    let (topology, coordinates) = match (&input.topology, &input.coordinates) {
        (Some(t), Some(c)) => (t.clone(), c.clone()),
        _ => return Err(EngineError::Internal("quilt state lost its structure".into())),
    };

    let step = io.step()?;
    let script_path = step.file("in");
    let out_psf = step.file("psf");
    let out_pdb = step.file("pdb");
    let mut script = BuildScript::new();
    script.read_structure(Some(&topology), &coordinates);
    for resid in select_trimmed_residues(leaflet_lipids, excess, spec.seed) {
        script.delete_residue(leaflet.segment(), resid);
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
    verify_consistency(&out_psf, &out_pdb, io)?;

    // The cell is unchanged by the deletion.
    let mut state = input.derived(step.id.clone(), step.basename().to_string());
    state.topology = Some(out_psf);
    state.coordinates = Some(out_pdb);
    Ok(state)
}

/// Chain-map entries for the finished membrane system.
pub fn membrane_chain_map(symmetric: bool) -> Result<crate::core::chains::ChainIdMap, EngineError> {
    let mut allocator = ChainIdAllocator::new();
    let mut map = crate::core::chains::ChainIdMap::new();
    if symmetric {
        map.insert(allocator.allocate()?, BILAYER_SEGMENT.to_string());
    } else {
        map.insert(allocator.allocate()?, Leaflet::Upper.segment().to_string());
        map.insert(allocator.allocate()?, Leaflet::Lower.segment().to_string());
    }
    Ok(map)
}
