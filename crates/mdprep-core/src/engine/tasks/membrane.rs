//! Build a full membrane system as one composite task.
//!
//! The heavy lifting lives in [`crate::engine::membrane`]; this layer parses
//! and validates parameters, spawns the relaxation sub-pipelines through the
//! controller's child spawner, and folds the finished quilt back into a
//! state handle. The membrane system replaces whatever structure the input
//! state carried; embedding a protein into the bilayer is a later
//! build-topology step against the packaged membrane.

use crate::core::composition::LeafletComposition;
use crate::core::state::StateHandle;
use crate::engine::controller::ChildSpawner;
use crate::engine::error::EngineError;
use crate::engine::external::dynamics::MdStage;
use crate::engine::membrane::{self, BilayerSpec};
use crate::engine::tasks::TaskIo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MembraneParams {
    pub upper: LeafletComposition,
    pub lower: LeafletComposition,
    #[serde(default = "default_lipids_per_leaflet")]
    pub lipids_per_leaflet: usize,
    /// Target surface area per lipid for the initial packing, in square
    /// Angstroms.
    #[serde(default = "default_area_per_lipid")]
    pub area_per_lipid: f64,
    /// Bilayer thickness in Angstroms.
    #[serde(default = "default_thickness")]
    pub thickness: f64,
    /// Packing template file per lipid species name.
    pub templates: BTreeMap<String, PathBuf>,
    /// Lateral replication factors toward the full-size quilt.
    #[serde(default = "default_replicate")]
    pub replicate: (usize, usize),
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_patch_protocol")]
    pub patch_protocol: Vec<MdStage>,
    #[serde(default = "default_quilt_protocol")]
    pub quilt_protocol: Vec<MdStage>,
}

fn default_lipids_per_leaflet() -> usize {
    64
}

fn default_area_per_lipid() -> f64 {
    65.0
}

fn default_thickness() -> f64 {
    40.0
}

fn default_replicate() -> (usize, usize) {
    (1, 1)
}

fn default_seed() -> u64 {
    1
}

fn default_patch_protocol() -> Vec<MdStage> {
    vec![
        MdStage::minimize(1000),
        MdStage::nvt(2000, 310.0),
        MdStage::npt(5000, 310.0, 1.01325),
    ]
}

fn default_quilt_protocol() -> Vec<MdStage> {
    vec![MdStage::minimize(1000), MdStage::npt(5000, 310.0, 1.01325)]
}

pub(crate) fn preflight(params: &MembraneParams, task_index: usize) -> Result<(), EngineError> {
    for composition in [&params.upper, &params.lower] {
        composition
            .validate()
            .map_err(|source| EngineError::Composition { task_index, source })?;
        for lipid in &composition.lipids {
            if !params.templates.contains_key(&lipid.name) {
                return Err(EngineError::Config {
                    task_index,
                    message: format!("no packing template declared for lipid '{}'", lipid.name),
                });
            }
        }
    }
    if params.lipids_per_leaflet == 0 {
        return Err(EngineError::Config {
            task_index,
            message: "lipids_per_leaflet must be non-zero".into(),
        });
    }
    if params.replicate.0 == 0 || params.replicate.1 == 0 {
        return Err(EngineError::Config {
            task_index,
            message: "replication factors must be at least 1".into(),
        });
    }
    Ok(())
}

// The incoming state is deliberately unused: the membrane system replaces
// whatever structure the pipeline carried.
pub fn run(
    params: &MembraneParams,
    _input: &StateHandle,
    io: &mut TaskIo,
    spawner: &mut ChildSpawner,
) -> Result<StateHandle, EngineError> {
    preflight(params, io.task_index)?;
    for (name, template) in &params.templates {
        if !template.exists() {
            return Err(io.config_error(format!(
                "packing template for '{name}' does not exist: '{}'",
                template.display()
            )));
        }
    }

    let spec = BilayerSpec {
        upper: &params.upper,
        lower: &params.lower,
        lipids_per_leaflet: params.lipids_per_leaflet,
        area_per_lipid: params.area_per_lipid,
        thickness: params.thickness,
        templates: &params.templates,
        replicate: params.replicate,
        seed: params.seed,
        patch_protocol: &params.patch_protocol,
        quilt_protocol: &params.quilt_protocol,
    };
    let symmetric = spec.is_symmetric();
    let mut state = membrane::build(&spec, io, spawner)?;
    state.chain_map = membrane::bilayer::membrane_chain_map(symmetric)?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::composition::LipidSpecies;
    use crate::engine::tasks::tests_support::TestHarness;

    fn species(name: &str, fraction: f64) -> LipidSpecies {
        LipidSpecies {
            name: name.to_string(),
            mole_fraction: fraction,
            conformer: 0,
        }
    }

    fn params(harness: &TestHarness, upper: Vec<LipidSpecies>, lower: Vec<LipidSpecies>) -> MembraneParams {
        let mut templates = BTreeMap::new();
        for comp in [&upper, &lower] {
            for lipid in comp {
                templates
                    .entry(lipid.name.clone())
                    .or_insert_with(|| harness.write_pdb(&format!("{}.pdb", lipid.name), 4, &['L']));
            }
        }
        MembraneParams {
            upper: LeafletComposition::new(upper),
            lower: LeafletComposition::new(lower),
            lipids_per_leaflet: 64,
            area_per_lipid: 65.0,
            thickness: 40.0,
            templates,
            replicate: (2, 2),
            seed: 7,
            patch_protocol: vec![MdStage::npt(1000, 310.0, 1.01325)],
            quilt_protocol: vec![MdStage::minimize(500)],
        }
    }

    fn run_with_spawner(
        harness: &TestHarness,
        params: &MembraneParams,
    ) -> Result<StateHandle, EngineError> {
        harness.with_io("membrane", 0, |io| {
            let parent = crate::core::naming::ControllerId::root();
            let mut next_child = 0usize;
            let mut spawner = ChildSpawner::new(&parent, &mut next_child);
            run(params, &StateHandle::seed(), io, &mut spawner)
        })
    }

    #[test]
    fn symmetric_composition_takes_the_single_patch_path() {
        let harness = TestHarness::new();
        let params = params(
            &harness,
            vec![species("POPC", 1.0)],
            vec![species("POPC", 1.0)],
        );
        let state = run_with_spawner(&harness, &params).unwrap();
        assert!(state.has_structure());
        assert!(state.boxfile.is_some());
        assert!(state.chain_map.values().any(|seg| seg == "MEMB"));
        // Pack, connectivity, one patch relax stage, replicate, one quilt
        // relax stage.
        assert_eq!(harness.launcher.launches(), 5);
    }

    #[test]
    fn asymmetric_composition_builds_two_patches_and_merges() {
        let harness = TestHarness::new();
        let params = params(
            &harness,
            vec![species("POPC", 0.75), species("CHL1", 0.25)],
            vec![species("POPE", 1.0)],
        );
        let state = run_with_spawner(&harness, &params).unwrap();
        assert!(state.has_structure());
        assert!(state.chain_map.values().any(|seg| seg == "MEMU"));
        assert!(state.chain_map.values().any(|seg| seg == "MEML"));
        // Two patches (pack + connectivity + relax each), merge, replicate,
        // quilt relax. Both patches equilibrate at the same area here, so no
        // trim stage runs.
        assert_eq!(harness.launcher.launches(), 9);

        let merge =
            std::fs::read_to_string(harness.workdir().join("00-00-04_membrane.in")).unwrap();
        assert!(merge.contains("leaflet upper"));
        assert!(merge.contains("leaflet lower"));
    }

    #[test]
    fn replicated_quilt_cell_scales_laterally() {
        let harness = TestHarness::new();
        let params = params(
            &harness,
            vec![species("POPC", 1.0)],
            vec![species("POPC", 1.0)],
        );
        let state = run_with_spawner(&harness, &params).unwrap();
        let cell = crate::core::boxfile::BoxVectors::read(&state.boxfile.unwrap()).unwrap();
        // Relaxation carries the packed cell through, so 2x2 replication
        // doubles each lateral vector of the equilibrated patch, and the
        // quilt relaxation preserves the doubled cell.
        let patch_side = (64.0f64 * 65.0).sqrt();
        assert!((cell.a[0] - 2.0 * patch_side).abs() < 1e-6);
        assert!((cell.b[1] - 2.0 * patch_side).abs() < 1e-6);
    }

    #[test]
    fn excess_is_trimmed_from_the_larger_area_leaflet() {
        let harness = TestHarness::new();
        let mut params = params(
            &harness,
            vec![species("POPC", 1.0)],
            vec![species("POPE", 1.0)],
        );
        params.replicate = (1, 1);
        // Launches: pack/connectivity/relax per patch, then merge, trim,
        // quilt relax. Patch U equilibrates to a 40 A side (area 1600) and
        // patch L to 44 A (area 1936), a 21% larger area.
        harness.launcher.box_side_for.borrow_mut().insert(2, 40.0);
        harness.launcher.box_side_for.borrow_mut().insert(5, 44.0);
        let state = run_with_spawner(&harness, &params).unwrap();
        assert_eq!(harness.launcher.launches(), 9);

        // 64 * (1936/1600 - 1) = 13.44 -> 13 lipids leave the lower leaflet,
        // the one contributed by the larger-area patch.
        let trim =
            std::fs::read_to_string(harness.workdir().join("00-00-05_membrane.in")).unwrap();
        let deletions: Vec<&str> = trim
            .lines()
            .filter(|line| line.starts_with("delres MEML"))
            .collect();
        assert_eq!(deletions.len(), 13);
        assert!(!trim.contains("delres MEMU"));

        // The merged system keeps the larger measured area through the trim
        // and the final relaxation.
        let cell = crate::core::boxfile::BoxVectors::read(&state.boxfile.unwrap()).unwrap();
        assert!((cell.a[0] - 44.0).abs() < 1e-6);
    }

    #[test]
    fn bad_composition_never_reaches_an_engine() {
        let harness = TestHarness::new();
        let mut params = params(
            &harness,
            vec![species("POPC", 1.0)],
            vec![species("POPC", 1.0)],
        );
        params.upper = LeafletComposition::new(vec![species("POPC", 0.8)]);
        let err = run_with_spawner(&harness, &params).unwrap_err();
        assert!(matches!(err, EngineError::Composition { .. }));
        assert_eq!(harness.launcher.launches(), 0);
    }

    #[test]
    fn missing_template_is_a_config_error() {
        let harness = TestHarness::new();
        let mut params = params(
            &harness,
            vec![species("POPC", 1.0)],
            vec![species("POPC", 1.0)],
        );
        params.templates.clear();
        let err = preflight(&params, 3).unwrap_err();
        assert!(matches!(err, EngineError::Config { task_index: 3, .. }));
    }
}
