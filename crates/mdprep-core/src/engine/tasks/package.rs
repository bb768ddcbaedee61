//! Bundle the prepared system into a self-contained directory.
//!
//! The bundle holds copies of the final connectivity, coordinate, and box
//! files plus any user-supplied parameter files, together with a YAML
//! manifest recording what each file is and which chain carries which
//! segment. Pipelines keep running on the original artifacts; the bundle is
//! a hand-off copy.

use crate::core::chains::ChainIdMap;
use crate::core::state::StateHandle;
use crate::engine::error::EngineError;
use crate::engine::tasks::{require_structure, TaskIo};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageParams {
    /// Bundle directory name; defaults to the producing step's basename.
    #[serde(default)]
    pub name: Option<String>,
    /// Force-field or engine parameter files copied alongside the system.
    #[serde(default)]
    pub parameter_files: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    topology: String,
    coordinates: String,
    boxfile: Option<String>,
    parameter_files: Vec<String>,
    chain_map: &'a ChainIdMap,
    source_basename: &'a str,
}

fn file_name(path: &Path, io: &TaskIo) -> Result<String, EngineError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| io.config_error(format!("'{}' has no usable file name", path.display())))
}

pub fn run(
    params: &PackageParams,
    input: &StateHandle,
    io: &mut TaskIo,
) -> Result<StateHandle, EngineError> {
    let (topology, coordinates) = require_structure(input, io)?;
    for file in &params.parameter_files {
        if !file.exists() {
            return Err(io.config_error(format!(
                "parameter file '{}' does not exist",
                file.display()
            )));
        }
    }

    let step = io.step()?;
    let bundle_name = params
        .name
        .clone()
        .unwrap_or_else(|| step.basename().to_string());
    let bundle = io.ctx.path(&bundle_name);
    std::fs::create_dir_all(&bundle)?;

    let topology_name = file_name(topology, io)?;
    std::fs::copy(topology, bundle.join(&topology_name))?;
    let coordinates_name = file_name(coordinates, io)?;
    std::fs::copy(coordinates, bundle.join(&coordinates_name))?;
    let boxfile_name = match &input.boxfile {
        Some(boxfile) => {
            let name = file_name(boxfile, io)?;
            std::fs::copy(boxfile, bundle.join(&name))?;
            Some(name)
        }
        None => None,
    };
    let mut parameter_names = Vec::with_capacity(params.parameter_files.len());
    for file in &params.parameter_files {
        let name = file_name(file, io)?;
        std::fs::copy(file, bundle.join(&name))?;
        parameter_names.push(name);
    }

    let manifest = Manifest {
        topology: topology_name,
        coordinates: coordinates_name,
        boxfile: boxfile_name,
        parameter_files: parameter_names,
        chain_map: &input.chain_map,
        source_basename: &input.basename,
    };
    let body = serde_yaml::to_string(&manifest)
        .map_err(|e| EngineError::Internal(format!("manifest serialization failed: {e}")))?;
    std::fs::write(bundle.join("manifest.yaml"), body)?;

    info!(bundle = %bundle.display(), "System packaged.");
    Ok(input.derived(step.id.clone(), step.basename().to_string()))
}
