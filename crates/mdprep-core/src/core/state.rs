//! System state handles.
//!
//! A `StateHandle` is the immutable record a task consumes and produces: the
//! current connectivity file, coordinate file, optional periodic-cell file,
//! chain-identifier map, and the basename under which the producing step
//! wrote its artifacts. A task never mutates its input handle; it derives a
//! new one. Whenever both connectivity and coordinates are present they must
//! describe the same atom count.

use crate::core::chains::ChainIdMap;
use crate::core::naming::{ArtifactId, ControllerId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An unresolved gap between two residues of a chain, left behind by a
/// topology build and closed later by a ligation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopMarker {
    pub chain: char,
    pub start_resid: i32,
    pub end_resid: i32,
}

/// Snapshot of the prepared system between two tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct StateHandle {
    /// Connectivity (topology) file, once a build task has produced one.
    pub topology: Option<PathBuf>,
    /// Coordinate file matching `topology` atom-for-atom when both are set.
    pub coordinates: Option<PathBuf>,
    /// Periodic-cell file, once solvation or dynamics has established one.
    pub boxfile: Option<PathBuf>,
    pub chain_map: ChainIdMap,
    /// Basename of the step that produced this handle.
    pub basename: String,
    /// Log of the most recent dynamics run, for series extraction.
    pub dynamics_log: Option<PathBuf>,
    /// Gaps awaiting ligation.
    pub unresolved_loops: Vec<LoopMarker>,
    pub provenance: ArtifactId,
}

impl StateHandle {
    /// Empty seed state for a fresh run.
    pub fn seed() -> Self {
        Self {
            topology: None,
            coordinates: None,
            boxfile: None,
            chain_map: ChainIdMap::new(),
            basename: String::new(),
            dynamics_log: None,
            unresolved_loops: Vec::new(),
            provenance: ArtifactId::new(ControllerId::root(), 0, 0),
        }
    }

    /// New handle carrying this one's fields forward under a new provenance.
    /// Tasks start from this and overwrite what they changed.
    pub fn derived(&self, provenance: ArtifactId, basename: String) -> Self {
        Self {
            topology: self.topology.clone(),
            coordinates: self.coordinates.clone(),
            boxfile: self.boxfile.clone(),
            chain_map: self.chain_map.clone(),
            basename,
            dynamics_log: self.dynamics_log.clone(),
            unresolved_loops: self.unresolved_loops.clone(),
            provenance,
        }
    }

    pub fn has_structure(&self) -> bool {
        self.topology.is_some() && self.coordinates.is_some()
    }
}
