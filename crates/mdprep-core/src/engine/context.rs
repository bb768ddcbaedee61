use crate::engine::external::Launch;
use crate::engine::progress::ProgressReporter;
use std::path::{Path, PathBuf};

/// Locations of the external engine executables. Every engine-invocation
/// boundary receives these explicitly; the working directory is the only
/// shared resource of a run and it, too, is passed in rather than assumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSet {
    /// Structure-building engine (consumes a build script, emits a
    /// connectivity file and a coordinate file).
    pub builder: PathBuf,
    /// MD engine (consumes a run configuration, emits coordinate, box, and
    /// log files).
    pub dynamics: PathBuf,
    /// Molecular packing engine (consumes a packing spec, emits one packed
    /// coordinate file).
    pub packing: PathBuf,
    /// Remote structure fetch command.
    pub fetch: PathBuf,
}

impl Default for EngineSet {
    fn default() -> Self {
        Self {
            builder: PathBuf::from("psfgen"),
            dynamics: PathBuf::from("namd2"),
            packing: PathBuf::from("packmol"),
            fetch: PathBuf::from("curl"),
        }
    }
}

/// Everything a task needs to execute: the shared working directory, the
/// engine locations, the subprocess seam, and the progress channel.
pub struct RunContext<'a> {
    pub workdir: &'a Path,
    pub engines: &'a EngineSet,
    pub launcher: &'a dyn Launch,
    pub reporter: &'a ProgressReporter<'a>,
}

impl<'a> RunContext<'a> {
    pub fn new(
        workdir: &'a Path,
        engines: &'a EngineSet,
        launcher: &'a dyn Launch,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            workdir,
            engines,
            launcher,
            reporter,
        }
    }

    /// Resolve an artifact name inside the working directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.workdir.join(name)
    }
}
