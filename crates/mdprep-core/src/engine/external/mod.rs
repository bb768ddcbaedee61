//! Adapters for the external engines.
//!
//! The engines are opaque subprocesses: the orchestrator writes a script or
//! configuration file, launches the engine, blocks until it exits, and then
//! verifies that the artifacts the script promised actually exist. The
//! [`Launch`] trait is the single seam between the orchestrator and the
//! operating system, so tests can substitute a fake engine that fabricates
//! outputs instead of running multi-hour physics.

pub mod builder;
pub mod dynamics;
pub mod packing;

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    StructureBuilder,
    Dynamics,
    Packing,
    Fetch,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineKind::StructureBuilder => "structure builder",
            EngineKind::Dynamics => "dynamics engine",
            EngineKind::Packing => "packing engine",
            EngineKind::Fetch => "structure fetch",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("{engine} could not be launched ({program}): {source}")]
    Spawn {
        engine: EngineKind,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{engine} exited with status {status}")]
    Failed { engine: EngineKind, status: String },

    #[error("{engine} finished but expected output '{path}' is missing")]
    MissingOutput { engine: EngineKind, path: String },
}

/// One blocking engine invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub engine: EngineKind,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// File piped to the engine's stdin (packing engines read their spec
    /// this way).
    pub stdin_file: Option<PathBuf>,
    /// File capturing the engine's stdout (the MD engine's log).
    pub stdout_file: Option<PathBuf>,
    pub workdir: PathBuf,
    /// Artifacts the invocation must leave behind on success.
    pub expected_outputs: Vec<PathBuf>,
}

/// The subprocess seam. The calling thread suspends until the engine exits;
/// process-level parallelism belongs to the engines themselves.
pub trait Launch {
    fn launch(&self, invocation: &Invocation) -> Result<(), ExternalError>;
}

/// Launches engines as real subprocesses.
#[derive(Debug, Default)]
pub struct ProcessLauncher;

impl Launch for ProcessLauncher {
    fn launch(&self, invocation: &Invocation) -> Result<(), ExternalError> {
        info!(
            engine = %invocation.engine,
            program = %invocation.program.display(),
            "Launching external engine."
        );
        debug!(args = ?invocation.args, "Engine arguments.");

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).current_dir(&invocation.workdir);

        let spawn_err = |source| ExternalError::Spawn {
            engine: invocation.engine,
            program: invocation.program.display().to_string(),
            source,
        };

        if let Some(stdin_path) = &invocation.stdin_file {
            let file = std::fs::File::open(stdin_path).map_err(spawn_err)?;
            command.stdin(Stdio::from(file));
        }
        if let Some(stdout_path) = &invocation.stdout_file {
            let file = std::fs::File::create(stdout_path).map_err(spawn_err)?;
            command.stdout(Stdio::from(file));
        }

        let status = command.status().map_err(|source| ExternalError::Spawn {
            engine: invocation.engine,
            program: invocation.program.display().to_string(),
            source,
        })?;

        if !status.success() {
            return Err(ExternalError::Failed {
                engine: invocation.engine,
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// Launch an engine and verify that every promised artifact exists.
pub fn run_engine(launcher: &dyn Launch, invocation: &Invocation) -> Result<(), ExternalError> {
    launcher.launch(invocation)?;
    for path in &invocation.expected_outputs {
        if !path.exists() {
            return Err(ExternalError::MissingOutput {
                engine: invocation.engine,
                path: path.display().to_string(),
            });
        }
    }
    Ok(())
}
