//! Task kinds and dispatch.
//!
//! Every unit of pipeline work is one variant of the closed [`TaskKind`] sum
//! type; [`run_task`] matches exhaustively, so adding a task kind is a
//! compile-time-checked change. Each handler validates its parameters and
//! its preconditions on the input state before any engine subprocess is
//! started, names every artifact through the naming registry, and produces a
//! fresh state handle.

pub mod cleave;
pub mod domain_swap;
pub mod dynamics;
pub mod fetch;
pub mod ligate;
pub mod membrane;
pub mod package;
pub mod plot;
pub mod restart;
pub mod solvate;
pub mod topology;
pub mod validate;

#[cfg(test)]
pub(crate) mod tests_support;

use crate::core::naming::{artifact_basename, ArtifactId, ControllerId, SubtaskCounter};
use crate::core::state::StateHandle;
use crate::core::structure::{coordinate_summary, topology_atom_count};
use crate::engine::context::RunContext;
use crate::engine::controller::ChildSpawner;
use crate::engine::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub use crate::engine::external::dynamics::MdStage;

/// The closed set of task kinds, one variant per operation the pipeline can
/// sequence. The serde representation is the externally tagged form used in
/// run configurations: a list entry `- solvate: {...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Fetch(fetch::FetchParams),
    BuildTopology(topology::BuildTopologyParams),
    Ligate(ligate::LigateParams),
    Cleave(cleave::CleaveParams),
    DomainSwap(domain_swap::DomainSwapParams),
    Solvate(solvate::SolvateParams),
    Desolvate(solvate::DesolvateParams),
    MakeMembraneSystem(membrane::MembraneParams),
    RunDynamics(MdStage),
    Plot(plot::PlotParams),
    Validate(validate::ValidateParams),
    Package(package::PackageParams),
    Restart(restart::RestartParams),
    Terminate(TerminateParams),
}

impl TaskKind {
    /// Short name used in artifact names and error messages.
    pub fn slug(&self) -> &'static str {
        match self {
            TaskKind::Fetch(_) => "fetch",
            TaskKind::BuildTopology(_) => "build",
            TaskKind::Ligate(_) => "ligate",
            TaskKind::Cleave(_) => "cleave",
            TaskKind::DomainSwap(_) => "swap",
            TaskKind::Solvate(_) => "solvate",
            TaskKind::Desolvate(_) => "desolvate",
            TaskKind::MakeMembraneSystem(_) => "membrane",
            TaskKind::RunDynamics(stage) => match stage.ensemble {
                crate::engine::external::dynamics::Ensemble::Minimize => "minimize",
                crate::engine::external::dynamics::Ensemble::Nvt => "nvt",
                crate::engine::external::dynamics::Ensemble::Npt => "npt",
            },
            TaskKind::Plot(_) => "plot",
            TaskKind::Validate(_) => "validate",
            TaskKind::Package(_) => "package",
            TaskKind::Restart(_) => "restart",
            TaskKind::Terminate(_) => "terminate",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerminateParams {
    #[serde(default)]
    pub message: Option<String>,
}

/// A task as scheduled: its kind plus the label that persists in artifact
/// names for traceability. The descriptor itself is dropped after execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub kind: TaskKind,
    pub label: String,
}

impl TaskDescriptor {
    pub fn from_kind(kind: TaskKind) -> Self {
        let label = kind.slug().to_string();
        Self { kind, label }
    }
}

/// Whether the controller continues after a task.
#[derive(Debug)]
pub enum TaskOutcome {
    Advance(StateHandle),
    Halt(StateHandle),
}

/// Naming and filesystem context for one executing task. Allocates subtask
/// indices so every engine step within the task gets a distinct basename.
pub struct TaskIo<'a, 'r> {
    pub ctx: &'a RunContext<'r>,
    pub controller: ControllerId,
    pub task_index: usize,
    pub label: &'a str,
    subtasks: SubtaskCounter,
}

/// Artifact names of one subtask step: a shared basename with per-extension
/// files inside the working directory.
#[derive(Debug, Clone)]
pub struct StepNames {
    pub id: ArtifactId,
    basename: String,
    workdir: PathBuf,
}

impl StepNames {
    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn file(&self, ext: &str) -> PathBuf {
        self.workdir.join(format!("{}.{}", self.basename, ext))
    }
}

impl<'a, 'r> TaskIo<'a, 'r> {
    pub fn new(
        ctx: &'a RunContext<'r>,
        controller: ControllerId,
        task_index: usize,
        label: &'a str,
    ) -> Self {
        Self {
            ctx,
            controller,
            task_index,
            label,
            subtasks: SubtaskCounter::new(),
        }
    }

    /// Allocate the next subtask step of this task.
    pub fn step(&mut self) -> Result<StepNames, EngineError> {
        let subtask = self.subtasks.next()?;
        let id = ArtifactId::new(self.controller.clone(), self.task_index, subtask);
        let basename = artifact_basename(&id, self.label)?;
        Ok(StepNames {
            id,
            basename,
            workdir: self.ctx.workdir.to_path_buf(),
        })
    }

    pub fn config_error(&self, message: impl Into<String>) -> EngineError {
        EngineError::Config {
            task_index: self.task_index,
            message: message.into(),
        }
    }

    pub fn precondition_error(&self, message: impl Into<String>) -> EngineError {
        EngineError::Precondition {
            task_index: self.task_index,
            label: self.label.to_string(),
            message: message.into(),
        }
    }

    pub fn engine_failure(&self, source: crate::engine::external::ExternalError) -> EngineError {
        EngineError::EngineFailure {
            task_index: self.task_index,
            label: self.label.to_string(),
            source,
        }
    }
}

/// Require topology and coordinates on the input state.
pub(crate) fn require_structure<'s>(
    input: &'s StateHandle,
    io: &TaskIo,
) -> Result<(&'s Path, &'s Path), EngineError> {
    match (&input.topology, &input.coordinates) {
        (Some(topology), Some(coordinates)) => Ok((topology, coordinates)),
        _ => Err(io.precondition_error(
            "input state has no connectivity/coordinate pair; run build-topology or restart first",
        )),
    }
}

/// Verify that a connectivity/coordinate pair describes the same atom count.
pub(crate) fn verify_consistency(
    topology: &Path,
    coordinates: &Path,
    io: &TaskIo,
) -> Result<usize, EngineError> {
    let topo_atoms = topology_atom_count(topology)?;
    let coord_atoms = coordinate_summary(coordinates)?.atom_count;
    if topo_atoms != coord_atoms {
        return Err(EngineError::Inconsistency {
            task_index: io.task_index,
            label: io.label.to_string(),
            message: format!(
                "connectivity describes {topo_atoms} atoms but coordinates describe {coord_atoms}"
            ),
        });
    }
    Ok(topo_atoms)
}

/// Execute one task. Exhaustive over [`TaskKind`].
pub fn run_task(
    descriptor: &TaskDescriptor,
    input: &StateHandle,
    ctx: &RunContext,
    spawner: &mut ChildSpawner,
    task_index: usize,
) -> Result<TaskOutcome, EngineError> {
    let mut io = TaskIo::new(ctx, spawner.parent_id().clone(), task_index, &descriptor.label);
    match &descriptor.kind {
        TaskKind::Fetch(params) => fetch::run(params, input, &mut io).map(TaskOutcome::Advance),
        TaskKind::BuildTopology(params) => {
            topology::run(params, input, &mut io).map(TaskOutcome::Advance)
        }
        TaskKind::Ligate(params) => ligate::run(params, input, &mut io).map(TaskOutcome::Advance),
        TaskKind::Cleave(params) => cleave::run(params, input, &mut io).map(TaskOutcome::Advance),
        TaskKind::DomainSwap(params) => {
            domain_swap::run(params, input, &mut io).map(TaskOutcome::Advance)
        }
        TaskKind::Solvate(params) => solvate::run(params, input, &mut io).map(TaskOutcome::Advance),
        TaskKind::Desolvate(params) => {
            solvate::run_desolvate(params, input, &mut io).map(TaskOutcome::Advance)
        }
        TaskKind::MakeMembraneSystem(params) => {
            membrane::run(params, input, &mut io, spawner).map(TaskOutcome::Advance)
        }
        TaskKind::RunDynamics(stage) => {
            dynamics::run(stage, input, &mut io).map(TaskOutcome::Advance)
        }
        TaskKind::Plot(params) => plot::run(params, input, &mut io).map(TaskOutcome::Advance),
        TaskKind::Validate(params) => {
            validate::run(params, input, &mut io).map(TaskOutcome::Advance)
        }
        TaskKind::Package(params) => package::run(params, input, &mut io).map(TaskOutcome::Advance),
        TaskKind::Restart(params) => restart::run(params, input, &mut io).map(TaskOutcome::Advance),
        TaskKind::Terminate(params) => {
            if let Some(message) = &params.message {
                info!(task = task_index, "{}", message);
            }
            info!(
                task = task_index,
                basename = %input.basename,
                "Terminating pipeline; remaining tasks are skipped."
            );
            Ok(TaskOutcome::Halt(input.clone()))
        }
    }
}

/// Static parameter validation for every task in a configuration, performed
/// without touching the filesystem or any engine. Used by `check`-style
/// preflight before a run.
pub fn preflight(kind: &TaskKind, task_index: usize) -> Result<(), EngineError> {
    match kind {
        TaskKind::MakeMembraneSystem(params) => membrane::preflight(params, task_index),
        TaskKind::RunDynamics(stage) => {
            if stage.steps == 0 {
                return Err(EngineError::Config {
                    task_index,
                    message: "run-dynamics requires a non-zero step count".into(),
                });
            }
            Ok(())
        }
        TaskKind::Fetch(params) => fetch::preflight(params, task_index),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_label_defaults_to_slug() {
        let descriptor = TaskDescriptor::from_kind(TaskKind::Terminate(TerminateParams::default()));
        assert_eq!(descriptor.label, "terminate");
    }

    #[test]
    fn run_dynamics_slug_follows_ensemble() {
        let kind = TaskKind::RunDynamics(MdStage::minimize(100));
        assert_eq!(kind.slug(), "minimize");
        let kind = TaskKind::RunDynamics(MdStage::npt(100, 310.0, 1.0));
        assert_eq!(kind.slug(), "npt");
    }

    #[test]
    fn preflight_rejects_zero_step_dynamics() {
        let mut stage = MdStage::minimize(0);
        stage.steps = 0;
        let err = preflight(&TaskKind::RunDynamics(stage), 3).unwrap_err();
        assert!(matches!(err, EngineError::Config { task_index: 3, .. }));
    }
}
