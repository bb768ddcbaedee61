//! The preparation-run workflow.

use crate::core::naming::ControllerId;
use crate::core::state::StateHandle;
use crate::engine::context::RunContext;
use crate::engine::controller::Controller;
use crate::engine::error::EngineError;
use crate::engine::tasks::{self, TaskDescriptor, TaskKind};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// A declarative run: an ordered task list. Deserialized from the YAML
/// form, a `tasks:` list of single-key mappings, one per task kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub tasks: Vec<TaskKind>,
}

/// Outcome of a successful run.
#[derive(Debug)]
pub struct RunReport {
    /// State after the last executed task.
    pub final_state: StateHandle,
    /// Number of tasks the configuration scheduled. A `terminate` task may
    /// finish the run before all of them execute.
    pub scheduled_tasks: usize,
}

/// Validate a configuration without touching the filesystem or spawning any
/// engine process.
pub fn check(config: &RunConfig) -> Result<(), EngineError> {
    if config.tasks.is_empty() {
        return Err(EngineError::Config {
            task_index: 0,
            message: "run configuration schedules no tasks".into(),
        });
    }
    for (index, kind) in config.tasks.iter().enumerate() {
        tasks::preflight(kind, index)?;
    }
    Ok(())
}

/// Execute a full preparation run under the root controller.
#[instrument(skip_all, fields(tasks = config.tasks.len()))]
pub fn run(config: &RunConfig, ctx: &RunContext) -> Result<RunReport, EngineError> {
    check(config)?;

    let descriptors: Vec<TaskDescriptor> = config
        .tasks
        .iter()
        .cloned()
        .map(TaskDescriptor::from_kind)
        .collect();
    let scheduled_tasks = descriptors.len();
    let mut controller = Controller::new(ControllerId::root(), descriptors);
    let final_state = controller.run(StateHandle::seed(), ctx)?;

    info!(
        basename = %final_state.basename,
        "Preparation run finished."
    );
    Ok(RunReport {
        final_state,
        scheduled_tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::external::dynamics::MdStage;
    use crate::engine::tasks::tests_support::TestHarness;
    use crate::engine::tasks::{
        fetch::FetchParams, restart::RestartParams, topology::BuildTopologyParams, TerminateParams,
    };

    fn fetch_task(harness: &TestHarness) -> TaskKind {
        let source = harness.write_pdb("input.pdb", 12, &['A']);
        TaskKind::Fetch(FetchParams {
            id: None,
            source: Some(source),
        })
    }

    #[test]
    fn config_parses_from_yaml_task_list() {
        let yaml = "\
tasks:
  - fetch:
      id: 1ABC
  - build-topology:
      mutations:
        - { chain: A, resid: 42, to: SER }
  - run-dynamics:
      ensemble: minimize
      steps: 500
  - terminate: {}
";
        let config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tasks.len(), 4);
        assert!(matches!(config.tasks[0], TaskKind::Fetch(_)));
        assert!(matches!(
            config.tasks[2],
            TaskKind::RunDynamics(MdStage { steps: 500, .. })
        ));

        // The single-key-mapping form survives a write/read cycle.
        let rendered = serde_yaml::to_string(&config).unwrap();
        let reparsed: RunConfig = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn run_threads_state_between_tasks() {
        let harness = TestHarness::new();
        let config = RunConfig {
            tasks: vec![
                fetch_task(&harness),
                TaskKind::BuildTopology(BuildTopologyParams::default()),
                TaskKind::RunDynamics(MdStage::minimize(500)),
            ],
        };
        let report = harness.with_ctx(|ctx| run(&config, ctx)).unwrap();
        assert_eq!(report.scheduled_tasks, 3);

        // Task indices advance under the root controller.
        assert!(harness.workdir().join("00-00-00_fetch.pdb").exists());
        assert!(harness.workdir().join("00-01-00_build.psf").exists());

        // The dynamics run consumed exactly the build's declared outputs.
        let conf =
            std::fs::read_to_string(harness.workdir().join("00-02-00_minimize.conf")).unwrap();
        assert!(conf.contains("00-01-00_build.psf"));
        assert!(conf.contains("00-01-00_build.pdb"));

        assert!(report
            .final_state
            .coordinates
            .unwrap()
            .ends_with("00-02-00_minimize.coor"));
    }

    #[test]
    fn restart_resumes_the_tail_of_an_earlier_run() {
        let first = TestHarness::new();
        let full = RunConfig {
            tasks: vec![
                fetch_task(&first),
                TaskKind::BuildTopology(BuildTopologyParams::default()),
                TaskKind::RunDynamics(MdStage::minimize(500)),
            ],
        };
        first.with_ctx(|ctx| run(&full, ctx)).unwrap();
        let full_conf =
            std::fs::read_to_string(first.workdir().join("00-02-00_minimize.conf")).unwrap();

        // A second run in a fresh directory hydrates from the first run's
        // build artifacts and re-runs only the dynamics stage.
        let second = TestHarness::new();
        let resumed = RunConfig {
            tasks: vec![
                TaskKind::Restart(RestartParams {
                    topology: first.workdir().join("00-01-00_build.psf"),
                    coordinates: first.workdir().join("00-01-00_build.pdb"),
                    boxfile: None,
                }),
                TaskKind::RunDynamics(MdStage::minimize(500)),
            ],
        };
        let report = second.with_ctx(|ctx| run(&resumed, ctx)).unwrap();

        // Both minimizations consume the same structure files.
        let resumed_conf =
            std::fs::read_to_string(second.workdir().join("00-01-00_minimize.conf")).unwrap();
        assert!(full_conf.contains("00-01-00_build.psf"));
        assert!(resumed_conf.contains("00-01-00_build.psf"));
        assert!(resumed_conf.contains("00-01-00_build.pdb"));
        assert!(report
            .final_state
            .coordinates
            .unwrap()
            .ends_with("00-01-00_minimize.coor"));
        // The restart itself launches nothing; only the dynamics stage does.
        assert_eq!(second.launcher.launches(), 1);
    }

    #[test]
    fn terminate_skips_the_remaining_tasks() {
        let harness = TestHarness::new();
        let config = RunConfig {
            tasks: vec![
                fetch_task(&harness),
                TaskKind::Terminate(TerminateParams::default()),
                TaskKind::RunDynamics(MdStage::minimize(500)),
            ],
        };
        let report = harness.with_ctx(|ctx| run(&config, ctx)).unwrap();
        // Only the local-copy fetch ran; no dynamics engine was launched.
        assert_eq!(harness.launcher.launches(), 0);
        assert_eq!(report.final_state.basename, "00-00-00_fetch");
    }

    #[test]
    fn failing_task_stops_the_pipeline() {
        let harness = TestHarness::new();
        harness.launcher.fail_on.set(Some(0));
        let config = RunConfig {
            tasks: vec![
                fetch_task(&harness),
                TaskKind::BuildTopology(BuildTopologyParams::default()),
                TaskKind::RunDynamics(MdStage::minimize(500)),
            ],
        };
        let err = harness.with_ctx(|ctx| run(&config, ctx)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::EngineFailure { task_index: 1, .. }
        ));
        // The build failed; the dynamics stage never launched.
        assert_eq!(harness.launcher.launches(), 1);
    }

    #[test]
    fn check_rejects_an_empty_task_list() {
        let config = RunConfig { tasks: Vec::new() };
        assert!(matches!(
            check(&config),
            Err(EngineError::Config { task_index: 0, .. })
        ));
    }

    #[test]
    fn check_flags_invalid_parameters_by_position() {
        let config = RunConfig {
            tasks: vec![
                TaskKind::Terminate(TerminateParams::default()),
                TaskKind::Fetch(FetchParams {
                    id: None,
                    source: None,
                }),
            ],
        };
        assert!(matches!(
            check(&config),
            Err(EngineError::Config { task_index: 1, .. })
        ));
    }
}
