//! Serial task execution.
//!
//! A `Controller` owns an ordered list of task descriptors and executes them
//! strictly in order, threading the state handle: task N's output is task
//! N+1's input. On the first failure the remaining descriptors are never
//! invoked and the error propagates to the caller unchanged; artifacts
//! already written stay on disk for post-mortem inspection and restart.
//!
//! Composite tasks spawn sub-controllers through a [`ChildSpawner`]. The
//! spawning task owns the child for the duration of its own execution and
//! decides what part of the child's final state folds back; nothing is
//! merged automatically and no shared mutable reference escapes.

use crate::core::naming::{ControllerId, NamingError};
use crate::core::state::StateHandle;
use crate::engine::context::RunContext;
use crate::engine::error::EngineError;
use crate::engine::progress::Progress;
use crate::engine::tasks::{self, TaskDescriptor, TaskOutcome};
use tracing::{debug, info};

pub struct Controller {
    id: ControllerId,
    descriptors: Vec<TaskDescriptor>,
    next_child: usize,
}

/// Hands out sub-controller ids beneath one parent while the parent is
/// executing a task.
pub struct ChildSpawner<'c> {
    parent: &'c ControllerId,
    next_child: &'c mut usize,
}

impl<'c> ChildSpawner<'c> {
    pub fn new(parent: &'c ControllerId, next_child: &'c mut usize) -> Self {
        Self { parent, next_child }
    }

    pub fn parent_id(&self) -> &ControllerId {
        self.parent
    }

    pub fn spawn(&mut self, descriptors: Vec<TaskDescriptor>) -> Result<Controller, NamingError> {
        let id = self.parent.child(*self.next_child)?;
        *self.next_child += 1;
        Ok(Controller::new(id, descriptors))
    }
}

impl Controller {
    pub fn new(id: ControllerId, descriptors: Vec<TaskDescriptor>) -> Self {
        Self {
            id,
            descriptors,
            next_child: 0,
        }
    }

    pub fn id(&self) -> &ControllerId {
        &self.id
    }

    pub fn task_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Execute the task list, threading the state handle. Returns the final
    /// state; a `terminate` task ends the list early with the state it saw.
    pub fn run(
        &mut self,
        initial: StateHandle,
        ctx: &RunContext,
    ) -> Result<StateHandle, EngineError> {
        info!(controller = %self.id, tasks = self.descriptors.len(), "Controller starting.");
        let mut state = initial;

        for index in 0..self.descriptors.len() {
            let descriptor = self.descriptors[index].clone();
            ctx.reporter.report(Progress::TaskStart {
                index,
                label: descriptor.label.clone(),
            });
            debug!(controller = %self.id, task = index, label = %descriptor.label, "Dispatching task.");

            let mut spawner = ChildSpawner {
                parent: &self.id,
                next_child: &mut self.next_child,
            };
            let outcome = tasks::run_task(&descriptor, &state, ctx, &mut spawner, index)?;
            ctx.reporter.report(Progress::TaskFinish { index });

            match outcome {
                TaskOutcome::Advance(next) => state = next,
                TaskOutcome::Halt(next) => {
                    info!(controller = %self.id, task = index, "Pipeline terminated by task.");
                    state = next;
                    break;
                }
            }
        }

        info!(controller = %self.id, "Controller finished.");
        Ok(state)
    }
}
