use thiserror::Error;

use crate::core::boxfile::BoxFileError;
use crate::core::chains::ChainError;
use crate::core::composition::CompositionError;
use crate::core::naming::NamingError;
use crate::core::structure::StructureError;
use crate::engine::external::ExternalError;

/// Fatal pipeline errors. Every variant that originates inside a task carries
/// the task's position and label so the failure can be reported (and resumed
/// from) without any surrounding context. Nothing here is retried; errors
/// bubble from task to controller to run driver unchanged.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("task {task_index} configuration error: {message}")]
    Config { task_index: usize, message: String },

    #[error("task {task_index} '{label}' precondition not met: {message}")]
    Precondition {
        task_index: usize,
        label: String,
        message: String,
    },

    #[error("task {task_index} '{label}': external engine failed: {source}")]
    EngineFailure {
        task_index: usize,
        label: String,
        #[source]
        source: ExternalError,
    },

    #[error("task {task_index}: invalid leaflet composition: {source}")]
    Composition {
        task_index: usize,
        #[source]
        source: CompositionError,
    },

    #[error("task {task_index} '{label}' left the system inconsistent: {message}")]
    Inconsistency {
        task_index: usize,
        label: String,
        message: String,
    },

    #[error("task {task_index} validation failed: {}", failures.join("; "))]
    Validation {
        task_index: usize,
        failures: Vec<String>,
    },

    #[error("artifact naming error: {0}")]
    Naming(#[from] NamingError),

    #[error("chain identifier error: {0}")]
    Chain(#[from] ChainError),

    #[error(transparent)]
    BoxFile(#[from] BoxFileError),

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("series output error: {0}")]
    Series(#[from] csv::Error),

    #[error("internal logic error: {0}")]
    Internal(String),
}
