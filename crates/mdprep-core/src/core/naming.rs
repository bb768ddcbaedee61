//! Deterministic artifact naming.
//!
//! Every intermediate file a pipeline produces is named from the triple
//! (controller id, task index, subtask index) plus the task label and an
//! extension: `CC-MT-ST_label.ext`. The mapping is injective over distinct
//! triples within one run, so no two tasks can ever write to the same name.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Highest index representable in a zero-padded two-digit field.
pub const MAX_INDEX: usize = 99;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NamingError {
    #[error("index {index} exceeds the two-digit field limit of {MAX_INDEX}")]
    IndexOutOfRange { index: usize },

    #[error("artifact label must not be empty")]
    EmptyLabel,
}

/// Dotted-decimal controller path, e.g. `00` for the root controller and
/// `00.02` for the third child it spawned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControllerId(Vec<usize>);

impl ControllerId {
    pub fn root() -> Self {
        ControllerId(vec![0])
    }

    /// Id of the `index`-th sub-controller spawned beneath this one.
    pub fn child(&self, index: usize) -> Result<Self, NamingError> {
        if index > MAX_INDEX {
            return Err(NamingError::IndexOutOfRange { index });
        }
        let mut path = self.0.clone();
        path.push(index);
        Ok(ControllerId(path))
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02}", seg)?;
        }
        Ok(())
    }
}

/// Provenance of one artifact: which controller, which task in its list, and
/// which subtask within that task produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId {
    pub controller: ControllerId,
    pub task: usize,
    pub subtask: usize,
}

impl ArtifactId {
    pub fn new(controller: ControllerId, task: usize, subtask: usize) -> Self {
        Self {
            controller,
            task,
            subtask,
        }
    }
}

/// Derive the artifact file name for an id. Pure and deterministic; the only
/// error conditions are out-of-range indices, which indicate an orchestration
/// bug rather than a user mistake.
pub fn artifact_name(id: &ArtifactId, label: &str, ext: &str) -> Result<String, NamingError> {
    if id.task > MAX_INDEX {
        return Err(NamingError::IndexOutOfRange { index: id.task });
    }
    if id.subtask > MAX_INDEX {
        return Err(NamingError::IndexOutOfRange { index: id.subtask });
    }
    if label.is_empty() {
        return Err(NamingError::EmptyLabel);
    }
    Ok(format!(
        "{}-{:02}-{:02}_{}.{}",
        id.controller, id.task, id.subtask, label, ext
    ))
}

/// Basename shared by the artifacts of one (controller, task, subtask) step.
pub fn artifact_basename(id: &ArtifactId, label: &str) -> Result<String, NamingError> {
    if id.task > MAX_INDEX || id.subtask > MAX_INDEX {
        return Err(NamingError::IndexOutOfRange {
            index: id.task.max(id.subtask),
        });
    }
    if label.is_empty() {
        return Err(NamingError::EmptyLabel);
    }
    Ok(format!(
        "{}-{:02}-{:02}_{}",
        id.controller, id.task, id.subtask, label
    ))
}

/// Allocates subtask indices within one task so that a task emitting several
/// generations of artifacts never reuses a name.
#[derive(Debug, Default)]
pub struct SubtaskCounter {
    next: usize,
}

impl SubtaskCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> Result<usize, NamingError> {
        if self.next > MAX_INDEX {
            return Err(NamingError::IndexOutOfRange { index: self.next });
        }
        let idx = self.next;
        self.next += 1;
        Ok(idx)
    }

    /// Index that the next call to [`next`](Self::next) would return.
    pub fn peek(&self) -> usize {
        self.next
    }
}
