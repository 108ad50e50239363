use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use vmdeploy_providers::{ObjectCategory, ProviderError};

/// Why a single VM deployment did not complete.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{category} '{name}' not found")]
    NotFound {
        category: ObjectCategory,
        name: String,
    },

    /// The server refused the clone request itself.
    #[error("clone request rejected: {0}")]
    Submission(#[source] ProviderError),

    /// The clone task was accepted and later ended in error.
    #[error("clone task failed: {kind}: {message}")]
    TaskFailed { kind: String, message: String },

    #[error("clone task {task} still running after {waited:?}")]
    TaskTimeout { task: String, waited: Duration },

    /// A lookup call failed (as opposed to finding nothing).
    #[error("inventory lookup failed: {0}")]
    Lookup(#[source] ProviderError),

    /// Polling the task failed; the clone may still be running server-side.
    #[error("lost track of clone task {task}: {source}")]
    TaskPoll {
        task: String,
        #[source]
        source: ProviderError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Resolution,
    Submission,
    Task,
}

impl DeployError {
    pub fn stage(&self) -> FailureStage {
        match self {
            DeployError::NotFound { .. } | DeployError::Lookup(_) => FailureStage::Resolution,
            DeployError::Submission(_) => FailureStage::Submission,
            DeployError::TaskFailed { .. }
            | DeployError::TaskTimeout { .. }
            | DeployError::TaskPoll { .. } => FailureStage::Task,
        }
    }
}
