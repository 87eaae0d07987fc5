//! Error types for the rewrite pipeline and task store

use std::path::PathBuf;
use thiserror::Error;

/// Errors from task store and pipeline operations
///
/// Per-chunk collaborator failures are not represented here: the pipeline
/// absorbs them into error-marker QaPairs.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// Collaborator setup is missing credentials or model identity
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input document missing at submission time
    #[error("Input file '{}' does not exist", .0.display())]
    Input(PathBuf),

    /// Chunk manifest unreadable, corrupt or inconsistent with the task
    #[error("Chunk manifest for task {task_id} is unusable: {reason}")]
    Manifest { task_id: String, reason: String },

    /// Durable write or read failed
    #[error("Persistence error at {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error at {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task reference '{reference}' is ambiguous: {}", .candidates.join(", "))]
    AmbiguousTask { reference: String, candidates: Vec<String> },

    /// Another process holds the store lock
    #[error("Store at {} is in use by another rq process", .0.display())]
    StoreBusy(PathBuf),

    #[error("Prompt error: {0}")]
    Prompt(String),
}

impl RewriteError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn manifest(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Manifest {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error should fail the task it occurred in
    ///
    /// Lookup and lock errors concern the invocation, not a task.
    pub fn fails_task(&self) -> bool {
        matches!(
            self,
            Self::Manifest { .. } | Self::Persistence { .. } | Self::Json { .. } | Self::Prompt(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RewriteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fails_task() {
        assert!(RewriteError::manifest("t", "missing").fails_task());
        assert!(RewriteError::io("/x", std::io::Error::other("disk full")).fails_task());
        assert!(!RewriteError::TaskNotFound("t".to_string()).fails_task());
        assert!(!RewriteError::StoreBusy(PathBuf::from("/x")).fails_task());
    }

    #[test]
    fn test_messages() {
        let err = RewriteError::AmbiguousTask {
            reference: "a1".to_string(),
            candidates: vec!["a1b-task-x".to_string(), "a1c-task-y".to_string()],
        };
        assert_eq!(err.to_string(), "Task reference 'a1' is ambiguous: a1b-task-x, a1c-task-y");

        let err = RewriteError::Input(PathBuf::from("missing.md"));
        assert_eq!(err.to_string(), "Input file 'missing.md' does not exist");
    }
}
