//! Error type shared by the store, the scheduler and the presentation layers.

use std::path::PathBuf;

use crate::task::TaskId;

/// Everything that can go wrong while editing or persisting the task list.
#[derive(Debug, thiserror::Error)]
pub enum TodoError {
    /// Rejected input, e.g. blank task text or a zero-hour reminder.
    #[error("{0}")]
    Validation(String),

    /// The task file is not a JSON array of task objects.
    #[error("malformed task file: {0}")]
    Format(#[from] serde_json::Error),

    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The addressed task no longer exists.
    #[error("task {0} not found")]
    NotFound(TaskId),
}

impl TodoError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TodoError::Io { path: path.into(), source }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TodoError>;
