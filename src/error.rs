//! Crate-wide operational error type, sitting above [`crate::path::error::PathError`].

use crate::path::error::PathError;
use thiserror::Error;

/// Top-level error returned by task and configuration operations. Storage
/// failures are wrapped from [`PathError`] rather than re-derived, so
/// the taxonomy in spec.md §7 has exactly one source of truth.
#[derive(Debug, Error)]
pub enum TfmError {
    #[error("path error: {0}")]
    Path(#[from] PathError),

    #[error("task failed: {message}")]
    Task { message: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("no active task")]
    NoActiveTask,

    #[error("action blocked: task in progress (press ESC to cancel)")]
    TaskInProgress,
}

impl TfmError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, TfmError::Path(e) if e.is_retriable())
    }
}

pub type TfmResult<T> = std::result::Result<T, TfmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_error_wraps_and_forwards_retriable() {
        let inner = PathError::NetworkError { message: "timeout".into(), retries: 1 };
        let err: TfmError = inner.into();
        assert!(err.is_retriable());
    }

    #[test]
    fn task_in_progress_is_not_retriable() {
        assert!(!TfmError::TaskInProgress.is_retriable());
    }
}
