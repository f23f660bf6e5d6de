//! Error taxonomy for the Path abstraction layer.
//!
//! Every backend (local, SSH, S3, archive) maps its native failures onto
//! this enum so callers above the Path layer never match on backend type.

use std::fmt;
use std::io;

/// Result type alias used throughout the Path abstraction.
pub type PathResult<T> = std::result::Result<T, PathError>;

/// Errors raised by operations on a [`crate::path::TfmPath`].
///
/// Variants mirror the taxonomy in the caller-policy table: per-item
/// errors are recorded by the task executor and do not abort a batch,
/// while construction-time errors (`InvalidArgument`, `CrossBackend`)
/// are surfaced before any work starts.
#[derive(Debug)]
pub enum PathError {
    /// Path does not exist.
    NotFound(String),

    /// OS or backend refused access.
    PermissionDenied(String),

    /// Transport failure (timeout, connection loss, transient 5xx) after
    /// the backend's retry budget was exhausted.
    NetworkError { message: String, retries: u32 },

    /// `rename` attempted across incompatible schemes; caller must fall
    /// back to `copy_to` + `unlink`.
    CrossBackend { from: String, to: String },

    /// Mutation attempted on a read-only backend (archive entries).
    ReadOnly(String),

    /// The owning task's cancel flag was observed mid-operation.
    Cancelled,

    /// Malformed path, glob, or argument.
    InvalidArgument(String),

    /// Directory is non-empty; `rmdir` refuses per POSIX semantics.
    DirectoryNotEmpty(String),

    /// Underlying I/O error not otherwise classified.
    Io(io::Error),

    /// Backend-specific failure with free-form context.
    Backend { backend: &'static str, message: String },
}

impl PathError {
    /// Whether a retry loop should attempt this operation again.
    ///
    /// Only transport-shaped failures are retriable; anything else
    /// (missing file, permission, read-only) will fail identically on
    /// a second attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, PathError::NetworkError { .. })
    }
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::NotFound(p) => write!(f, "not found: {p}"),
            PathError::PermissionDenied(p) => write!(f, "permission denied: {p}"),
            PathError::NetworkError { message, retries } => {
                write!(f, "network error after {retries} retries: {message}")
            }
            PathError::CrossBackend { from, to } => {
                write!(f, "cannot rename across backends: {from} -> {to}")
            }
            PathError::ReadOnly(p) => write!(f, "read-only: {p}"),
            PathError::Cancelled => write!(f, "operation cancelled"),
            PathError::InvalidArgument(m) => write!(f, "invalid argument: {m}"),
            PathError::DirectoryNotEmpty(p) => write!(f, "directory not empty: {p}"),
            PathError::Io(e) => write!(f, "i/o error: {e}"),
            PathError::Backend { backend, message } => write!(f, "{backend}: {message}"),
        }
    }
}

impl std::error::Error for PathError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PathError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PathError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => PathError::NotFound(e.to_string()),
            io::ErrorKind::PermissionDenied => PathError::PermissionDenied(e.to_string()),
            _ => PathError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_error_is_retriable() {
        let err = PathError::NetworkError { message: "timeout".into(), retries: 3 };
        assert!(err.is_retriable());
    }

    #[test]
    fn not_found_is_not_retriable() {
        let err = PathError::NotFound("s3://bucket/key".into());
        assert!(!err.is_retriable());
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: PathError = io_err.into();
        assert!(matches!(err, PathError::NotFound(_)));
    }
}
