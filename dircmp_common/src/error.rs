use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DircmpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("VFS error: {0}")]
    Vfs(#[from] VfsError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DircmpError>;

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Path is outside the comparison root: {0}")]
    OutsideRoot(String),
}

impl VfsError {
    /// True for the "path does not exist" class of failure, whether it was
    /// reported explicitly or surfaced as a raw IO error.
    pub fn is_not_found(&self) -> bool {
        match self {
            VfsError::NotFound(_) => true,
            VfsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Category of a failure recorded on a folder decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    PermissionDenied,
    NotADirectory,
    NotAFile,
    Unsupported,
    OutsideRoot,
    Io,
}

/// A cloneable snapshot of the `VfsError` that aborted a folder's enumeration.
///
/// Decisions are shared between callers, so the failure is kept as plain data
/// and converted back into a `VfsError` wherever it has to be returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Original kind of a raw IO error, restored when converting back
    #[serde(skip)]
    pub io_kind: Option<io::ErrorKind>,
}

impl fmt::Display for FolderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl From<&VfsError> for FolderFailure {
    fn from(err: &VfsError) -> Self {
        let io_kind = match err {
            VfsError::Io(e) => Some(e.kind()),
            VfsError::NotFound(_) => Some(io::ErrorKind::NotFound),
            _ => None,
        };
        let (kind, message) = match err {
            VfsError::Io(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                (FailureKind::PermissionDenied, e.to_string())
            }
            VfsError::Io(e) => (FailureKind::Io, e.to_string()),
            VfsError::NotFound(m) => (FailureKind::Io, m.clone()),
            VfsError::PermissionDenied(m) => (FailureKind::PermissionDenied, m.clone()),
            VfsError::NotADirectory(m) => (FailureKind::NotADirectory, m.clone()),
            VfsError::NotAFile(m) => (FailureKind::NotAFile, m.clone()),
            VfsError::Unsupported(m) => (FailureKind::Unsupported, m.clone()),
            VfsError::OutsideRoot(m) => (FailureKind::OutsideRoot, m.clone()),
        };
        Self {
            kind,
            message,
            io_kind,
        }
    }
}

impl From<&FolderFailure> for VfsError {
    fn from(failure: &FolderFailure) -> Self {
        let message = failure.message.clone();
        match failure.kind {
            FailureKind::PermissionDenied => VfsError::PermissionDenied(message),
            FailureKind::NotADirectory => VfsError::NotADirectory(message),
            FailureKind::NotAFile => VfsError::NotAFile(message),
            FailureKind::Unsupported => VfsError::Unsupported(message),
            FailureKind::OutsideRoot => VfsError::OutsideRoot(message),
            FailureKind::Io => VfsError::Io(io::Error::new(
                failure.io_kind.unwrap_or(io::ErrorKind::Other),
                message,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(VfsError::NotFound("x".to_string()).is_not_found());
        assert!(VfsError::Io(io::Error::new(io::ErrorKind::NotFound, "gone")).is_not_found());
        assert!(!VfsError::PermissionDenied("x".to_string()).is_not_found());
        assert!(!VfsError::Io(io::Error::new(io::ErrorKind::Other, "boom")).is_not_found());
    }

    #[test]
    fn test_failure_round_trip_keeps_kind_and_message() {
        let err = VfsError::PermissionDenied("/left/secret".to_string());
        let failure = FolderFailure::from(&err);
        assert_eq!(failure.kind, FailureKind::PermissionDenied);
        assert_eq!(failure.message, "/left/secret");

        match VfsError::from(&failure) {
            VfsError::PermissionDenied(m) => assert_eq!(m, "/left/secret"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_io_permission_denied_maps_to_permission_kind() {
        let err = VfsError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert_eq!(FolderFailure::from(&err).kind, FailureKind::PermissionDenied);
    }

    #[test]
    fn test_io_failure_keeps_error_kind() {
        let err = VfsError::Io(io::Error::new(io::ErrorKind::TimedOut, "share went away"));
        let failure = FolderFailure::from(&err);
        assert_eq!(failure.kind, FailureKind::Io);
        assert_eq!(failure.io_kind, Some(io::ErrorKind::TimedOut));

        match VfsError::from(&failure) {
            VfsError::Io(e) => {
                assert_eq!(e.kind(), io::ErrorKind::TimedOut);
                assert!(e.to_string().contains("share went away"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let missing = VfsError::from(&FolderFailure::from(&VfsError::NotFound("/gone".to_string())));
        assert!(missing.is_not_found());
    }
}
