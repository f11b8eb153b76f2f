//! Error types for ydb core.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use ydb_storage::StorageError;

/// Result type for core operations.
pub type YdbResult<T> = Result<T, YdbError>;

/// Abstract status of a failed operation.
///
/// These are the codes callers branch on; the concrete [`YdbError`]
/// variant carries the detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A caller-supplied argument is not acceptable.
    InvalidArgument,
    /// The handle is in the wrong lifecycle state for the operation.
    InvalidState,
    /// A directory, file, sub-database or key does not exist.
    NotFound,
    /// The thing to be created is already there.
    AlreadyExists,
    /// An allocation could not be satisfied.
    OutOfMemory,
    /// A constructed path exceeds the path length limit.
    NameTooLong,
    /// The operation is not supported.
    Unimplemented,
    /// A bounded structure is full.
    CapacityExceeded,
    /// Persistent data failed validation.
    Corruption,
    /// The OS reported an I/O failure.
    Io,
    /// The environment can no longer be trusted.
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidArgument => "invalid argument",
            Self::InvalidState => "invalid state",
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::OutOfMemory => "out of memory",
            Self::NameTooLong => "name too long",
            Self::Unimplemented => "unimplemented",
            Self::CapacityExceeded => "capacity exceeded",
            Self::Corruption => "corruption",
            Self::Io => "I/O error",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in ydb core operations.
#[derive(Debug, Error)]
pub enum YdbError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A caller-supplied argument was rejected.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// Operation not permitted in the handle's current state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Why the state is wrong.
        message: String,
    },

    /// Something looked up does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// Something to be created already exists.
    #[error("already exists: {what}")]
    AlreadyExists {
        /// What was in the way.
        what: String,
    },

    /// Allocation failure.
    #[error("out of memory")]
    OutOfMemory,

    /// A joined path is longer than the platform allows.
    #[error("name too long: {}", path.display())]
    NameTooLong {
        /// The offending path (possibly truncated).
        path: PathBuf,
    },

    /// The operation exists in the API but is not supported.
    #[error("operation not supported: {operation}")]
    Unimplemented {
        /// Name of the operation.
        operation: &'static str,
    },

    /// A fixed-capacity structure is full.
    #[error("capacity of {capacity} exceeded")]
    CapacityExceeded {
        /// The capacity that was hit.
        capacity: usize,
    },

    /// A `DB_CONFIG` line could not be applied.
    #[error("DB_CONFIG line {line}: {message}")]
    ConfigParse {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// The log is corrupted or invalid.
    #[error("log corruption: {message}")]
    LogCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A tree file is corrupted or invalid.
    #[error("tree file corruption: {message}")]
    TreeCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Undoing an aborted transaction failed; the environment is unusable.
    #[error("rollback of transaction {txid} failed: {message}")]
    RollbackFailed {
        /// Transaction being aborted.
        txid: u64,
        /// The undo failure.
        message: String,
    },

    /// An earlier fatal failure poisoned the environment.
    #[error("environment is poisoned by an earlier fatal error")]
    EnvironmentPoisoned,
}

impl YdbError {
    /// Returns the abstract status of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(err) => match err {
                StorageError::NotFound { .. } => ErrorKind::NotFound,
                StorageError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
                StorageError::ReadPastEnd { .. } | StorageError::TruncateBeyondEnd { .. } => {
                    ErrorKind::Corruption
                }
                StorageError::Io(io) => io_kind(io),
            },
            Self::Io(io) => io_kind(io),
            Self::InvalidArgument { .. } | Self::ConfigParse { .. } => ErrorKind::InvalidArgument,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::OutOfMemory => ErrorKind::OutOfMemory,
            Self::NameTooLong { .. } => ErrorKind::NameTooLong,
            Self::Unimplemented { .. } => ErrorKind::Unimplemented,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::LogCorruption { .. }
            | Self::TreeCorruption { .. }
            | Self::ChecksumMismatch { .. } => ErrorKind::Corruption,
            Self::RollbackFailed { .. } | Self::EnvironmentPoisoned => ErrorKind::Fatal,
        }
    }

    /// Returns true if this error means the key/file/directory was absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates an already exists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists { what: what.into() }
    }

    /// Creates an unimplemented error.
    pub fn unimplemented(operation: &'static str) -> Self {
        Self::Unimplemented { operation }
    }

    /// Creates a log corruption error.
    pub fn log_corruption(message: impl Into<String>) -> Self {
        Self::LogCorruption {
            message: message.into(),
        }
    }

    /// Creates a tree corruption error.
    pub fn tree_corruption(message: impl Into<String>) -> Self {
        Self::TreeCorruption {
            message: message.into(),
        }
    }
}

fn io_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
        io::ErrorKind::OutOfMemory => ErrorKind::OutOfMemory,
        io::ErrorKind::InvalidInput => ErrorKind::InvalidArgument,
        _ => ErrorKind::Io,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_not_found_maps_to_not_found() {
        let err = YdbError::from(StorageError::NotFound {
            path: PathBuf::from("/nope"),
        });
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_not_found());
    }

    #[test]
    fn io_errors_keep_their_meaning() {
        let err = YdbError::from(io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = YdbError::from(io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn config_errors_are_invalid_arguments() {
        let err = YdbError::ConfigParse {
            line: 3,
            message: "unknown command".into(),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.to_string(), "DB_CONFIG line 3: unknown command");
    }

    #[test]
    fn rollback_failure_is_fatal() {
        let err = YdbError::RollbackFailed {
            txid: 7,
            message: "boom".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
}
