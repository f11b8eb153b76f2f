//! CLI error type.

use std::path::PathBuf;
use thiserror::Error;
use ydb_core::YdbError;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The environment or a database operation failed.
    #[error(transparent)]
    Ydb(#[from] YdbError),

    /// Reading a file failed.
    #[error(transparent)]
    Storage(#[from] ydb_storage::StorageError),

    /// JSON output could not be produced.
    #[error("JSON output: {0}")]
    Json(#[from] serde_json::Error),

    /// The home directory holds no log.
    #[error("no log found in {}", .0.display())]
    NoLog(PathBuf),
}
