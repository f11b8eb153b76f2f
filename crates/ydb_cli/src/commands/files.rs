//! File-level commands.

use super::{open_env, DbName};
use crate::error::CliError;
use std::path::Path;
use tracing::info;
use ydb_core::Database;

/// Runs the remove command.
pub fn remove(home: &Path, name: &DbName) -> Result<(), CliError> {
    let env = open_env(home)?;
    Database::create(Some(&env))?.remove(&name.file, name.subdb.as_deref(), 0)?;
    env.close(0)?;
    info!(file = %name.file, subdb = name.subdb.as_deref(), "removed");
    Ok(())
}

/// Runs the rename command.
pub fn rename(home: &Path, from: &str, to: &str) -> Result<(), CliError> {
    let env = open_env(home)?;
    Database::create(Some(&env))?.rename(from, None, to, 0)?;
    env.close(0)?;
    info!(from, to, "renamed");
    Ok(())
}
