//! CLI command implementations.

pub mod checkpoint;
pub mod data;
pub mod dump_log;
pub mod files;

use crate::error::CliError;
use std::path::Path;
use tracing::debug;
use ydb_core::{Database, DbOpenFlags, DbType, EnvOpenFlags, Environment};

/// A database file and optional sub-database.
#[derive(Debug, Clone)]
pub struct DbName {
    /// File name relative to the home directory.
    pub file: String,
    /// Sub-database name.
    pub subdb: Option<String>,
}

/// Opens the environment at `home`, replaying the log if needed.
pub fn open_env(home: &Path) -> Result<Environment, CliError> {
    let env = Environment::create();
    env.open(
        home,
        EnvOpenFlags::PRIVATE
            | EnvOpenFlags::INIT_MPOOL
            | EnvOpenFlags::INIT_TXN
            | EnvOpenFlags::RECOVER,
        0,
    )?;
    debug!(home = %home.display(), "environment ready");
    Ok(env)
}

/// Opens `name` in `env`, creating it when `create` is set.
pub fn open_db(env: &Environment, name: &DbName, create: bool) -> Result<Database, CliError> {
    let flags = if create {
        DbOpenFlags::CREATE
    } else {
        DbOpenFlags::empty()
    };
    let mut db = Database::create(Some(env))?;
    db.open(
        None,
        &name.file,
        name.subdb.as_deref(),
        DbType::Unknown,
        flags,
        0o644,
    )?;
    Ok(db)
}
