//! # ydb core
//!
//! A Berkeley-DB style handle layer over an ordered key/value store.
//!
//! This crate provides:
//! - [`Environment`]: shared log, cache and configuration, reference counted
//! - [`Database`]: a named store inside an environment file
//! - [`Transaction`]: nested transactions with real rollback
//! - [`Cursor`]: independent positions over a database
//! - [`compare`]: key comparison, collations and key definitions
//!
//! ```no_run
//! use ydb_core::{Database, DbOpenFlags, DbType, PutFlags};
//!
//! let mut db = Database::create(None)?;
//! db.open(None, "t1", None, DbType::BTree, DbOpenFlags::CREATE, 0o644)?;
//! db.put(None, b"k", b"v", PutFlags::empty())?;
//! assert_eq!(db.get(None, b"k")?, b"v");
//! db.close(0)?;
//! # Ok::<(), ydb_core::YdbError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
pub mod compare;
mod config;
mod cursor;
mod db;
mod env;
mod error;
mod flags;
pub mod log;
mod stats;
pub mod tree;
mod txn;
mod types;
mod xids;

pub use cache::{CachedFile, PageCache};
pub use config::{parse_db_config, resolve_dir, EnvConfig, DB_CONFIG_FILE, DEFAULT_CACHE_SIZE};
pub use cursor::Cursor;
pub use db::Database;
pub use env::{Environment, ErrCallback, MAX_PATH_LEN};
pub use error::{ErrorKind, YdbError, YdbResult};
pub use flags::{CursorOp, DbFlags, DbOpenFlags, DbType, EnvOpenFlags, PutFlags};
pub use stats::{DbStat, KeyRange, TxnStat};
pub use txn::{Rollback, Transaction};
pub use types::{Lsn, TxnId};
pub use xids::{XidChain, MAX_NESTING_DEPTH, MAX_TRANSACTION_RECORDS};

/// Library version as `(major, minor, patch, "ydb x.y.z")`.
#[must_use]
pub fn version() -> (u32, u32, u32, &'static str) {
    (
        parse_u32(env!("CARGO_PKG_VERSION_MAJOR")),
        parse_u32(env!("CARGO_PKG_VERSION_MINOR")),
        parse_u32(env!("CARGO_PKG_VERSION_PATCH")),
        concat!("ydb ", env!("CARGO_PKG_VERSION")),
    )
}

fn parse_u32(text: &str) -> u32 {
    text.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_package() {
        let (major, minor, patch, text) = version();
        assert_eq!(text, format!("ydb {major}.{minor}.{patch}"));
    }
}
