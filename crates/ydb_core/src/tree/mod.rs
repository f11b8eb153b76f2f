//! Ordered key/value store behind a database handle.
//!
//! [`Tree`] and [`TreeCursor`] are the operations a [`crate::Database`] and
//! [`crate::Cursor`] delegate to. [`CachedTree`] implements them over the
//! environment's [`PageCache`]; tests substitute their own.

mod cached;
mod cursor;
pub(crate) mod file;
pub(crate) mod subdb;

pub use cached::{CachedTree, DEFAULT_NODE_SIZE, MAX_NODE_SIZE, MIN_NODE_SIZE};
pub use file::{TREE_MAGIC, TREE_VERSION};

pub(crate) use cached::replay;

use crate::cache::PageCache;
use crate::compare::CompareFn;
use crate::error::YdbResult;
use crate::flags::{CursorOp, DbFlags, PutFlags};
use crate::stats::{DbStat, KeyRange};
use crate::txn::Transaction;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Everything [`Tree::open`] needs to bind a handle.
#[derive(Debug, Clone, Copy)]
pub struct TreeOpen<'a> {
    /// Full path of the file.
    pub path: &'a Path,
    /// Name the caller used for the file.
    pub logical_name: &'a str,
    /// Sub-database name; empty for the whole file.
    pub subdb: &'a str,
    /// Create the sub-database if it is missing.
    pub create: bool,
    /// With `create`, fail if it is present.
    pub exclusive: bool,
    /// Cache of the owning environment.
    pub cache: &'a Arc<PageCache>,
    /// Transaction the open runs under.
    pub txn: Option<&'a Transaction>,
}

/// An ordered byte-string store with optional duplicates.
pub trait Tree: Send + Sync + fmt::Debug {
    /// Installs the key ordering.
    fn set_comparator(&mut self, cmp: CompareFn) -> YdbResult<()>;

    /// Installs the ordering of duplicate values.
    fn set_dup_comparator(&mut self, cmp: CompareFn) -> YdbResult<()>;

    /// Selects the duplicate mode. Only valid before `open`.
    fn set_flags(&mut self, flags: DbFlags) -> YdbResult<()>;

    /// Sets the node size in bytes. Only valid before `open`.
    fn set_node_size(&mut self, bytes: u32) -> YdbResult<()>;

    /// Binds the handle to a sub-database of a file.
    fn open(&mut self, params: TreeOpen<'_>) -> YdbResult<()>;

    /// Releases the file. Closing an unopened tree is a no-op.
    fn close(&mut self) -> YdbResult<()>;

    /// Stores `value` under `key`.
    fn insert(
        &self,
        key: &[u8],
        value: &[u8],
        flags: PutFlags,
        txn: Option<&Transaction>,
    ) -> YdbResult<()>;

    /// Returns the first value stored under `key`.
    fn lookup(&self, key: &[u8]) -> YdbResult<Vec<u8>>;

    /// Removes `key` and all its duplicates.
    fn delete(&self, key: &[u8], txn: Option<&Transaction>) -> YdbResult<()>;

    /// Removes a whole sub-database from the open file.
    fn remove_subdb(&mut self, name: &str) -> YdbResult<()>;

    /// Opens an independent traversal handle.
    fn cursor(&self) -> YdbResult<Box<dyn TreeCursor + '_>>;

    /// Counts keys and pairs.
    fn stat(&self) -> YdbResult<DbStat>;

    /// Estimates where `key` falls.
    fn key_range(&self, key: &[u8]) -> YdbResult<KeyRange>;
}

/// A position in a [`Tree`].
pub trait TreeCursor: Send {
    /// Moves according to `op` and returns the pair found there.
    ///
    /// `key` is required by [`CursorOp::Set`] and [`CursorOp::SetRange`].
    /// A move that finds nothing leaves the position unchanged.
    fn get(
        &mut self,
        key: Option<&[u8]>,
        op: CursorOp,
        txn: Option<&Transaction>,
    ) -> YdbResult<(Vec<u8>, Vec<u8>)>;

    /// Deletes the pair under the cursor.
    fn delete(&mut self, txn: Option<&Transaction>) -> YdbResult<()>;

    /// Releases the position.
    fn close(&mut self);
}
