//! [`Tree`] over the environment's page cache.

use super::cursor::CachedCursor;
use super::subdb::{InsertPlan, SubDb, UndoOp};
use super::{Tree, TreeCursor, TreeOpen};
use crate::cache::{CachedFile, PageCache};
use crate::compare::{default_compare, CompareFn};
use crate::error::{YdbError, YdbResult};
use crate::flags::{DbFlags, PutFlags};
use crate::log::LogRecord;
use crate::stats::{DbStat, KeyRange};
use crate::txn::{Rollback, Transaction};
use crate::types::Lsn;
use crate::xids::XidChain;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Node size used when none is configured.
pub const DEFAULT_NODE_SIZE: u32 = 4096;

/// Smallest accepted node size.
pub const MIN_NODE_SIZE: u32 = 512;

/// Largest accepted node size.
pub const MAX_NODE_SIZE: u32 = 65536;

pub(super) struct Bound {
    pub(super) cache: Arc<PageCache>,
    pub(super) file: Arc<CachedFile>,
    pub(super) file_name: String,
    pub(super) subdb: String,
}

impl Bound {
    /// Appends `record` and stamps `subdb` with its LSN.
    pub(super) fn log(&self, subdb: &mut SubDb, record: &LogRecord) -> YdbResult<()> {
        if let Some(logger) = self.cache.logger() {
            subdb.lsn = logger.append(record)?;
        }
        Ok(())
    }
}

pub(super) fn subdb_mut<'a>(
    subdbs: &'a mut BTreeMap<String, SubDb>,
    name: &str,
) -> YdbResult<&'a mut SubDb> {
    subdbs
        .get_mut(name)
        .ok_or_else(|| YdbError::not_found(format!("sub-database {name:?}")))
}

pub(super) fn xids_of(txn: Option<&Transaction>) -> XidChain {
    txn.map_or_else(XidChain::root, |txn| txn.xids().clone())
}

/// The default [`Tree`]: one sub-database of a cached tree file.
///
/// Mutations are logged before they are applied. Under a transaction each
/// applied mutation leaves an undo entry on the transaction.
pub struct CachedTree {
    cmp: CompareFn,
    dup_cmp: CompareFn,
    flags: DbFlags,
    node_size: u32,
    bound: Option<Bound>,
}

impl CachedTree {
    /// Creates an unopened tree with bytewise ordering and no duplicates.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cmp: default_compare(),
            dup_cmp: default_compare(),
            flags: DbFlags::empty(),
            node_size: DEFAULT_NODE_SIZE,
            bound: None,
        }
    }

    /// Duplicate mode, as configured or adopted from the file on open.
    #[must_use]
    pub fn flags(&self) -> DbFlags {
        self.flags
    }

    /// Returns true once `open` succeeded and until `close`.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.bound.is_some()
    }

    pub(super) fn bound(&self) -> YdbResult<&Bound> {
        self.bound
            .as_ref()
            .ok_or_else(|| YdbError::invalid_state("tree is not open"))
    }

    pub(super) fn cmp(&self) -> &CompareFn {
        &self.cmp
    }

    pub(super) fn push_undo(
        &self,
        bound: &Bound,
        txn: Option<&Transaction>,
        op: Option<UndoOp>,
    ) -> YdbResult<()> {
        match (txn, op) {
            (Some(txn), Some(op)) => txn.add_rollback(Box::new(TreeUndo {
                cache: Arc::clone(&bound.cache),
                path: bound.file.path().to_path_buf(),
                subdb: bound.subdb.clone(),
                op,
                cmp: Arc::clone(&self.cmp),
            })),
            _ => Ok(()),
        }
    }

    fn bind(&mut self, file: &CachedFile, params: &TreeOpen<'_>) -> YdbResult<()> {
        let mut state = file.state.lock();
        if let Some(existing) = state.subdbs.get_mut(params.subdb) {
            if params.create && params.exclusive {
                return Err(YdbError::already_exists(format!(
                    "sub-database {:?} in {}",
                    params.subdb, params.logical_name
                )));
            }
            if existing.flags != self.flags {
                debug!(stored = ?existing.flags, "adopting stored duplicate mode");
            }
            self.flags = existing.flags;
            self.node_size = existing.node_size;
            if existing.unordered {
                existing.reorder(&*self.cmp, &*self.dup_cmp);
                state.dirty = true;
                debug!(subdb = params.subdb, "recovered pairs sorted");
            }
            return Ok(());
        }

        if !params.create {
            return Err(YdbError::not_found(format!(
                "sub-database {:?} in {}",
                params.subdb, params.logical_name
            )));
        }
        let mut subdb = SubDb::new(self.flags, self.node_size);
        // Records logged for an earlier sub-database of this name are stale.
        if let Some(logger) = params.cache.logger() {
            subdb.lsn = logger.last_lsn();
        }
        state.subdbs.insert(params.subdb.to_string(), subdb);
        params.cache.persist(file, &mut state)?;
        debug!(file = %params.path.display(), subdb = params.subdb, "sub-database created");
        Ok(())
    }
}

impl Default for CachedTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree for CachedTree {
    fn set_comparator(&mut self, cmp: CompareFn) -> YdbResult<()> {
        self.cmp = cmp;
        Ok(())
    }

    fn set_dup_comparator(&mut self, cmp: CompareFn) -> YdbResult<()> {
        self.dup_cmp = cmp;
        Ok(())
    }

    fn set_flags(&mut self, flags: DbFlags) -> YdbResult<()> {
        if self.bound.is_some() {
            return Err(YdbError::invalid_state("cannot change flags of an open tree"));
        }
        self.flags = flags;
        Ok(())
    }

    fn set_node_size(&mut self, bytes: u32) -> YdbResult<()> {
        if self.bound.is_some() {
            return Err(YdbError::invalid_state(
                "cannot change node size of an open tree",
            ));
        }
        if !bytes.is_power_of_two() || !(MIN_NODE_SIZE..=MAX_NODE_SIZE).contains(&bytes) {
            return Err(YdbError::invalid_argument(format!(
                "node size {bytes} is not a power of two in [{MIN_NODE_SIZE}, {MAX_NODE_SIZE}]"
            )));
        }
        self.node_size = bytes;
        Ok(())
    }

    fn open(&mut self, params: TreeOpen<'_>) -> YdbResult<()> {
        if self.bound.is_some() {
            return Err(YdbError::invalid_state("tree is already open"));
        }
        if let Some(txn) = params.txn {
            txn.ensure_active()?;
        }

        let file = params.cache.acquire(params.path, params.create)?;
        if let Err(e) = self.bind(&file, &params) {
            if let Err(release_err) = params.cache.release(&file) {
                warn!(error = %release_err, "failed to release file after open error");
            }
            return Err(e);
        }

        self.bound = Some(Bound {
            cache: Arc::clone(params.cache),
            file,
            file_name: params.path.to_string_lossy().into_owned(),
            subdb: params.subdb.to_string(),
        });
        Ok(())
    }

    fn close(&mut self) -> YdbResult<()> {
        match self.bound.take() {
            Some(bound) => bound.cache.release(&bound.file),
            None => Ok(()),
        }
    }

    fn insert(
        &self,
        key: &[u8],
        value: &[u8],
        flags: PutFlags,
        txn: Option<&Transaction>,
    ) -> YdbResult<()> {
        let bound = self.bound()?;
        if let Some(txn) = txn {
            txn.ensure_writable()?;
        }

        let undo = {
            let mut state = bound.file.state.lock();
            let subdb = subdb_mut(&mut state.subdbs, &bound.subdb)?;
            let plan = subdb.plan_insert(key, value, &*self.cmp, &*self.dup_cmp, flags)?;
            if plan == InsertPlan::Unchanged {
                return Ok(());
            }
            bound.log(
                subdb,
                &LogRecord::Insert {
                    xids: xids_of(txn),
                    file: bound.file_name.clone(),
                    subdb: bound.subdb.clone(),
                    key: key.to_vec(),
                    value: value.to_vec(),
                },
            )?;
            let undo = subdb.apply_insert(plan, key, value);
            state.dirty = true;
            undo
        };
        self.push_undo(bound, txn, undo)
    }

    fn lookup(&self, key: &[u8]) -> YdbResult<Vec<u8>> {
        let bound = self.bound()?;
        let mut state = bound.file.state.lock();
        let subdb = subdb_mut(&mut state.subdbs, &bound.subdb)?;
        let run = subdb.key_run(key, &*self.cmp);
        if run.is_empty() {
            return Err(YdbError::not_found("key"));
        }
        Ok(subdb.entries[run.start].1.clone())
    }

    fn delete(&self, key: &[u8], txn: Option<&Transaction>) -> YdbResult<()> {
        let bound = self.bound()?;
        if let Some(txn) = txn {
            txn.ensure_writable()?;
        }

        let undo = {
            let mut state = bound.file.state.lock();
            let subdb = subdb_mut(&mut state.subdbs, &bound.subdb)?;
            if subdb.key_run(key, &*self.cmp).is_empty() {
                return Err(YdbError::not_found("key"));
            }
            bound.log(
                subdb,
                &LogRecord::Delete {
                    xids: xids_of(txn),
                    file: bound.file_name.clone(),
                    subdb: bound.subdb.clone(),
                    key: key.to_vec(),
                    value: None,
                },
            )?;
            let pairs = subdb.remove_key(key, &*self.cmp);
            state.dirty = true;
            UndoOp::Restore {
                key: key.to_vec(),
                pairs,
            }
        };
        self.push_undo(bound, txn, Some(undo))
    }

    fn remove_subdb(&mut self, name: &str) -> YdbResult<()> {
        let bound = self.bound()?;
        let mut state = bound.file.state.lock();
        if state.subdbs.remove(name).is_none() {
            return Err(YdbError::not_found(format!("sub-database {name:?}")));
        }
        bound.cache.persist(&bound.file, &mut state)?;
        debug!(file = %bound.file_name, subdb = name, "sub-database removed");
        Ok(())
    }

    fn cursor(&self) -> YdbResult<Box<dyn TreeCursor + '_>> {
        self.bound()?;
        Ok(Box::new(CachedCursor::new(self)))
    }

    fn stat(&self) -> YdbResult<DbStat> {
        let bound = self.bound()?;
        let mut state = bound.file.state.lock();
        let subdb = subdb_mut(&mut state.subdbs, &bound.subdb)?;
        Ok(DbStat {
            nkeys: subdb.distinct_keys(&*self.cmp) as u64,
            ndata: subdb.entries.len() as u64,
            page_size: subdb.node_size,
            flags: subdb.flags,
        })
    }

    fn key_range(&self, key: &[u8]) -> YdbResult<KeyRange> {
        let bound = self.bound()?;
        let mut state = bound.file.state.lock();
        let subdb = subdb_mut(&mut state.subdbs, &bound.subdb)?;
        let run = subdb.key_run(key, &*self.cmp);
        Ok(KeyRange::from_counts(
            run.start,
            run.len(),
            subdb.entries.len(),
        ))
    }
}

impl Drop for CachedTree {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to release tree file on drop");
        }
    }
}

impl fmt::Debug for CachedTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedTree")
            .field("flags", &self.flags)
            .field("node_size", &self.node_size)
            .field("file", &self.bound.as_ref().map(|b| &b.file_name))
            .field("subdb", &self.bound.as_ref().map(|b| &b.subdb))
            .finish()
    }
}

/// Reverses one mutation of a tree file.
///
/// The file is looked up by path when the undo runs, so it works even if
/// the tree handle was closed in the meantime.
struct TreeUndo {
    cache: Arc<PageCache>,
    path: PathBuf,
    subdb: String,
    op: UndoOp,
    cmp: CompareFn,
}

impl Rollback for TreeUndo {
    fn undo(&self) -> YdbResult<()> {
        let file = match self.cache.acquire(&self.path, false) {
            Ok(file) => file,
            // The file was removed; nothing left to reverse.
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        {
            let mut state = file.state.lock();
            if let Some(subdb) = state.subdbs.get_mut(&self.subdb) {
                subdb.undo(&self.op, &*self.cmp);
                state.dirty = true;
            }
        }
        self.cache.release(&file)
    }
}

/// Re-applies a logged mutation during recovery.
///
/// Records for files or sub-databases that no longer exist, and records the
/// sub-database already reflects, are skipped. Comparators are not known
/// yet, so pairs are matched byte for byte and the sub-database is marked
/// for sorting when the next handle binds it. Returns whether the record
/// changed anything.
pub(crate) fn replay(cache: &PageCache, lsn: Lsn, record: &LogRecord) -> YdbResult<bool> {
    let (file, subdb_name) = match record {
        LogRecord::Insert { file, subdb, .. } | LogRecord::Delete { file, subdb, .. } => {
            (Path::new(file), subdb)
        }
        _ => return Ok(false),
    };
    if !cache.exists(file) {
        return Ok(false);
    }

    let cached = cache.acquire(file, false)?;
    let applied = {
        let mut state = cached.state.lock();
        let applied = match state.subdbs.get_mut(subdb_name.as_str()) {
            Some(subdb) if subdb.lsn < lsn => {
                let changed = match record {
                    LogRecord::Insert { key, value, .. } => subdb.replay_insert(key, value),
                    LogRecord::Delete { key, value, .. } => {
                        subdb.replay_delete(key, value.as_deref())
                    }
                    _ => false,
                };
                subdb.lsn = lsn;
                changed
            }
            _ => false,
        };
        if applied {
            state.dirty = true;
        }
        applied
    };
    cache.release(&cached)?;
    Ok(applied)
}
