//! Database handles.

use crate::compare::CompareFn;
use crate::cursor::Cursor;
use crate::env::Environment;
use crate::error::{YdbError, YdbResult};
use crate::flags::{DbFlags, DbOpenFlags, DbType, PutFlags};
use crate::stats::{DbStat, KeyRange};
use crate::tree::{CachedTree, Tree, TreeOpen};
use crate::txn::Transaction;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct Opened {
    fname: String,
    dbname: Option<String>,
    path: PathBuf,
}

/// A named key/value store inside an [`Environment`].
///
/// The handle holds a reference on its environment from `create` until
/// `close` (or drop).
pub struct Database {
    env: Environment,
    tree: Box<dyn Tree>,
    opened: Option<Opened>,
}

impl Database {
    /// Creates an unopened database in `env`.
    ///
    /// Without an environment, a private in-memory one holding only a
    /// cache is created for this handle alone.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `env` is not open.
    pub fn create(env: Option<&Environment>) -> YdbResult<Self> {
        Self::with_tree(env, Box::new(CachedTree::new()))
    }

    /// Like [`Database::create`], over a caller-supplied tree.
    pub fn with_tree(env: Option<&Environment>, tree: Box<dyn Tree>) -> YdbResult<Self> {
        let env = match env {
            Some(env) => {
                env.check_health()?;
                if !env.is_open() {
                    return Err(YdbError::invalid_argument(
                        "database needs an open environment",
                    ));
                }
                env.clone()
            }
            None => Environment::private()?,
        };
        Ok(Self {
            env,
            tree,
            opened: None,
        })
    }

    /// Opens `dbname` inside the file `fname`, or the whole file when
    /// `dbname` is `None`.
    ///
    /// `fname` is joined to the environment's home directory.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for `EXCL` without `CREATE`
    /// - `InvalidState` if this handle is already open
    /// - `AlreadyExists` for `CREATE | EXCL` on an existing target
    /// - `NotFound` for a missing target without `CREATE`
    pub fn open(
        &mut self,
        txn: Option<&Transaction>,
        fname: &str,
        dbname: Option<&str>,
        db_type: DbType,
        flags: DbOpenFlags,
        mode: u32,
    ) -> YdbResult<()> {
        self.env.check_health()?;
        let exclusive = flags.contains(DbOpenFlags::EXCL);
        let mut create = flags.contains(DbOpenFlags::CREATE);
        if exclusive && !create {
            return Err(YdbError::invalid_argument("EXCL requires CREATE"));
        }
        if self.opened.is_some() {
            return Err(YdbError::invalid_state("database is already open"));
        }
        if let Some(txn) = txn {
            txn.ensure_active()?;
            if !txn.belongs_to(&self.env) {
                return Err(YdbError::invalid_argument(
                    "transaction belongs to another environment",
                ));
            }
        }

        let path = self.env.full_path(fname)?;
        let cache = self.env.cache()?;
        let exists = cache.exists(&path);
        if dbname.is_none() && exists && create {
            if exclusive {
                return Err(YdbError::already_exists(fname));
            }
            create = false;
        }
        if !exists && !create {
            return Err(YdbError::not_found(fname));
        }

        self.tree.open(TreeOpen {
            path: &path,
            logical_name: fname,
            subdb: dbname.unwrap_or(""),
            create,
            exclusive,
            cache: &cache,
            txn,
        })?;
        info!(
            file = fname,
            subdb = dbname,
            db_type = ?db_type,
            created = !exists,
            mode,
            "database opened"
        );
        self.opened = Some(Opened {
            fname: fname.to_string(),
            dbname: dbname.map(str::to_string),
            path,
        });
        Ok(())
    }

    fn ensure_ready(&self, txn: Option<&Transaction>) -> YdbResult<()> {
        self.env.check_health()?;
        if self.opened.is_none() {
            return Err(YdbError::invalid_state("database is not open"));
        }
        match txn {
            Some(txn) => txn.ensure_active(),
            None => Ok(()),
        }
    }

    /// Returns the first value stored under `key`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent.
    pub fn get(&self, txn: Option<&Transaction>, key: &[u8]) -> YdbResult<Vec<u8>> {
        self.ensure_ready(txn)?;
        self.tree.lookup(key)
    }

    /// Stores `value` under `key`.
    ///
    /// Overwrites an existing key unless the database keeps duplicates or
    /// `NOOVERWRITE` is given.
    pub fn put(
        &self,
        txn: Option<&Transaction>,
        key: &[u8],
        value: &[u8],
        flags: PutFlags,
    ) -> YdbResult<()> {
        self.ensure_ready(txn)?;
        self.tree.insert(key, value, flags, txn)
    }

    /// Deletes `key` with all its duplicates.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent.
    pub fn del(&self, txn: Option<&Transaction>, key: &[u8]) -> YdbResult<()> {
        self.ensure_ready(txn)?;
        self.tree.delete(key, txn)
    }

    /// Opens a cursor. Each call returns an independent position.
    pub fn cursor<'a>(&'a self, txn: Option<&'a Transaction>) -> YdbResult<Cursor<'a>> {
        self.ensure_ready(txn)?;
        Ok(Cursor::new(self, txn, self.tree.cursor()?))
    }

    /// Removes the sub-database `dbname` of `fname`, or the whole file.
    ///
    /// Consumes an unopened handle. The handle is closed in every case;
    /// the file is unlinked only if that close succeeded.
    pub fn remove(mut self, fname: &str, dbname: Option<&str>, _flags: u32) -> YdbResult<()> {
        if self.opened.is_some() {
            return Err(YdbError::invalid_state("remove needs an unopened handle"));
        }

        if let Some(name) = dbname {
            self.open(None, fname, Some(name), DbType::Unknown, DbOpenFlags::empty(), 0)?;
            let removed = self.tree.remove_subdb(name);
            let closed = self.close(0);
            if closed.is_ok() {
                info!(file = fname, subdb = name, "sub-database removed");
            }
            return closed.and(removed);
        }

        let path = self.env.full_path(fname)?;
        let cache = self.env.cache()?;
        let env = self.env.clone();
        self.close(0)?;
        let removed = cache.remove_file(&path);
        let released = env.close(0);
        removed?;
        info!(file = fname, "database file removed");
        released
    }

    /// Renames the file `namea` to `namec`.
    ///
    /// Consumes an unopened handle.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `nameb` is given; renaming a sub-database is
    /// not supported.
    pub fn rename(
        self,
        namea: &str,
        nameb: Option<&str>,
        namec: &str,
        _flags: u32,
    ) -> YdbResult<()> {
        if nameb.is_some() {
            return Err(YdbError::invalid_argument(
                "renaming a sub-database is not supported",
            ));
        }
        if self.opened.is_some() {
            return Err(YdbError::invalid_state("rename needs an unopened handle"));
        }

        let from = self.env.full_path(namea)?;
        let to = self.env.full_path(namec)?;
        let cache = self.env.cache()?;
        let env = self.env.clone();
        self.close(0)?;
        let renamed = cache.rename_file(&from, &to);
        let released = env.close(0);
        renamed?;
        info!(from = namea, to = namec, "database file renamed");
        released
    }

    /// Closes the tree, then releases the environment reference.
    ///
    /// Both steps run; the tree's error takes precedence.
    pub fn close(self, _flags: u32) -> YdbResult<()> {
        let Self {
            env,
            mut tree,
            opened,
        } = self;
        let closed = tree.close();
        drop(tree);
        if let Some(opened) = &opened {
            debug!(file = %opened.fname, subdb = opened.dbname.as_deref(), "database closed");
        }
        let released = env.close(0);
        if let Err(e) = &released {
            warn!(error = %e, "environment release failed");
        }
        closed.and(released)
    }

    /// Installs the key ordering. Set it before `open`; existing data is
    /// not re-sorted, apart from pairs recovery put back since the last
    /// open.
    pub fn set_bt_compare(&mut self, cmp: CompareFn) -> YdbResult<()> {
        self.tree.set_comparator(cmp)
    }

    /// Installs the ordering of sorted duplicates.
    pub fn set_dup_compare(&mut self, cmp: CompareFn) -> YdbResult<()> {
        self.tree.set_dup_comparator(cmp)
    }

    /// Selects the duplicate mode.
    pub fn set_flags(&mut self, flags: DbFlags) -> YdbResult<()> {
        self.tree.set_flags(flags)
    }

    /// Sets the node size in bytes.
    pub fn set_pagesize(&mut self, bytes: u32) -> YdbResult<()> {
        self.tree.set_node_size(bytes)
    }

    /// Counts keys and pairs.
    pub fn stat(&self) -> YdbResult<DbStat> {
        self.ensure_ready(None)?;
        self.tree.stat()
    }

    /// Estimates the fraction of pairs before, at and after `key`.
    pub fn key_range(&self, txn: Option<&Transaction>, key: &[u8]) -> YdbResult<KeyRange> {
        self.ensure_ready(txn)?;
        self.tree.key_range(key)
    }

    /// The owning environment.
    #[must_use]
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Returns true once `open` succeeded.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.opened.is_some()
    }

    /// File name passed to `open`.
    #[must_use]
    pub fn fname(&self) -> Option<&str> {
        self.opened.as_ref().map(|o| o.fname.as_str())
    }

    /// Sub-database name passed to `open`.
    #[must_use]
    pub fn dbname(&self) -> Option<&str> {
        self.opened.as_ref().and_then(|o| o.dbname.as_deref())
    }

    /// Full path of the open file.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        self.opened.as_ref().map(|o| o.path.as_path())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("fname", &self.fname())
            .field("dbname", &self.dbname())
            .field("tree", &self.tree)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn open_private(name: &str, flags: DbOpenFlags) -> Database {
        let mut db = Database::create(None).unwrap();
        db.open(None, name, None, DbType::BTree, flags, 0o644).unwrap();
        db
    }

    #[test]
    fn put_get_del() {
        let db = open_private("t1", DbOpenFlags::CREATE);
        db.put(None, b"k", b"v", PutFlags::empty()).unwrap();
        assert_eq!(db.get(None, b"k").unwrap(), b"v");
        db.del(None, b"k").unwrap();
        assert!(db.get(None, b"k").unwrap_err().is_not_found());
        assert!(db.del(None, b"k").unwrap_err().is_not_found());
        db.close(0).unwrap();
    }

    #[test]
    fn create_needs_open_environment() {
        let env = Environment::create();
        let err = Database::create(Some(&env)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn excl_without_create_is_rejected() {
        let mut db = Database::create(None).unwrap();
        let err = db
            .open(None, "t1", None, DbType::BTree, DbOpenFlags::EXCL, 0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!db.is_open());
    }

    #[test]
    fn missing_file_without_create() {
        let mut db = Database::create(None).unwrap();
        let err = db
            .open(None, "nope", None, DbType::BTree, DbOpenFlags::empty(), 0)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn second_open_is_invalid_state() {
        let mut db = open_private("t1", DbOpenFlags::CREATE);
        let err = db
            .open(None, "t2", None, DbType::BTree, DbOpenFlags::CREATE, 0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(db.fname(), Some("t1"));
    }

    #[test]
    fn operations_need_open_handle() {
        let db = Database::create(None).unwrap();
        assert_eq!(
            db.get(None, b"k").unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert!(db.cursor(None).is_err());
    }

    #[test]
    fn config_after_open_is_rejected() {
        let mut db = open_private("t1", DbOpenFlags::CREATE);
        assert_eq!(
            db.set_flags(DbFlags::DUP).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            db.set_pagesize(1024).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn pagesize_must_be_power_of_two() {
        let mut db = Database::create(None).unwrap();
        assert_eq!(
            db.set_pagesize(1000).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        db.set_pagesize(1024).unwrap();
        db.open(None, "t1", None, DbType::BTree, DbOpenFlags::CREATE, 0)
            .unwrap();
        assert_eq!(db.stat().unwrap().page_size, 1024);
    }

    #[test]
    fn rename_rejects_subdb_target() {
        let db = Database::create(None).unwrap();
        let err = db.rename("a", Some("sub"), "b", 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn stat_and_key_range() {
        let mut db = Database::create(None).unwrap();
        db.set_flags(DbFlags::DUP).unwrap();
        db.open(None, "t1", None, DbType::BTree, DbOpenFlags::CREATE, 0)
            .unwrap();
        for (k, v) in [("a", "1"), ("b", "1"), ("b", "2"), ("c", "1")] {
            db.put(None, k.as_bytes(), v.as_bytes(), PutFlags::empty())
                .unwrap();
        }
        let stat = db.stat().unwrap();
        assert_eq!((stat.nkeys, stat.ndata), (3, 4));
        assert_eq!(stat.flags, DbFlags::DUP);
        let range = db.key_range(None, b"b").unwrap();
        assert_eq!((range.less, range.equal, range.greater), (0.25, 0.5, 0.25));
    }
}
