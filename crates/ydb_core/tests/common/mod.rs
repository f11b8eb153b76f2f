//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use ydb_core::log::{LogEntry, LogRecord, Logger, WalLogger};
use ydb_core::{
    Database, DbOpenFlags, DbType, EnvConfig, EnvOpenFlags, Environment, Lsn, TxnId, YdbError,
    YdbResult,
};
use ydb_storage::Vfs;

/// Flags of a transactional environment.
pub fn txn_flags() -> EnvOpenFlags {
    EnvOpenFlags::PRIVATE | EnvOpenFlags::INIT_MPOOL | EnvOpenFlags::INIT_TXN
}

/// An on-disk environment with automatic cleanup.
pub struct TestEnv {
    /// The environment.
    pub env: Environment,
    /// Kept alive so the directory outlives the environment.
    pub dir: TempDir,
}

impl TestEnv {
    /// Opens a transactional environment in a fresh directory.
    pub fn disk() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let env = Environment::create();
        env.open(dir.path(), txn_flags(), 0)
            .expect("Failed to open environment");
        Self { env, dir }
    }

    /// Opens a transactional in-memory environment.
    pub fn memory() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let env = Environment::with_config(EnvConfig::new().in_memory(true));
        env.open(".", txn_flags(), 0)
            .expect("Failed to open environment");
        Self { env, dir }
    }

    /// Opens (creating) the whole-file database `name`.
    pub fn db(&self, name: &str) -> Database {
        let mut db = Database::create(Some(&self.env)).expect("Failed to create database");
        db.open(None, name, None, DbType::BTree, DbOpenFlags::CREATE, 0o644)
            .expect("Failed to open database");
        db
    }
}

/// A logger that counts closes and can be told to refuse commits.
#[derive(Debug)]
pub struct CountingLogger {
    inner: WalLogger,
    closes: AtomicUsize,
    fail_commits: AtomicBool,
}

impl CountingLogger {
    /// Creates a counting logger over an in-memory log.
    pub fn new() -> Arc<Self> {
        let inner = WalLogger::open(&Vfs::memory(), Path::new("."))
            .expect("Failed to open in-memory log");
        Arc::new(Self {
            inner,
            closes: AtomicUsize::new(0),
            fail_commits: AtomicBool::new(false),
        })
    }

    /// Number of `close` calls seen.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Makes every following commit fail, or succeed again.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

impl Logger for CountingLogger {
    fn append(&self, record: &LogRecord) -> YdbResult<Lsn> {
        self.inner.append(record)
    }

    fn flush(&self) -> YdbResult<()> {
        self.inner.flush()
    }

    fn commit(&self, txid: TxnId) -> YdbResult<Lsn> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(YdbError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.commit(txid)
    }

    fn checkpoint(&self, last_txnid: Option<TxnId>) -> YdbResult<Lsn> {
        self.inner.checkpoint(last_txnid)
    }

    fn last_lsn(&self) -> Lsn {
        self.inner.last_lsn()
    }

    fn last_txnid(&self) -> Option<TxnId> {
        self.inner.last_txnid()
    }

    fn entries(&self) -> YdbResult<Vec<LogEntry>> {
        self.inner.entries()
    }

    fn close(&self) -> YdbResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}
