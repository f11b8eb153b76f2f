//! The environment: shared logger, cache and configuration.
//!
//! An [`Environment`] is a cheap handle; clones share one environment and
//! act as its reference count. Databases and transactions hold a clone, so
//! the logger and cache are shut down only when the last of them lets go.
//!
//! ```text
//! create ──set_*──▶ configured ──open──▶ live ──last close/drop──▶ shut down
//! ```

use crate::cache::PageCache;
use crate::config::{parse_db_config, resolve_dir, EnvConfig, DB_CONFIG_FILE};
use crate::error::{YdbError, YdbResult};
use crate::flags::EnvOpenFlags;
use crate::log::{LogRecord, Logger, WalLogger};
use crate::stats::{TxnCounters, TxnStat};
use crate::tree::replay;
use crate::txn::Transaction;
use crate::types::{Lsn, TxnId};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use ydb_storage::Vfs;

/// Longest path the environment will build.
pub const MAX_PATH_LEN: usize = 4096;

/// Receives formatted error messages, see [`Environment::set_errcall`].
pub type ErrCallback = Arc<dyn Fn(&str) + Send + Sync>;

struct Live {
    home: PathBuf,
    flags: EnvOpenFlags,
    mode: u32,
    vfs: Arc<Vfs>,
    logger: Option<Arc<dyn Logger>>,
    cache: Arc<PageCache>,
}

struct EnvState {
    config: EnvConfig,
    ncache: u32,
    logger_override: Option<Arc<dyn Logger>>,
    errcall: Option<ErrCallback>,
    live: Option<Live>,
}

pub(crate) struct EnvInner {
    state: RwLock<EnvState>,
    next_txnid: AtomicU64,
    counters: TxnCounters,
    poisoned: AtomicBool,
}

impl EnvInner {
    /// Closes the cache, then the logger. Both are attempted; the first
    /// error wins.
    fn shutdown(&self) -> YdbResult<()> {
        let Some(live) = self.state.write().live.take() else {
            return Ok(());
        };
        let cache_result = live.cache.close();
        let logger_result = live.logger.as_ref().map_or(Ok(()), |logger| logger.close());
        info!(home = %live.home.display(), "environment closed");
        cache_result.and(logger_result)
    }
}

impl Drop for EnvInner {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "environment shutdown failed");
        }
    }
}

/// A handle on a shared environment.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvInner>,
}

impl Environment {
    /// Creates an unopened environment with default configuration.
    #[must_use]
    pub fn create() -> Self {
        Self::with_config(EnvConfig::default())
    }

    /// Creates an unopened environment from `config`.
    #[must_use]
    pub fn with_config(config: EnvConfig) -> Self {
        Self {
            inner: Arc::new(EnvInner {
                state: RwLock::new(EnvState {
                    config,
                    ncache: 1,
                    logger_override: None,
                    errcall: None,
                    live: None,
                }),
                next_txnid: AtomicU64::new(1),
                counters: TxnCounters::default(),
                poisoned: AtomicBool::new(false),
            }),
        }
    }

    /// Opens a private in-memory environment holding only a cache.
    pub(crate) fn private() -> YdbResult<Self> {
        let env = Self::with_config(EnvConfig::new().in_memory(true));
        env.open(".", EnvOpenFlags::PRIVATE | EnvOpenFlags::INIT_MPOOL, 0)?;
        Ok(env)
    }

    /// Opens the environment rooted at `home`.
    ///
    /// Reads `DB_CONFIG` from `home` if present, opens the log when
    /// `INIT_TXN` or `INIT_LOG` is given, creates the cache and, with
    /// `RECOVER`, replays committed work from the log. Nothing is kept if
    /// any step fails.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if already open
    /// - `InvalidArgument` without `PRIVATE`, or for a bad `DB_CONFIG`
    /// - `NotFound` if `home` is not a directory
    pub fn open(&self, home: impl AsRef<Path>, flags: EnvOpenFlags, mode: u32) -> YdbResult<()> {
        self.check_health()?;
        let home = home.as_ref();
        let mut state = self.inner.state.write();
        if state.live.is_some() {
            return Err(YdbError::invalid_state("environment is already open"));
        }
        if !flags.contains(EnvOpenFlags::PRIVATE) {
            return Err(YdbError::invalid_argument(
                "only private environments are supported",
            ));
        }

        let vfs = Arc::new(if state.config.in_memory {
            Vfs::memory()
        } else {
            Vfs::disk()
        });
        if !vfs.is_dir(home) {
            return Err(YdbError::not_found(format!(
                "home directory {}",
                home.display()
            )));
        }

        let mut config = state.config.clone();
        if !vfs.is_memory() {
            match std::fs::read_to_string(home.join(DB_CONFIG_FILE)) {
                Ok(text) => {
                    config = parse_db_config(&config, &text)?;
                    debug!(home = %home.display(), "applied DB_CONFIG");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let logger: Option<Arc<dyn Logger>> =
            if flags.intersects(EnvOpenFlags::INIT_TXN | EnvOpenFlags::INIT_LOG) {
                Some(match &state.logger_override {
                    Some(logger) => Arc::clone(logger),
                    None => {
                        let dir = config
                            .lg_dir
                            .as_deref()
                            .map_or_else(|| home.to_path_buf(), |dir| resolve_dir(home, dir));
                        Arc::new(WalLogger::open(&vfs, &dir)?) as Arc<dyn Logger>
                    }
                })
            } else {
                None
            };

        let start_lsn = logger.as_ref().map_or_else(Lsn::default, |l| l.last_lsn());
        let cache = Arc::new(PageCache::new(
            Arc::clone(&vfs),
            config.cache_bytes(),
            start_lsn,
            logger.clone(),
        ));

        if let Some(logger) = &logger {
            let recovered = if flags.contains(EnvOpenFlags::RECOVER) {
                recover(&cache, logger.as_ref())
            } else {
                Ok(())
            };
            if let Err(e) = recovered {
                if let Err(close_err) = logger.close() {
                    warn!(error = %close_err, "failed to close log after open error");
                }
                return Err(e);
            }
            let next = logger.last_txnid().map_or(1, |id| id.as_u64() + 1);
            self.inner.next_txnid.fetch_max(next, Ordering::SeqCst);
        }

        info!(
            home = %home.display(),
            flags = ?flags,
            logging = logger.is_some(),
            cache_bytes = config.cache_bytes(),
            "environment opened"
        );
        state.config = config;
        state.live = Some(Live {
            home: home.to_path_buf(),
            flags,
            mode,
            vfs,
            logger,
            cache,
        });
        Ok(())
    }

    /// Releases this reference; the last one shuts the environment down.
    ///
    /// The reference is consumed whatever the outcome: with bad `flags` it
    /// is still released, and shut down if it was the last, before
    /// `InvalidArgument` is returned.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for non-zero `flags`. Otherwise, from the last
    /// reference, the first error of closing the cache and the logger.
    pub fn close(self, flags: u32) -> YdbResult<()> {
        let released = self.release();
        if flags != 0 {
            if let Err(e) = released {
                warn!(error = %e, "shutdown failed during rejected close");
            }
            return Err(YdbError::invalid_argument("close takes no flags"));
        }
        released
    }

    fn release(self) -> YdbResult<()> {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner.shutdown(),
            Err(_) => {
                debug!("environment reference released");
                Ok(())
            }
        }
    }

    /// Number of live handles on this environment.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Returns true once `open` succeeded.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.state.read().live.is_some()
    }

    fn configure(&self, apply: impl FnOnce(&mut EnvState)) -> YdbResult<()> {
        let mut state = self.inner.state.write();
        if state.live.is_some() {
            return Err(YdbError::invalid_state(
                "environment is open; configure it before opening",
            ));
        }
        apply(&mut state);
        Ok(())
    }

    /// Sets the cache budget to `gbytes * 2^30 + bytes`.
    pub fn set_cachesize(&self, gbytes: u32, bytes: u32, ncache: u32) -> YdbResult<()> {
        self.configure(|state| {
            state.config.cache = Some((gbytes, bytes));
            state.ncache = ncache;
        })
    }

    /// Sets the data directory.
    pub fn set_data_dir(&self, dir: impl Into<PathBuf>) -> YdbResult<()> {
        let dir = dir.into();
        self.configure(|state| state.config.data_dir = Some(dir))
    }

    /// Sets the temporary directory.
    pub fn set_tmp_dir(&self, dir: impl Into<PathBuf>) -> YdbResult<()> {
        let dir = dir.into();
        self.configure(|state| state.config.tmp_dir = Some(dir))
    }

    /// Sets the log directory.
    pub fn set_lg_dir(&self, dir: impl Into<PathBuf>) -> YdbResult<()> {
        let dir = dir.into();
        self.configure(|state| state.config.lg_dir = Some(dir))
    }

    /// Uses `logger` instead of opening a log in the log directory.
    pub fn set_logger(&self, logger: Arc<dyn Logger>) -> YdbResult<()> {
        self.configure(|state| state.logger_override = Some(logger))
    }

    /// Routes messages from [`Environment::err`] to `callback`.
    pub fn set_errcall(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.state.write().errcall = Some(Arc::new(callback));
    }

    /// Sets the prefix of messages from [`Environment::err`].
    pub fn set_errpfx(&self, prefix: impl Into<String>) {
        self.inner.state.write().config.errpfx = Some(prefix.into());
    }

    /// Reports `error` through the error callback.
    ///
    /// The message reads `"<prefix>: YDB Error <kind>: <message>"`. This is
    /// advisory; the caller still gets `error` as a result.
    pub fn err(&self, error: &YdbError, message: &str) {
        let (prefix, callback) = {
            let state = self.inner.state.read();
            (state.config.errpfx.clone(), state.errcall.clone())
        };
        let message = if message.is_empty() {
            error.to_string()
        } else {
            message.to_string()
        };
        let line = match prefix {
            Some(prefix) => format!("{prefix}: YDB Error {}: {message}", error.kind()),
            None => format!("YDB Error {}: {message}", error.kind()),
        };
        match callback {
            Some(callback) => callback(&line),
            None => error!(target: "ydb", "{line}"),
        }
    }

    /// Not supported.
    pub fn set_lk_detect(&self, _policy: u32) -> YdbResult<()> {
        Err(YdbError::unimplemented("set_lk_detect"))
    }

    /// Accepted and ignored.
    pub fn set_lk_max(&self, _max: u32) -> YdbResult<()> {
        Ok(())
    }

    /// Not supported.
    pub fn set_lg_bsize(&self, _bytes: u32) -> YdbResult<()> {
        Err(YdbError::unimplemented("set_lg_bsize"))
    }

    /// Not supported.
    pub fn set_lg_max(&self, _bytes: u32) -> YdbResult<()> {
        Err(YdbError::unimplemented("set_lg_max"))
    }

    /// Not supported.
    pub fn set_verbose(&self, _which: u32, _on: bool) -> YdbResult<()> {
        Err(YdbError::unimplemented("set_verbose"))
    }

    /// No environment flags are supported; an empty set is accepted.
    pub fn set_flags(&self, flags: u32, _on: bool) -> YdbResult<()> {
        if flags == 0 {
            Ok(())
        } else {
            Err(YdbError::unimplemented("set_flags"))
        }
    }

    /// Snapshot of the configuration, including `DB_CONFIG` once open.
    #[must_use]
    pub fn config(&self) -> EnvConfig {
        self.inner.state.read().config.clone()
    }

    /// Home directory, once open.
    #[must_use]
    pub fn home(&self) -> Option<PathBuf> {
        self.inner.state.read().live.as_ref().map(|live| live.home.clone())
    }

    /// Flags the environment was opened with.
    #[must_use]
    pub fn open_flags(&self) -> Option<EnvOpenFlags> {
        self.inner.state.read().live.as_ref().map(|live| live.flags)
    }

    /// Mode the environment was opened with.
    #[must_use]
    pub fn open_mode(&self) -> Option<u32> {
        self.inner.state.read().live.as_ref().map(|live| live.mode)
    }

    /// Configured data directory.
    #[must_use]
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.inner.state.read().config.data_dir.clone()
    }

    /// Configured temporary directory.
    #[must_use]
    pub fn tmp_dir(&self) -> Option<PathBuf> {
        self.inner.state.read().config.tmp_dir.clone()
    }

    /// Configured log directory.
    #[must_use]
    pub fn lg_dir(&self) -> Option<PathBuf> {
        self.inner.state.read().config.lg_dir.clone()
    }

    /// Cache budget as `(gbytes, bytes, ncache)`.
    #[must_use]
    pub fn cachesize(&self) -> (u32, u32, u32) {
        let state = self.inner.state.read();
        let bytes = state.config.cache_bytes();
        ((bytes >> 30) as u32, (bytes & ((1 << 30) - 1)) as u32, state.ncache)
    }

    /// Error prefix, if set.
    #[must_use]
    pub fn errpfx(&self) -> Option<String> {
        self.inner.state.read().config.errpfx.clone()
    }

    /// Begins a transaction, nested under `parent` if given.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the environment is not open, `InvalidArgument` for
    /// a resolved parent, `CapacityExceeded` past the nesting limit, or the
    /// logger's error.
    pub fn txn_begin(&self, parent: Option<&Transaction>) -> YdbResult<Transaction> {
        self.check_health()?;
        if !self.is_open() {
            return Err(YdbError::invalid_state("environment is not open"));
        }
        Transaction::begin(self, parent)
    }

    /// Writes back every cached file, then truncates the log.
    pub fn txn_checkpoint(&self) -> YdbResult<()> {
        self.check_health()?;
        let (cache, logger) = {
            let state = self.inner.state.read();
            let live = state
                .live
                .as_ref()
                .ok_or_else(|| YdbError::invalid_state("environment is not open"))?;
            (Arc::clone(&live.cache), live.logger.clone())
        };
        cache.flush_all()?;
        let lsn = match logger {
            Some(logger) => Some(logger.checkpoint(self.last_txnid())?),
            None => None,
        };
        self.inner.counters.record_checkpoint();
        info!(lsn = lsn.map(Lsn::as_u64), "checkpoint taken");
        Ok(())
    }

    /// Transaction counters.
    pub fn txn_stat(&self) -> YdbResult<TxnStat> {
        self.check_health()?;
        Ok(self.inner.counters.snapshot(self.last_txnid()))
    }

    /// Forces the log to stable storage. A no-op without a log.
    pub fn log_flush(&self) -> YdbResult<()> {
        self.check_health()?;
        match self.logger() {
            Some(logger) => logger.flush(),
            None => Ok(()),
        }
    }

    /// Log files no longer needed; checkpoints truncate in place, so
    /// there never are any.
    pub fn log_archive(&self, _flags: u32) -> YdbResult<Vec<PathBuf>> {
        self.check_health()?;
        Ok(Vec::new())
    }

    /// Joins `fname` to the home directory.
    ///
    /// # Errors
    ///
    /// `InvalidState` if not open, `NameTooLong` past [`MAX_PATH_LEN`].
    pub fn full_path(&self, fname: impl AsRef<Path>) -> YdbResult<PathBuf> {
        let state = self.inner.state.read();
        let live = state
            .live
            .as_ref()
            .ok_or_else(|| YdbError::invalid_state("environment is not open"))?;
        let path = resolve_dir(&live.home, fname.as_ref());
        if path.as_os_str().len() > MAX_PATH_LEN {
            return Err(YdbError::NameTooLong { path });
        }
        Ok(path)
    }

    pub(crate) fn cache(&self) -> YdbResult<Arc<PageCache>> {
        let state = self.inner.state.read();
        state
            .live
            .as_ref()
            .map(|live| Arc::clone(&live.cache))
            .ok_or_else(|| YdbError::invalid_state("environment is not open"))
    }

    pub(crate) fn logger(&self) -> Option<Arc<dyn Logger>> {
        let state = self.inner.state.read();
        state.live.as_ref().and_then(|live| live.logger.clone())
    }

    pub(crate) fn vfs(&self) -> YdbResult<Arc<Vfs>> {
        let state = self.inner.state.read();
        state
            .live
            .as_ref()
            .map(|live| Arc::clone(&live.vfs))
            .ok_or_else(|| YdbError::invalid_state("environment is not open"))
    }

    pub(crate) fn counters(&self) -> &TxnCounters {
        &self.inner.counters
    }

    pub(crate) fn allocate_txnid(&self) -> TxnId {
        TxnId::new(self.inner.next_txnid.fetch_add(1, Ordering::SeqCst))
    }

    fn last_txnid(&self) -> Option<TxnId> {
        match self.inner.next_txnid.load(Ordering::SeqCst) {
            0 | 1 => None,
            next => Some(TxnId::new(next - 1)),
        }
    }

    pub(crate) fn same_as(&self, other: &Environment) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Marks the environment unusable after a failed rollback.
    pub(crate) fn poison(&self) {
        self.inner.poisoned.store(true, Ordering::SeqCst);
    }

    pub(crate) fn check_health(&self) -> YdbResult<()> {
        if self.inner.poisoned.load(Ordering::SeqCst) {
            Err(YdbError::EnvironmentPoisoned)
        } else {
            Ok(())
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::create()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Environment")
            .field("home", &state.live.as_ref().map(|live| &live.home))
            .field("refs", &Arc::strong_count(&self.inner))
            .finish()
    }
}

/// Replays committed mutations from the log, then checkpoints.
///
/// A mutation counts as committed when every id in its chain committed; a
/// mutation made outside any transaction always counts.
fn recover(cache: &PageCache, logger: &dyn Logger) -> YdbResult<()> {
    let entries = logger.entries()?;
    let committed: HashSet<TxnId> = entries
        .iter()
        .filter_map(|entry| match entry.record {
            LogRecord::Commit { txid } => Some(txid),
            _ => None,
        })
        .collect();

    let mut replayed = 0usize;
    for entry in &entries {
        let xids = match &entry.record {
            LogRecord::Insert { xids, .. } | LogRecord::Delete { xids, .. } => xids,
            _ => continue,
        };
        if xids.ids().iter().all(|id| committed.contains(id))
            && replay(cache, entry.lsn, &entry.record)?
        {
            replayed += 1;
        }
    }

    cache.flush_all()?;
    logger.checkpoint(logger.last_txnid())?;
    info!(
        records = entries.len(),
        committed = committed.len(),
        replayed,
        "recovery complete"
    );
    Ok(())
}
