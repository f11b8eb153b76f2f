//! Shared table of open tree files.
//!
//! Every tree handle in an environment reaches its file through the
//! [`PageCache`]. Two handles on the same path share one [`CachedFile`], so
//! a write through one is immediately visible through the other.
//!
//! Files are reference counted by the tree handles that hold them. A file is
//! written back when its last handle lets go, on [`PageCache::flush_all`],
//! and on [`PageCache::close`]. Unreferenced files are dropped from memory
//! once the table grows past its budget.

use crate::error::{YdbError, YdbResult};
use crate::log::Logger;
use crate::tree::file::{decode_file, encode_file};
use crate::tree::subdb::SubDb;
use crate::types::Lsn;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use ydb_storage::Vfs;

/// Mutable contents of a cached file.
#[derive(Debug)]
pub(crate) struct FileState {
    pub(crate) subdbs: BTreeMap<String, SubDb>,
    pub(crate) dirty: bool,
    refs: usize,
}

impl FileState {
    fn footprint(&self) -> u64 {
        self.subdbs.values().map(SubDb::footprint).sum()
    }
}

/// One tree file held by the cache.
#[derive(Debug)]
pub struct CachedFile {
    path: PathBuf,
    pub(crate) state: Mutex<FileState>,
}

impl CachedFile {
    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Budgeted cache of tree files for one environment.
pub struct PageCache {
    vfs: Arc<Vfs>,
    budget: u64,
    start_lsn: Lsn,
    logger: Option<Arc<dyn Logger>>,
    files: Mutex<HashMap<PathBuf, Arc<CachedFile>>>,
}

impl PageCache {
    /// Creates an empty cache.
    ///
    /// `logger`, when present, receives a record for every mutation made
    /// through trees opened on this cache.
    #[must_use]
    pub fn new(
        vfs: Arc<Vfs>,
        budget: u64,
        start_lsn: Lsn,
        logger: Option<Arc<dyn Logger>>,
    ) -> Self {
        debug!(budget, start_lsn = start_lsn.as_u64(), "page cache created");
        Self {
            vfs,
            budget,
            start_lsn,
            logger,
            files: Mutex::new(HashMap::new()),
        }
    }

    /// The filesystem files are read from and written to.
    #[must_use]
    pub fn vfs(&self) -> &Arc<Vfs> {
        &self.vfs
    }

    /// The logger shared with the environment.
    #[must_use]
    pub fn logger(&self) -> Option<&Arc<dyn Logger>> {
        self.logger.as_ref()
    }

    /// Size budget in bytes.
    #[must_use]
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// LSN the log stood at when the cache was created.
    #[must_use]
    pub fn start_lsn(&self) -> Lsn {
        self.start_lsn
    }

    /// Approximate bytes held by cached files.
    #[must_use]
    pub fn usage(&self) -> u64 {
        self.files
            .lock()
            .values()
            .map(|file| file.state.lock().footprint())
            .sum()
    }

    /// Returns true if `path` is cached or exists in the filesystem.
    #[must_use]
    pub fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path) || self.vfs.exists(path)
    }

    /// Takes a reference to the file at `path`, loading it if needed.
    ///
    /// With `create`, a missing file is created and written out at once so
    /// that it exists on disk from here on.
    ///
    /// # Errors
    ///
    /// `NotFound` if the file is missing and `create` is false, or any
    /// error reading or decoding the file.
    pub fn acquire(&self, path: &Path, create: bool) -> YdbResult<Arc<CachedFile>> {
        let file = {
            let mut files = self.files.lock();
            if let Some(file) = files.get(path) {
                file.state.lock().refs += 1;
                return Ok(Arc::clone(file));
            }

            let subdbs = if self.vfs.exists(path) {
                let bytes = self.vfs.open(path, false)?.read_all()?;
                decode_file(&bytes)?
            } else if create {
                let subdbs = BTreeMap::new();
                self.vfs.open(path, true)?.overwrite(&encode_file(&subdbs)?)?;
                debug!(path = %path.display(), "tree file created");
                subdbs
            } else {
                return Err(YdbError::not_found(format!("file {}", path.display())));
            };

            let file = Arc::new(CachedFile {
                path: path.to_path_buf(),
                state: Mutex::new(FileState {
                    subdbs,
                    dirty: false,
                    refs: 1,
                }),
            });
            files.insert(path.to_path_buf(), Arc::clone(&file));
            file
        };
        self.evict_if_needed();
        Ok(file)
    }

    /// Gives back a reference taken by [`PageCache::acquire`].
    ///
    /// The last reference writes the file back if it changed.
    pub fn release(&self, file: &CachedFile) -> YdbResult<()> {
        let result = {
            let mut state = file.state.lock();
            state.refs = state.refs.saturating_sub(1);
            if state.refs == 0 && state.dirty {
                self.persist(file, &mut state)
            } else {
                Ok(())
            }
        };
        self.evict_if_needed();
        result
    }

    /// Writes `state` back to `file`'s path.
    pub(crate) fn persist(&self, file: &CachedFile, state: &mut FileState) -> YdbResult<()> {
        let image = encode_file(&state.subdbs)?;
        let mut backend = self.vfs.open(&file.path, true)?;
        backend.overwrite(&image)?;
        backend.sync()?;
        state.dirty = false;
        Ok(())
    }

    /// Writes back every changed file.
    ///
    /// Every file is attempted; the first error is returned.
    pub fn flush_all(&self) -> YdbResult<()> {
        let files: Vec<Arc<CachedFile>> = self.files.lock().values().cloned().collect();
        let mut first_error = None;
        for file in files {
            let mut state = file.state.lock();
            if state.dirty {
                if let Err(e) = self.persist(&file, &mut state) {
                    warn!(path = %file.path.display(), error = %e, "write-back failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Writes back every changed file and empties the table.
    pub fn close(&self) -> YdbResult<()> {
        let result = self.flush_all();
        let mut files = self.files.lock();
        for file in files.values() {
            let refs = file.state.lock().refs;
            if refs > 0 {
                warn!(path = %file.path.display(), refs, "closing cache with open trees");
            }
        }
        files.clear();
        debug!("page cache closed");
        result
    }

    /// Unlinks the file at `path`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if a tree still has the file open.
    pub fn remove_file(&self, path: &Path) -> YdbResult<()> {
        let mut files = self.files.lock();
        if let Some(file) = files.get(path) {
            if file.state.lock().refs > 0 {
                return Err(YdbError::invalid_state(format!(
                    "{} is open",
                    path.display()
                )));
            }
            files.remove(path);
        }
        self.vfs.remove(path)?;
        Ok(())
    }

    /// Renames the file at `from` to `to`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if a tree has either file open.
    pub fn rename_file(&self, from: &Path, to: &Path) -> YdbResult<()> {
        let mut files = self.files.lock();
        for path in [from, to] {
            if let Some(file) = files.get(path) {
                let mut state = file.state.lock();
                if state.refs > 0 {
                    return Err(YdbError::invalid_state(format!(
                        "{} is open",
                        path.display()
                    )));
                }
                if state.dirty {
                    self.persist(file, &mut state)?;
                }
            }
        }
        files.remove(from);
        files.remove(to);
        self.vfs.rename(from, to)?;
        Ok(())
    }

    fn evict_if_needed(&self) {
        let mut files = self.files.lock();
        let mut usage: u64 = files.values().map(|f| f.state.lock().footprint()).sum();
        if usage <= self.budget {
            return;
        }
        let idle: Vec<PathBuf> = files
            .iter()
            .filter(|(_, f)| {
                let state = f.state.lock();
                state.refs == 0 && !state.dirty
            })
            .map(|(path, _)| path.clone())
            .collect();
        for path in idle {
            if usage <= self.budget {
                break;
            }
            if let Some(file) = files.remove(&path) {
                usage = usage.saturating_sub(file.state.lock().footprint());
                debug!(path = %path.display(), "evicted tree file");
            }
        }
    }
}

impl fmt::Debug for PageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCache")
            .field("budget", &self.budget)
            .field("files", &self.files.lock().len())
            .finish()
    }
}
