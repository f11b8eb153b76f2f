//! Where byte stores come from: the OS, or a process-local table.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// A minimal filesystem used for every file the engine touches.
///
/// The memory variant never creates directories: every directory is
/// considered to exist, and files are keyed by their full path.
pub enum Vfs {
    /// Files live on disk.
    Disk,
    /// Files live in this table and vanish with it.
    Memory(Mutex<HashMap<PathBuf, InMemoryBackend>>),
}

impl Vfs {
    /// Creates a disk-backed filesystem.
    #[must_use]
    pub fn disk() -> Self {
        Self::Disk
    }

    /// Creates an empty in-process filesystem.
    #[must_use]
    pub fn memory() -> Self {
        Self::Memory(Mutex::new(HashMap::new()))
    }

    /// Returns true for the in-process variant.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory(_))
    }

    /// Returns true if a file exists at `path`.
    #[must_use]
    pub fn exists(&self, path: &Path) -> bool {
        match self {
            Self::Disk => path.exists(),
            Self::Memory(files) => files.lock().contains_key(path),
        }
    }

    /// Returns true if `path` names a directory.
    #[must_use]
    pub fn is_dir(&self, path: &Path) -> bool {
        match self {
            Self::Disk => path.is_dir(),
            Self::Memory(_) => true,
        }
    }

    /// Opens the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the file is absent and
    /// `create` is false.
    pub fn open(&self, path: &Path, create: bool) -> StorageResult<Box<dyn StorageBackend>> {
        match self {
            Self::Disk => {
                let backend = if create {
                    FileBackend::open(path)?
                } else {
                    FileBackend::open_existing(path)?
                };
                Ok(Box::new(backend))
            }
            Self::Memory(files) => {
                let mut files = files.lock();
                if let Some(existing) = files.get(path) {
                    return Ok(Box::new(existing.clone()));
                }
                if !create {
                    return Err(StorageError::NotFound {
                        path: path.to_path_buf(),
                    });
                }
                let backend = InMemoryBackend::new();
                files.insert(path.to_path_buf(), backend.clone());
                Ok(Box::new(backend))
            }
        }
    }

    /// Unlinks the file at `path`.
    pub fn remove(&self, path: &Path) -> StorageResult<()> {
        match self {
            Self::Disk => fs::remove_file(path).map_err(|e| StorageError::from_io(path, e)),
            Self::Memory(files) => match files.lock().remove(path) {
                Some(_) => Ok(()),
                None => Err(StorageError::NotFound {
                    path: path.to_path_buf(),
                }),
            },
        }
    }

    /// Renames `from` to `to`, replacing any file already at `to`.
    pub fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        match self {
            Self::Disk => fs::rename(from, to).map_err(|e| StorageError::from_io(from, e)),
            Self::Memory(files) => {
                let mut files = files.lock();
                let backend = files.remove(from).ok_or_else(|| StorageError::NotFound {
                    path: from.to_path_buf(),
                })?;
                files.insert(to.to_path_buf(), backend);
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Vfs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disk => f.write_str("Vfs::Disk"),
            Self::Memory(files) => f
                .debug_struct("Vfs::Memory")
                .field("files", &files.lock().len())
                .finish(),
        }
    }
}
