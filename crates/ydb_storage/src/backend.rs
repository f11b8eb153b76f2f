//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store.
///
/// Backends are **opaque**: the log writer appends framed records, the tree
/// cache rewrites whole files. Neither shape is known here.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `sync` makes all appended data and the store's size durable
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not
    /// fully inside the store.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the store, returning its offset.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the OS.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes (the offset of the next append).
    fn size(&self) -> StorageResult<u64>;

    /// Makes data and metadata durable.
    fn sync(&mut self) -> StorageResult<()>;

    /// Shrinks the store to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` is larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Reads the whole store.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| crate::StorageError::ReadPastEnd {
            offset: 0,
            len: usize::MAX,
            size,
        })?;
        self.read_at(0, len)
    }

    /// Replaces the whole content of the store with `data` and syncs it.
    fn overwrite(&mut self, data: &[u8]) -> StorageResult<()> {
        self.truncate(0)?;
        self.append(data)?;
        self.sync()
    }
}
