//! Flag sets accepted by environment, database and cursor operations.

use bitflags::bitflags;

bitflags! {
    /// Flags for [`crate::Environment::open`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EnvOpenFlags: u32 {
        /// Create missing environment files.
        const CREATE = 1 << 0;
        /// Initialize the page cache.
        const INIT_MPOOL = 1 << 1;
        /// Initialize transactions (opens the logger).
        const INIT_TXN = 1 << 2;
        /// Initialize logging (opens the logger).
        const INIT_LOG = 1 << 3;
        /// Accepted for compatibility; locking is not separately initialized.
        const INIT_LOCK = 1 << 4;
        /// In-process environment. Required.
        const PRIVATE = 1 << 5;
        /// Replay committed log records into the tree files on open.
        const RECOVER = 1 << 6;
        /// Accepted for compatibility; handles are always thread safe.
        const THREAD = 1 << 7;
    }
}

bitflags! {
    /// Flags for [`crate::Database::open`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DbOpenFlags: u32 {
        /// Create the file or sub-database if it is missing.
        const CREATE = 1 << 0;
        /// With `CREATE`, fail if the target already exists.
        const EXCL = 1 << 1;
        /// Accepted for compatibility.
        const RDONLY = 1 << 2;
        /// Accepted for compatibility.
        const THREAD = 1 << 3;
    }
}

bitflags! {
    /// Database configuration flags, see [`crate::Database::set_flags`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DbFlags: u32 {
        /// Keys may carry several values, kept in insertion order.
        const DUP = 1 << 0;
        /// Keys may carry several values, kept in dup-compare order.
        const DUPSORT = 1 << 1;
    }
}

bitflags! {
    /// Flags for [`crate::Database::put`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PutFlags: u32 {
        /// Fail with `AlreadyExists` if the key is present.
        const NOOVERWRITE = 1 << 0;
        /// In a sorted-duplicate database, fail if the pair is present.
        const NODUPDATA = 1 << 1;
    }
}

/// Access method requested by [`crate::Database::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DbType {
    /// Ordered tree.
    #[default]
    BTree,
    /// Whatever the file already holds.
    Unknown,
}

/// Positioning operation for [`crate::Cursor::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorOp {
    /// Smallest pair.
    First,
    /// Largest pair.
    Last,
    /// Pair after the current one, or the first when unpositioned.
    Next,
    /// Pair before the current one, or the last when unpositioned.
    Prev,
    /// The pair under the cursor.
    Current,
    /// First pair whose key equals the given key.
    Set,
    /// First pair whose key is greater than or equal to the given key.
    SetRange,
    /// Next value of the current key.
    NextDup,
    /// First pair of the next distinct key.
    NextNoDup,
}
