//! # ydb storage
//!
//! Opaque byte stores for ydb.
//!
//! Tree files and log files are both stored through the [`StorageBackend`]
//! trait. Backends never interpret what they hold: the tree file format and
//! the log record envelope live in `ydb_core`.
//!
//! A [`Vfs`] decides where backends come from:
//!
//! - [`Vfs::disk`] opens [`FileBackend`]s through the OS
//! - [`Vfs::memory`] keeps every "file" in a process-local table of
//!   [`InMemoryBackend`]s, which is what private in-process environments use
//!
//! ## Example
//!
//! ```rust
//! use ydb_storage::{StorageBackend, Vfs};
//! use std::path::Path;
//!
//! let vfs = Vfs::memory();
//! let mut file = vfs.open(Path::new("./t1.db"), true).unwrap();
//! file.append(b"hello").unwrap();
//! assert!(vfs.exists(Path::new("./t1.db")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod vfs;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use vfs::Vfs;
