//! Filesystem capability for symclone
//!
//! Provides the [`FileSystem`] trait the replication engine is written
//! against, a host implementation ([`OsFs`]), an in-memory implementation
//! ([`MemoryFs`]) and format-agnostic task file loading.
//!
//! Unix only: ownership and permission bits are first-class here.

pub mod config;
pub mod error;
pub mod fs;
pub mod memory;
pub mod metadata;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use fs::{FileSystem, OsFs, Walk};
pub use memory::MemoryFs;
pub use metadata::{EXECUTE_BITS, EntryKind, EntryMetadata, FileKind, PERMISSION_BITS, TreeEntry};
