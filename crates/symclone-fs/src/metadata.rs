//! Filesystem entry types shared by every [`FileSystem`](crate::FileSystem)
//! implementation.

use std::fmt;
use std::path::{Path, PathBuf};

use filetime::FileTime;

/// Mask of the permission bits (including setuid, setgid and sticky).
pub const PERMISSION_BITS: u32 = 0o7777;

/// Owner, group and other execute bits.
pub const EXECUTE_BITS: u32 = 0o111;

/// Type of an inode as seen by `lstat`/`stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Directory,
    File,
    Symlink,
    /// Sockets, FIFOs and device nodes
    Other,
}

/// The subset of `stat(2)` the replication engine cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    pub kind: FileKind,
    /// Permission bits only, masked with [`PERMISSION_BITS`]
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub accessed: FileTime,
    pub modified: FileTime,
}

impl EntryMetadata {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

impl From<&std::fs::Metadata> for EntryMetadata {
    fn from(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        };

        Self {
            kind,
            mode: meta.mode() & PERMISSION_BITS,
            uid: meta.uid(),
            gid: meta.gid(),
            accessed: FileTime::from_last_access_time(meta),
            modified: FileTime::from_last_modification_time(meta),
        }
    }
}

/// Classification of a walked entry.
///
/// Symlinks are classified by what they point at: a link to a directory is a
/// [`EntryKind::Directory`], anything else (including a dangling link) is a
/// [`EntryKind::File`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Directory,
    File,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => write!(f, "directory"),
            Self::File => write!(f, "file"),
        }
    }
}

/// One entry produced by a tree walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the walked root; empty for the root itself
    pub relative: PathBuf,
    pub kind: EntryKind,
    /// Whether the entry itself is a symbolic link (never descended into)
    pub is_symlink: bool,
}

impl TreeEntry {
    pub fn is_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// The path of this entry re-anchored under another root.
    pub fn under(&self, root: &Path) -> PathBuf {
        if self.is_root() {
            root.to_path_buf()
        } else {
            root.join(&self.relative)
        }
    }
}
