//! The filesystem capability used by the replication engine
//!
//! Every mutation and probe the engine performs goes through [`FileSystem`],
//! so the same merge/compare/apply code runs against the real filesystem
//! ([`OsFs`]) or an in-memory tree ([`MemoryFs`](crate::MemoryFs)).

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use walkdir::WalkDir;

use crate::{EntryKind, EntryMetadata, Error, Result, TreeEntry};

/// Lazy depth-first sequence of entries under a root.
pub type Walk<'a> = Box<dyn Iterator<Item = Result<TreeEntry>> + 'a>;

/// Filesystem operations required to clone, compare and chmod a tree.
///
/// Path arguments are used as given; callers pass absolute paths.
pub trait FileSystem {
    /// `lstat`: metadata of the entry itself, not following a final symlink.
    fn symlink_metadata(&self, path: &Path) -> Result<EntryMetadata>;

    /// `stat`: metadata of the entry, following symlinks.
    fn metadata(&self, path: &Path) -> Result<EntryMetadata>;

    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Unlink a file or a symlink. Fails on directories.
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Remove a directory and all of its contents without following symlinks.
    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Create `link` pointing at `target`.
    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;

    fn read_link(&self, path: &Path) -> Result<PathBuf>;

    /// Set permission bits, following symlinks.
    fn set_mode(&self, path: &Path, mode: u32) -> Result<()>;

    /// Change ownership without following a final symlink. `None` leaves the
    /// corresponding id unchanged.
    fn set_owner(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()>;

    fn set_times(&self, path: &Path, accessed: FileTime, modified: FileTime) -> Result<()>;

    /// Create a fresh, uniquely named directory inside `parent` whose name
    /// starts with `prefix`. The caller owns its removal.
    fn create_temp_dir(&self, parent: &Path, prefix: &str) -> Result<PathBuf>;

    /// Walk `root` depth first, root first, siblings sorted by name.
    ///
    /// Symlinks are reported but never descended into. Fails with
    /// [`Error::NotFound`] when `root` does not exist.
    fn walk(&self, root: &Path) -> Result<Walk<'_>>;

    /// Like [`FileSystem::symlink_metadata`] but maps a missing path to `None`.
    fn try_symlink_metadata(&self, path: &Path) -> Result<Option<EntryMetadata>> {
        match self.symlink_metadata(path) {
            Ok(meta) => Ok(Some(meta)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether `path` resolves to a directory (following symlinks).
    fn is_dir(&self, path: &Path) -> Result<bool> {
        match self.metadata(path) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Copy mode, ownership and timestamps of `from` onto `to`.
    ///
    /// Ownership is only changed when it differs, so unprivileged callers can
    /// copy metadata between entries they own.
    fn copy_metadata(&self, from: &Path, to: &Path) -> Result<()> {
        let source = self.metadata(from)?;
        let target = self.symlink_metadata(to)?;

        let uid = (source.uid != target.uid).then_some(source.uid);
        let gid = (source.gid != target.gid).then_some(source.gid);
        if uid.is_some() || gid.is_some() {
            self.set_owner(to, uid, gid)?;
        }
        // chown may clear setuid/setgid, so the mode goes second
        self.set_mode(to, source.mode)?;
        self.set_times(to, source.accessed, source.modified)
    }
}

/// [`FileSystem`] backed by the host operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl OsFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for OsFs {
    fn symlink_metadata(&self, path: &Path) -> Result<EntryMetadata> {
        fs::symlink_metadata(path)
            .map(|meta| EntryMetadata::from(&meta))
            .map_err(|e| Error::io(path, e))
    }

    fn metadata(&self, path: &Path) -> Result<EntryMetadata> {
        fs::metadata(path)
            .map(|meta| EntryMetadata::from(&meta))
            .map_err(|e| Error::io(path, e))
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir(path).map_err(|e| Error::io(path, e))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).map_err(|e| Error::io(path, e))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path).map_err(|e| Error::io(path, e))
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        std::os::unix::fs::symlink(target, link).map_err(|e| Error::io(link, e))
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        fs::read_link(path).map_err(|e| Error::io(path, e))
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| Error::io(path, e))
    }

    fn set_owner(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        std::os::unix::fs::lchown(path, uid, gid).map_err(|e| Error::io(path, e))
    }

    fn set_times(&self, path: &Path, accessed: FileTime, modified: FileTime) -> Result<()> {
        filetime::set_file_times(path, accessed, modified).map_err(|e| Error::io(path, e))
    }

    fn create_temp_dir(&self, parent: &Path, prefix: &str) -> Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(parent)
            .map_err(|e| Error::io(parent, e))?
            .keep();
        tracing::trace!(path = %dir.display(), "Created temporary directory");
        Ok(dir)
    }

    fn walk(&self, root: &Path) -> Result<Walk<'_>> {
        // Surface a missing root eagerly instead of on the first `next()`
        self.symlink_metadata(root)?;

        let base = root.to_path_buf();
        let entries = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .map(move |entry| {
                let entry = entry.map_err(walk_error)?;
                let relative = entry
                    .path()
                    .strip_prefix(&base)
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                let is_symlink = entry.path_is_symlink();
                let is_dir = if is_symlink {
                    entry.path().is_dir()
                } else {
                    entry.file_type().is_dir()
                };

                Ok(TreeEntry {
                    relative,
                    kind: if is_dir {
                        EntryKind::Directory
                    } else {
                        EntryKind::File
                    },
                    is_symlink,
                })
            });

        Ok(Box::new(entries))
    }
}

fn walk_error(err: walkdir::Error) -> Error {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    match err.into_io_error() {
        Some(source) => Error::io(path, source),
        None => Error::Io {
            path,
            source: std::io::Error::other("filesystem loop detected"),
        },
    }
}
