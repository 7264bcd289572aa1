//! In-memory [`FileSystem`] for tests and dry simulations
//!
//! Paths must be absolute. Intermediate symlinks are resolved the way the
//! kernel resolves them; a final symlink is followed or not depending on the
//! operation. By default there are no permission checks: every caller
//! behaves like the owner of every inode, which makes ownership changes
//! testable without root. [`MemoryFs::with_permission_checks`] instead
//! enforces the Unix rules an unprivileged process runs into: directory write
//! bits for creating and removing entries, ownership for `chmod` and
//! `utimes`, and root-only `chown` to another user.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use filetime::FileTime;

use crate::fs::Walk;
use crate::{
    EntryKind, EntryMetadata, Error, FileKind, FileSystem, PERMISSION_BITS, Result, TreeEntry,
};

const MAX_SYMLINK_HOPS: usize = 40;

#[derive(Debug, Clone)]
enum Data {
    Directory,
    File(Vec<u8>),
    Symlink(PathBuf),
}

#[derive(Debug, Clone)]
struct Node {
    data: Data,
    mode: u32,
    uid: u32,
    gid: u32,
    accessed: FileTime,
    modified: FileTime,
}

impl Node {
    fn kind(&self) -> FileKind {
        match self.data {
            Data::Directory => FileKind::Directory,
            Data::File(_) => FileKind::File,
            Data::Symlink(_) => FileKind::Symlink,
        }
    }

    fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            kind: self.kind(),
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            accessed: self.accessed,
            modified: self.modified,
        }
    }
}

#[derive(Debug)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    uid: u32,
    gid: u32,
    umask: u32,
    clock: i64,
    temp_counter: u64,
    enforce_permissions: bool,
}

impl State {
    fn tick(&mut self) -> FileTime {
        self.clock += 1;
        FileTime::from_unix_time(self.clock, 0)
    }

    fn new_node(&mut self, data: Data, mode: u32) -> Node {
        let now = self.tick();
        Node {
            data,
            mode,
            uid: self.uid,
            gid: self.gid,
            accessed: now,
            modified: now,
        }
    }

    fn privileged(&self) -> bool {
        !self.enforce_permissions || self.uid == 0
    }

    /// Whether the caller may add or remove entries in directory `dir`.
    fn may_write(&self, dir: &Node) -> bool {
        let shift = if dir.uid == self.uid {
            6
        } else if dir.gid == self.gid {
            3
        } else {
            0
        };
        self.privileged() || (dir.mode >> shift) & 0o2 != 0
    }

    fn check_write(&self, dir: &Path, path: &Path) -> Result<()> {
        match self.nodes.get(dir) {
            Some(node) if !self.may_write(node) => {
                Err(io_error(path, ErrorKind::PermissionDenied))
            }
            _ => Ok(()),
        }
    }

    /// `chmod` and `utimes` need the caller to own the inode.
    fn check_owner(&self, path: &Path, follow_last: bool) -> Result<()> {
        let (_, node) = self.node(path, follow_last)?;
        if self.privileged() || node.uid == self.uid {
            Ok(())
        } else {
            Err(io_error(path, ErrorKind::PermissionDenied))
        }
    }

    /// Unprivileged callers may only hand an inode they own to one of their
    /// own groups; changing the owner is reserved to root.
    fn check_chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        let (_, node) = self.node(path, false)?;
        if self.privileged() {
            return Ok(());
        }
        let foreign_uid = uid.is_some_and(|uid| uid != node.uid);
        let foreign_gid = gid.is_some_and(|gid| gid != node.gid && gid != self.gid);
        if node.uid != self.uid || foreign_uid || foreign_gid {
            return Err(io_error(path, ErrorKind::PermissionDenied));
        }
        Ok(())
    }

    /// Resolve `path` to the key of the inode it names.
    fn resolve(&self, path: &Path, follow_last: bool) -> Result<PathBuf> {
        if !path.is_absolute() {
            return Err(io_error(path, ErrorKind::InvalidInput));
        }

        // Pending components, last element processed first
        let mut pending: Vec<OsString> = Vec::new();
        push_components(&mut pending, path);

        let mut resolved = PathBuf::from("/");
        let mut hops = 0;
        while let Some(name) = pending.pop() {
            if name == ".." {
                resolved.pop();
                continue;
            }
            let candidate = resolved.join(&name);
            let is_last = pending.is_empty();
            match self.nodes.get(&candidate) {
                Some(Node {
                    data: Data::Symlink(target),
                    ..
                }) if !is_last || follow_last => {
                    hops += 1;
                    if hops > MAX_SYMLINK_HOPS {
                        return Err(Error::Io {
                            path: path.to_path_buf(),
                            source: std::io::Error::other("too many levels of symbolic links"),
                        });
                    }
                    if target.is_absolute() {
                        resolved = PathBuf::from("/");
                    }
                    push_components(&mut pending, target);
                }
                Some(node) if !is_last && !matches!(node.data, Data::Directory) => {
                    return Err(io_error(path, ErrorKind::NotADirectory));
                }
                _ => resolved = candidate,
            }
        }
        Ok(resolved)
    }

    fn node(&self, path: &Path, follow_last: bool) -> Result<(PathBuf, &Node)> {
        let key = self.resolve(path, follow_last)?;
        match self.nodes.get(&key) {
            Some(node) => Ok((key, node)),
            None => Err(Error::NotFound {
                path: path.to_path_buf(),
            }),
        }
    }

    fn node_mut(&mut self, path: &Path, follow_last: bool) -> Result<&mut Node> {
        let key = self.resolve(path, follow_last)?;
        self.nodes.get_mut(&key).ok_or_else(|| Error::NotFound {
            path: path.to_path_buf(),
        })
    }

    /// Insert a new inode at `path`, which must not exist yet and whose parent
    /// must be a directory.
    fn insert(&mut self, path: &Path, data: Data, mode: u32) -> Result<()> {
        let key = self.resolve(path, false)?;
        if self.nodes.contains_key(&key) {
            return Err(io_error(path, ErrorKind::AlreadyExists));
        }
        let parent = key
            .parent()
            .ok_or_else(|| io_error(path, ErrorKind::AlreadyExists))?;
        match self.nodes.get(parent) {
            Some(node) if matches!(node.data, Data::Directory) => {
                if !self.may_write(node) {
                    return Err(io_error(path, ErrorKind::PermissionDenied));
                }
            }
            Some(_) => return Err(io_error(path, ErrorKind::NotADirectory)),
            None => {
                return Err(Error::NotFound {
                    path: path.to_path_buf(),
                });
            }
        }
        let node = self.new_node(data, mode);
        self.nodes.insert(key, node);
        Ok(())
    }
}

fn push_components(pending: &mut Vec<OsString>, path: &Path) {
    for component in path.components().rev() {
        match component {
            Component::Normal(name) => pending.push(name.to_os_string()),
            Component::ParentDir => pending.push(OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
}

fn io_error(path: &Path, kind: ErrorKind) -> Error {
    Error::io(path, std::io::Error::from(kind))
}

/// A filesystem held entirely in memory.
///
/// Starts with an empty root directory (`/`, mode `0755`) owned by the
/// configured identity.
#[derive(Debug)]
pub struct MemoryFs {
    state: Mutex<State>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// New filesystem whose inodes are created by uid/gid 1000 with umask 022.
    pub fn new() -> Self {
        Self::with_identity(1000, 1000)
    }

    /// New filesystem whose inodes are created by `uid`/`gid`.
    pub fn with_identity(uid: u32, gid: u32) -> Self {
        Self::build(uid, gid, false)
    }

    /// New filesystem acting as the unprivileged `uid`/`gid` (unless `uid` is
    /// 0), refusing what the kernel would refuse that identity.
    ///
    /// The root directory starts out owned by `uid`; use
    /// [`MemoryFs::set_identity`] to lay out entries owned by someone else.
    pub fn with_permission_checks(uid: u32, gid: u32) -> Self {
        Self::build(uid, gid, true)
    }

    fn build(uid: u32, gid: u32, enforce_permissions: bool) -> Self {
        let mut state = State {
            nodes: BTreeMap::new(),
            uid,
            gid,
            umask: 0o022,
            clock: 0,
            temp_counter: 0,
            enforce_permissions,
        };
        let root = state.new_node(Data::Directory, 0o755);
        state.nodes.insert(PathBuf::from("/"), root);
        Self {
            state: Mutex::new(state),
        }
    }

    /// Switch the identity used for inodes created from now on, and for
    /// permission checks when they are enabled.
    pub fn set_identity(&self, uid: u32, gid: u32) {
        let mut state = self.lock();
        state.uid = uid;
        state.gid = gid;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `mkdir -p`
    pub fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        let mut current = PathBuf::from("/");
        for component in path.components() {
            if let Component::Normal(name) = component {
                current.push(name);
                let is_dir = state
                    .node(&current, true)
                    .map(|(_, node)| matches!(node.data, Data::Directory));
                match is_dir {
                    Ok(true) => {}
                    Ok(false) => return Err(io_error(&current, ErrorKind::NotADirectory)),
                    Err(Error::NotFound { .. }) => {
                        let mode = 0o777 & !state.umask;
                        state.insert(&current, Data::Directory, mode)?;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    /// Create or truncate a regular file.
    pub fn write_file(&self, path: &Path, contents: impl Into<Vec<u8>>) -> Result<()> {
        let mut state = self.lock();
        let contents = contents.into();
        let is_file = state
            .node(path, true)
            .map(|(_, node)| matches!(node.data, Data::File(_)));
        match is_file {
            Ok(true) => {
                state.node_mut(path, true)?.data = Data::File(contents);
                Ok(())
            }
            Ok(false) => Err(io_error(path, ErrorKind::IsADirectory)),
            Err(Error::NotFound { .. }) => {
                let mode = 0o666 & !state.umask;
                state.insert(path, Data::File(contents), mode)
            }
            Err(e) => Err(e),
        }
    }

    pub fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let state = self.lock();
        let (_, node) = state.node(path, true)?;
        match &node.data {
            Data::File(contents) => Ok(contents.clone()),
            _ => Err(io_error(path, ErrorKind::IsADirectory)),
        }
    }

    /// Every inode path in sorted order, `/` included.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().nodes.keys().cloned().collect()
    }

    /// Whether anything (including a dangling symlink) exists at `path`.
    pub fn exists(&self, path: &Path) -> bool {
        self.lock().node(path, false).is_ok()
    }
}

impl FileSystem for MemoryFs {
    fn symlink_metadata(&self, path: &Path) -> Result<EntryMetadata> {
        let state = self.lock();
        state.node(path, false).map(|(_, node)| node.metadata())
    }

    fn metadata(&self, path: &Path) -> Result<EntryMetadata> {
        let state = self.lock();
        state.node(path, true).map(|(_, node)| node.metadata())
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        let mode = 0o777 & !state.umask;
        state.insert(path, Data::Directory, mode)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        let (key, node) = state.node(path, false)?;
        if matches!(node.data, Data::Directory) {
            return Err(io_error(path, ErrorKind::IsADirectory));
        }
        if let Some(parent) = key.parent() {
            state.check_write(parent, path)?;
        }
        state.nodes.remove(&key);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        let (key, _) = state.node(path, false)?;
        if key == Path::new("/") {
            return Err(io_error(path, ErrorKind::PermissionDenied));
        }
        // Every directory that gets emptied, and the parent of `key`, must be
        // writable
        for (candidate, _) in state.nodes.range(key.clone()..) {
            if !candidate.starts_with(&key) {
                break;
            }
            if let Some(parent) = candidate.parent() {
                state.check_write(parent, candidate)?;
            }
        }
        state.nodes.retain(|candidate, _| !candidate.starts_with(&key));
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let mut state = self.lock();
        state.insert(link, Data::Symlink(target.to_path_buf()), 0o777)
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        let state = self.lock();
        let (_, node) = state.node(path, false)?;
        match &node.data {
            Data::Symlink(target) => Ok(target.clone()),
            _ => Err(io_error(path, ErrorKind::InvalidInput)),
        }
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        let mut state = self.lock();
        state.check_owner(path, true)?;
        let node = state.node_mut(path, true)?;
        node.mode = mode & PERMISSION_BITS;
        Ok(())
    }

    fn set_owner(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        let mut state = self.lock();
        state.check_chown(path, uid, gid)?;
        let node = state.node_mut(path, false)?;
        if let Some(uid) = uid {
            node.uid = uid;
        }
        if let Some(gid) = gid {
            node.gid = gid;
        }
        Ok(())
    }

    fn set_times(&self, path: &Path, accessed: FileTime, modified: FileTime) -> Result<()> {
        let mut state = self.lock();
        state.check_owner(path, true)?;
        let node = state.node_mut(path, true)?;
        node.accessed = accessed;
        node.modified = modified;
        Ok(())
    }

    fn create_temp_dir(&self, parent: &Path, prefix: &str) -> Result<PathBuf> {
        let mut state = self.lock();
        let parent = state.resolve(parent, true)?;
        loop {
            state.temp_counter += 1;
            let candidate = parent.join(format!("{}{:06}", prefix, state.temp_counter));
            if !state.nodes.contains_key(&candidate) {
                state.insert(&candidate, Data::Directory, 0o700)?;
                return Ok(candidate);
            }
        }
    }

    /// Entries are snapshotted when the walk starts; children stored under a
    /// real directory key sort directly after it, which yields pre-order.
    fn walk(&self, root: &Path) -> Result<Walk<'_>> {
        let state = self.lock();
        let (base, _) = state.node(root, true)?;

        let mut entries = Vec::new();
        for (key, node) in state.nodes.range(base.clone()..) {
            let Ok(relative) = key.strip_prefix(&base) else {
                break;
            };
            let is_symlink = matches!(node.data, Data::Symlink(_));
            let is_dir = match node.data {
                Data::Directory => true,
                Data::File(_) => false,
                Data::Symlink(_) => matches!(
                    state.node(key, true),
                    Ok((_, Node { data: Data::Directory, .. }))
                ),
            };
            entries.push(Ok(TreeEntry {
                relative: relative.to_path_buf(),
                kind: if is_dir {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
                is_symlink,
            }));
        }

        Ok(Box::new(entries.into_iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(path: &str) -> PathBuf {
        PathBuf::from(path)
    }

    #[test]
    fn create_dir_requires_parent() {
        let fs = MemoryFs::new();
        let err = fs.create_dir(&p("/a/b")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn intermediate_symlinks_are_followed() {
        let fs = MemoryFs::new();
        fs.create_dir_all(&p("/real/inner")).unwrap();
        fs.symlink(&p("/real"), &p("/link")).unwrap();

        let meta = fs.symlink_metadata(&p("/link/inner")).unwrap();
        assert!(meta.is_dir());
        assert!(fs.symlink_metadata(&p("/link")).unwrap().is_symlink());
        assert!(fs.metadata(&p("/link")).unwrap().is_dir());
    }

    #[test]
    fn symlink_loop_is_reported() {
        let fs = MemoryFs::new();
        fs.symlink(&p("/b"), &p("/a")).unwrap();
        fs.symlink(&p("/a"), &p("/b")).unwrap();
        assert!(fs.metadata(&p("/a")).is_err());
    }

    #[test]
    fn walk_is_preorder_and_sorted() {
        let fs = MemoryFs::new();
        fs.create_dir_all(&p("/t/b")).unwrap();
        fs.create_dir_all(&p("/t/a/z")).unwrap();
        fs.write_file(&p("/t/a/f"), "x").unwrap();

        let relative: Vec<PathBuf> = fs
            .walk(&p("/t"))
            .unwrap()
            .map(|entry| entry.unwrap().relative)
            .collect();
        assert_eq!(relative, vec![p(""), p("a"), p("a/f"), p("a/z"), p("b")]);
    }

    #[test]
    fn walk_does_not_include_siblings_with_common_prefix() {
        let fs = MemoryFs::new();
        fs.create_dir_all(&p("/t")).unwrap();
        fs.create_dir_all(&p("/t2")).unwrap();

        let count = fs.walk(&p("/t")).unwrap().count();
        assert_eq!(count, 1);
    }

    #[test]
    fn set_owner_does_not_follow_symlinks() {
        let fs = MemoryFs::new();
        fs.write_file(&p("/target"), "x").unwrap();
        fs.symlink(&p("/target"), &p("/link")).unwrap();

        fs.set_owner(&p("/link"), Some(0), None).unwrap();

        assert_eq!(fs.symlink_metadata(&p("/link")).unwrap().uid, 0);
        assert_eq!(fs.metadata(&p("/link")).unwrap().uid, 1000);
    }

    #[test]
    fn permission_checks_follow_directory_write_bits() {
        let fs = MemoryFs::with_permission_checks(1000, 1000);
        fs.create_dir_all(&p("/home/dir")).unwrap();
        fs.write_file(&p("/home/dir/file"), "x").unwrap();
        fs.set_mode(&p("/home/dir"), 0o555).unwrap();

        assert!(fs.create_dir(&p("/home/dir/new")).unwrap_err().is_permission_denied());
        assert!(fs.remove_file(&p("/home/dir/file")).unwrap_err().is_permission_denied());
        assert!(fs.remove_dir_all(&p("/home")).unwrap_err().is_permission_denied());
        assert!(fs.exists(&p("/home/dir/file")));

        fs.set_mode(&p("/home/dir"), 0o755).unwrap();
        fs.remove_dir_all(&p("/home")).unwrap();
        assert_eq!(fs.paths(), vec![p("/")]);
    }

    #[test]
    fn permission_checks_guard_foreign_inodes() {
        let fs = MemoryFs::with_permission_checks(1000, 1000);
        fs.set_identity(0, 0);
        fs.create_dir_all(&p("/shared")).unwrap();
        fs.set_mode(&p("/shared"), 0o777).unwrap();
        fs.set_identity(1000, 1000);

        fs.create_dir(&p("/shared/mine")).unwrap();
        fs.set_owner(&p("/shared/mine"), Some(1000), Some(1000)).unwrap();

        assert!(fs.set_mode(&p("/shared"), 0o755).unwrap_err().is_permission_denied());
        assert!(
            fs.set_owner(&p("/shared/mine"), Some(0), None)
                .unwrap_err()
                .is_permission_denied()
        );
        assert!(
            fs.set_owner(&p("/shared/mine"), None, Some(0))
                .unwrap_err()
                .is_permission_denied()
        );
        let mtime = FileTime::from_unix_time(5, 0);
        assert!(
            fs.set_times(&p("/shared"), mtime, mtime)
                .unwrap_err()
                .is_permission_denied()
        );
    }

    #[test]
    fn root_identity_bypasses_permission_checks() {
        let fs = MemoryFs::with_permission_checks(0, 0);
        fs.create_dir_all(&p("/locked/inner")).unwrap();
        fs.set_mode(&p("/locked"), 0o500).unwrap();

        fs.set_owner(&p("/locked/inner"), Some(1000), Some(1000)).unwrap();
        fs.remove_dir_all(&p("/locked")).unwrap();
    }

    #[test]
    fn remove_dir_all_removes_descendants_only() {
        let fs = MemoryFs::new();
        fs.create_dir_all(&p("/a/b/c")).unwrap();
        fs.create_dir_all(&p("/ab")).unwrap();

        fs.remove_dir_all(&p("/a")).unwrap();

        assert_eq!(fs.paths(), vec![p("/"), p("/ab")]);
    }
}
