//! [`TestTree`] builder for on-disk replication scenarios.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt, symlink};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory with helpers to lay out fixture trees and assert on
/// the result of a run.
///
/// # Example
///
/// ```rust,no_run
/// use symclone_test_utils::TestTree;
///
/// let tree = TestTree::new();
/// tree.sample_source("src");
/// tree.dir("dst/dir2");
/// tree.assert_real_dir("dst/dir2");
/// ```
pub struct TestTree {
    temp_dir: TempDir,
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTree {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    /// Root path of the temporary directory.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// `rel` anchored at the root.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// `mkdir -p` relative to the root.
    pub fn dir(&self, rel: &str) -> &Self {
        fs::create_dir_all(self.path(rel)).unwrap();
        self
    }

    /// Write a file, creating missing parents.
    pub fn file(&self, rel: &str, contents: &str) -> &Self {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
        self
    }

    /// Create a symlink at `rel` pointing at `target` (used verbatim).
    pub fn symlink(&self, target: impl AsRef<Path>, rel: &str) -> &Self {
        symlink(target, self.path(rel)).unwrap();
        self
    }

    pub fn chmod(&self, rel: &str, mode: u32) -> &Self {
        fs::set_permissions(self.path(rel), fs::Permissions::from_mode(mode)).unwrap();
        self
    }

    /// Lay out `{dir1/file1.txt, dir1/file2.txt, dir2/}` under `rel`.
    pub fn sample_source(&self, rel: &str) -> PathBuf {
        self.file(&format!("{rel}/dir1/file1.txt"), "one")
            .file(&format!("{rel}/dir1/file2.txt"), "two")
            .dir(&format!("{rel}/dir2"));
        self.path(rel)
    }

    /// Permission bits of `rel` without following a final symlink.
    pub fn mode_of(&self, rel: &str) -> u32 {
        fs::symlink_metadata(self.path(rel)).unwrap().mode() & 0o7777
    }

    /// # Panics
    /// Panics unless `rel` is a symlink whose target is exactly `target`.
    pub fn assert_symlink_to(&self, rel: &str, target: impl AsRef<Path>) {
        let path = self.path(rel);
        let actual = fs::read_link(&path)
            .unwrap_or_else(|e| panic!("Expected symlink at {}: {}", path.display(), e));
        assert_eq!(
            actual,
            target.as_ref(),
            "Symlink {} points to the wrong target",
            path.display()
        );
    }

    /// # Panics
    /// Panics unless `rel` is a directory and not a symlink to one.
    pub fn assert_real_dir(&self, rel: &str) {
        let path = self.path(rel);
        let meta = fs::symlink_metadata(&path)
            .unwrap_or_else(|e| panic!("Expected directory at {}: {}", path.display(), e));
        assert!(
            meta.file_type().is_dir(),
            "Expected real directory at {}, found {:?}",
            path.display(),
            meta.file_type()
        );
    }

    /// # Panics
    /// Panics if anything, including a dangling symlink, exists at `rel`.
    pub fn assert_missing(&self, rel: &str) {
        let path = self.path(rel);
        assert!(
            fs::symlink_metadata(&path).is_err(),
            "Expected nothing at {}",
            path.display()
        );
    }

    /// Names directly inside `rel`, sorted.
    pub fn children(&self, rel: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.path(rel))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Record every entry under `rel` so a later state can be compared with it.
    pub fn snapshot(&self, rel: &str) -> Snapshot {
        let mut entries = BTreeMap::new();
        collect(&self.path(rel), Path::new(""), &mut entries);
        Snapshot(entries)
    }
}

/// Kind, permission bits, ownership, mtime and link target of every entry in
/// a tree, keyed by relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot(pub BTreeMap<PathBuf, EntryState>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryState {
    pub file_type: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: (i64, i64),
    pub link_target: Option<PathBuf>,
}

fn collect(path: &Path, rel: &Path, entries: &mut BTreeMap<PathBuf, EntryState>) {
    let meta = fs::symlink_metadata(path).unwrap();
    let file_type = meta.file_type();
    entries.insert(
        rel.to_path_buf(),
        EntryState {
            file_type: format!("{:?}", file_type),
            mode: meta.mode() & 0o7777,
            uid: meta.uid(),
            gid: meta.gid(),
            mtime: (meta.mtime(), meta.mtime_nsec()),
            link_target: file_type.is_symlink().then(|| fs::read_link(path).unwrap()),
        },
    );
    if file_type.is_dir() {
        for entry in fs::read_dir(path).unwrap() {
            let entry = entry.unwrap();
            collect(&entry.path(), &rel.join(entry.file_name()), entries);
        }
    }
}
