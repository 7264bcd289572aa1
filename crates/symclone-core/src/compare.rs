//! Drift detection between a trial tree and the live destination
//!
//! Two passes exist. [`metadata_differs`] is the lockstep metadata comparison
//! (kind, permission bits, uid, gid) that skips symlinks on either side;
//! [`expected_divergence`] runs the same checks against metadata predicted in
//! memory. [`content_drift`] checks the shape of the tree: entries the
//! destination is missing, file links that point elsewhere, and entries of
//! the wrong type. All of them are one-way: entries only present in the
//! destination never count.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use symclone_fs::{EntryMetadata, FileKind, FileSystem};
use tracing::debug;

use crate::Result;

/// Why a destination is considered out of date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    /// Present in the trial tree, absent from the destination
    Missing,
    /// A file entry that is not a symlink to the expected source file
    Retargeted,
    /// Directory where a file link belongs, or the other way round
    TypeConflict,
    /// Kind, permission bits or ownership differ
    Metadata,
}

impl fmt::Display for DriftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Missing => "missing",
            Self::Retargeted => "retargeted",
            Self::TypeConflict => "type conflict",
            Self::Metadata => "metadata",
        };
        write!(f, "{}", label)
    }
}

/// One reason for a change decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftItem {
    /// Path relative to the destination root; empty for the root itself
    pub path: PathBuf,
    pub kind: DriftKind,
    /// Human-readable description of the drift
    pub description: String,
}

impl DriftItem {
    fn new(path: &Path, kind: DriftKind, description: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            description: description.into(),
        }
    }
}

/// Kind, permission bits and ownership an entry should carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedMetadata {
    pub kind: FileKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl ExpectedMetadata {
    /// Describe how `actual` departs from the expectation, checking kind,
    /// mode, owner and group in that order.
    fn divergence(&self, actual: &EntryMetadata) -> Option<String> {
        if self.kind != actual.kind {
            Some(format!("{:?} where {:?} expected", actual.kind, self.kind))
        } else if self.mode != actual.mode {
            Some(format!("mode 0{:03o}, expected 0{:03o}", actual.mode, self.mode))
        } else if self.uid != actual.uid {
            Some(format!("owner {}, expected {}", actual.uid, self.uid))
        } else if self.gid != actual.gid {
            Some(format!("group {}, expected {}", actual.gid, self.gid))
        } else {
            None
        }
    }
}

impl From<&EntryMetadata> for ExpectedMetadata {
    fn from(meta: &EntryMetadata) -> Self {
        Self {
            kind: meta.kind,
            mode: meta.mode,
            uid: meta.uid,
            gid: meta.gid,
        }
    }
}

/// Whether any non-symlink entry of `source` differs from its counterpart in
/// `destination` in kind, permission bits, owner or group.
///
/// # Errors
///
/// Fails with a not-found error when a mirrored destination path is missing.
pub fn metadata_differs<F: FileSystem + ?Sized>(
    fs: &F,
    source: &Path,
    destination: &Path,
) -> Result<bool> {
    Ok(first_metadata_divergence(fs, source, destination)?.is_some())
}

/// The first divergence [`metadata_differs`] would trip on, if any.
pub fn first_metadata_divergence<F: FileSystem + ?Sized>(
    fs: &F,
    source: &Path,
    destination: &Path,
) -> Result<Option<DriftItem>> {
    for entry in fs.walk(source)? {
        let entry = entry?;
        if entry.is_symlink {
            continue;
        }
        let src_meta = fs.symlink_metadata(&entry.under(source))?;
        let dst_meta = fs.symlink_metadata(&entry.under(destination))?;
        if dst_meta.is_symlink() {
            continue;
        }

        if let Some(description) = ExpectedMetadata::from(&src_meta).divergence(&dst_meta) {
            debug!(path = %entry.relative.display(), %description, "Metadata differs");
            return Ok(Some(DriftItem::new(
                &entry.relative,
                DriftKind::Metadata,
                description,
            )));
        }
    }
    Ok(None)
}

/// The first entry of `destination`, in path order, whose metadata departs
/// from `expected`.
///
/// `expected` is keyed by path relative to `destination`. Entries that are
/// symlinks in the destination are skipped.
///
/// # Errors
///
/// Fails with a not-found error when an expected path is missing.
pub fn expected_divergence<F: FileSystem + ?Sized>(
    fs: &F,
    expected: &BTreeMap<PathBuf, ExpectedMetadata>,
    destination: &Path,
) -> Result<Option<DriftItem>> {
    for (relative, expectation) in expected {
        let live = fs.symlink_metadata(&destination.join(relative))?;
        if live.is_symlink() {
            continue;
        }
        if let Some(description) = expectation.divergence(&live) {
            debug!(path = %relative.display(), %description, "Metadata differs");
            return Ok(Some(DriftItem::new(relative, DriftKind::Metadata, description)));
        }
    }
    Ok(None)
}

/// Structural differences between a trial tree and `destination`.
///
/// File entries of the trial tree are symlinks; the destination must hold a
/// symlink with the same target. Directory entries must be real directories.
/// Descendants of an entry already reported are not inspected again.
pub fn content_drift<F: FileSystem + ?Sized>(
    fs: &F,
    trial: &Path,
    destination: &Path,
) -> Result<Vec<DriftItem>> {
    let mut drift: Vec<DriftItem> = Vec::new();

    for entry in fs.walk(trial)? {
        let entry = entry?;
        if entry.is_root()
            || drift
                .iter()
                .any(|item| entry.relative.starts_with(&item.path))
        {
            continue;
        }

        let trial_path = entry.under(trial);
        let live = fs.try_symlink_metadata(&entry.under(destination))?;
        let trial_meta = fs.symlink_metadata(&trial_path)?;

        let item = match live {
            None => Some(DriftItem::new(
                &entry.relative,
                DriftKind::Missing,
                "not present in destination",
            )),
            Some(live) if trial_meta.is_symlink() => {
                if live.is_dir() {
                    Some(DriftItem::new(
                        &entry.relative,
                        DriftKind::TypeConflict,
                        "directory where a file link belongs",
                    ))
                } else if !live.is_symlink() {
                    Some(DriftItem::new(
                        &entry.relative,
                        DriftKind::Retargeted,
                        "regular file where a link belongs",
                    ))
                } else {
                    let expected = fs.read_link(&trial_path)?;
                    let actual = fs.read_link(&entry.under(destination))?;
                    (expected != actual).then(|| {
                        DriftItem::new(
                            &entry.relative,
                            DriftKind::Retargeted,
                            format!(
                                "links to {}, expected {}",
                                actual.display(),
                                expected.display()
                            ),
                        )
                    })
                }
            }
            Some(live) if trial_meta.is_dir() && !live.is_dir() => Some(DriftItem::new(
                &entry.relative,
                DriftKind::TypeConflict,
                if live.is_symlink() {
                    "symlink where a directory belongs"
                } else {
                    "file where a directory belongs"
                },
            )),
            Some(_) => None,
        };

        if let Some(item) = item {
            debug!(path = %item.path.display(), kind = %item.kind, "Content drift");
            drift.push(item);
        }
    }

    Ok(drift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use symclone_fs::MemoryFs;

    fn p(path: &str) -> PathBuf {
        PathBuf::from(path)
    }

    fn twin_dirs() -> MemoryFs {
        let fs = MemoryFs::new();
        fs.create_dir_all(&p("/a/sub")).unwrap();
        fs.create_dir_all(&p("/b/sub")).unwrap();
        fs
    }

    #[test]
    fn identical_trees_do_not_differ() {
        let fs = twin_dirs();
        assert!(!metadata_differs(&fs, &p("/a"), &p("/b")).unwrap());
    }

    #[test]
    fn mode_difference_is_reported_with_path() {
        let fs = twin_dirs();
        fs.set_mode(&p("/b/sub"), 0o700).unwrap();

        let item = first_metadata_divergence(&fs, &p("/a"), &p("/b"))
            .unwrap()
            .unwrap();

        assert_eq!(item.path, p("sub"));
        assert_eq!(item.kind, DriftKind::Metadata);
    }

    #[test]
    fn ownership_difference_is_detected() {
        let fs = twin_dirs();
        fs.set_owner(&p("/b"), None, Some(0)).unwrap();
        assert!(metadata_differs(&fs, &p("/a"), &p("/b")).unwrap());
    }

    #[test]
    fn symlinks_on_either_side_are_skipped() {
        let fs = twin_dirs();
        fs.write_file(&p("/target"), "x").unwrap();
        fs.symlink(&p("/target"), &p("/a/link")).unwrap();
        fs.write_file(&p("/b/link"), "x").unwrap();
        fs.set_mode(&p("/b/link"), 0o600).unwrap();

        fs.remove_dir_all(&p("/b/sub")).unwrap();
        fs.symlink(&p("/target"), &p("/b/sub")).unwrap();

        assert!(!metadata_differs(&fs, &p("/a"), &p("/b")).unwrap());
    }

    #[test]
    fn missing_mirror_path_is_not_found() {
        let fs = twin_dirs();
        fs.create_dir_all(&p("/a/only_here")).unwrap();

        let err = metadata_differs(&fs, &p("/a"), &p("/b")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn expected_ownership_is_checked_without_touching_the_tree() {
        let fs = twin_dirs();
        fs.set_owner(&p("/b/sub"), Some(0), None).unwrap();
        let live = fs.symlink_metadata(&p("/b/sub")).unwrap();
        let mut expected = BTreeMap::new();
        expected.insert(p("sub"), ExpectedMetadata::from(&live));

        assert_eq!(expected_divergence(&fs, &expected, &p("/b")).unwrap(), None);

        expected.insert(
            p("sub"),
            ExpectedMetadata {
                uid: 1000,
                ..ExpectedMetadata::from(&live)
            },
        );
        let item = expected_divergence(&fs, &expected, &p("/b")).unwrap().unwrap();
        assert_eq!(item.path, p("sub"));
        assert_eq!(item.description, "owner 0, expected 1000");
        assert_eq!(fs.symlink_metadata(&p("/b/sub")).unwrap().uid, 0);
    }

    #[test]
    fn expected_divergence_skips_live_symlinks() {
        let fs = twin_dirs();
        fs.remove_dir_all(&p("/b/sub")).unwrap();
        fs.symlink(&p("/a/sub"), &p("/b/sub")).unwrap();
        let mut expected = BTreeMap::new();
        expected.insert(
            p("sub"),
            ExpectedMetadata {
                kind: FileKind::Directory,
                mode: 0o700,
                uid: 0,
                gid: 0,
            },
        );

        assert_eq!(expected_divergence(&fs, &expected, &p("/b")).unwrap(), None);
    }

    #[test]
    fn content_drift_ignores_destination_only_entries() {
        let fs = twin_dirs();
        fs.write_file(&p("/b/extra.txt"), "mine").unwrap();
        assert!(content_drift(&fs, &p("/a"), &p("/b")).unwrap().is_empty());
    }

    #[test]
    fn content_drift_reports_missing_subtree_once() {
        let fs = twin_dirs();
        fs.create_dir_all(&p("/a/new/deeper")).unwrap();

        let drift = content_drift(&fs, &p("/a"), &p("/b")).unwrap();

        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].path, p("new"));
        assert_eq!(drift[0].kind, DriftKind::Missing);
    }

    #[test]
    fn content_drift_reports_link_to_other_target() {
        let fs = twin_dirs();
        fs.symlink(&p("/src/file"), &p("/a/file")).unwrap();
        fs.symlink(&p("/elsewhere/file"), &p("/b/file")).unwrap();

        let drift = content_drift(&fs, &p("/a"), &p("/b")).unwrap();

        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].kind, DriftKind::Retargeted);
    }

    #[test]
    fn content_drift_reports_symlinked_directory() {
        let fs = twin_dirs();
        fs.remove_dir_all(&p("/b/sub")).unwrap();
        fs.create_dir_all(&p("/unrelated")).unwrap();
        fs.symlink(&p("/unrelated"), &p("/b/sub")).unwrap();

        let drift = content_drift(&fs, &p("/a"), &p("/b")).unwrap();

        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].kind, DriftKind::TypeConflict);
    }
}
