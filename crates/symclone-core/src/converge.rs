//! Stage, decide, mutate once
//!
//! [`Converger::converge`] predicts the result of a merge in a throwaway
//! staging directory next to the destination, compares the prediction with
//! the live tree and only touches the destination when they disagree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use symclone_fs::FileSystem;

use crate::apply::apply_metadata_mirrored;
use crate::compare::{DriftItem, DriftKind, ExpectedMetadata, content_drift, expected_divergence};
use crate::merge::{absolute, merge};
use crate::report::PathInfo;
use crate::{DesiredMetadata, Error, Result};

/// Name prefix of the staging directory created next to the destination.
pub const STAGING_PREFIX: &str = ".symclone_tmp_";

const OWNER_RWX: u32 = 0o700;

/// Result of one convergence run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergeOutcome {
    /// Whether the destination was modified
    pub changed: bool,
    /// Reasons behind the decision; empty when nothing changed
    pub drift: Vec<DriftItem>,
    pub before: PathInfo,
    pub after: PathInfo,
}

/// Removes the staging directory when dropped, on success and failure alike.
struct StagingArea<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    path: PathBuf,
}

impl<'a, F: FileSystem + ?Sized> StagingArea<'a, F> {
    fn create(fs: &'a F, parent: &Path) -> Result<Self> {
        let path = fs.create_temp_dir(parent, STAGING_PREFIX)?;
        debug!(path = %path.display(), "Created staging directory");
        Ok(Self { fs, path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the staging tree. Directories copied from a read-only source
    /// can block the removal of their children; those get `u+rwx` and the
    /// removal is retried for as long as that unlocks something.
    fn remove(&self) -> symclone_fs::Result<()> {
        loop {
            match self.fs.remove_dir_all(&self.path) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_permission_denied() => {
                    if self.unlock_directories()? == 0 {
                        return Err(e);
                    }
                    debug!(path = %self.path.display(), "Retrying staging removal");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Give the owner full access to every staged directory still reachable.
    /// Returns how many directories were changed.
    fn unlock_directories(&self) -> symclone_fs::Result<usize> {
        let mut unlocked = 0;
        // Entries below an unreadable directory surface as errors; they are
        // reached on the next pass
        for entry in self.fs.walk(&self.path)?.flatten() {
            if entry.is_symlink || !entry.is_dir() {
                continue;
            }
            let path = entry.under(&self.path);
            let Some(meta) = self.fs.try_symlink_metadata(&path)? else {
                continue;
            };
            if meta.mode & OWNER_RWX != OWNER_RWX {
                self.fs.set_mode(&path, meta.mode | OWNER_RWX)?;
                unlocked += 1;
            }
        }
        Ok(unlocked)
    }
}

impl<F: FileSystem + ?Sized> Drop for StagingArea<'_, F> {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!(path = %self.path.display(), error = %e, "Failed to remove staging directory");
        }
    }
}

/// Keeps a destination directory converged onto a source tree.
pub struct Converger<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
}

impl<'a, F: FileSystem + ?Sized> Converger<'a, F> {
    pub fn new(fs: &'a F) -> Self {
        Self { fs }
    }

    /// Bring `destination` in line with `source` and `desired`.
    ///
    /// Every validation error is raised before anything is created. Once the
    /// real merge starts a failure leaves the destination partially merged;
    /// the staging directory is removed either way.
    pub fn converge(
        &self,
        source: &Path,
        destination: &Path,
        desired: &DesiredMetadata,
    ) -> Result<ConvergeOutcome> {
        let source = absolute(source)?;
        let destination = absolute(destination)?;
        let (parent, destination_exists) = self.validate(&source, &destination)?;

        let before = PathInfo::capture(self.fs, &destination)?;

        let drift = {
            let staging = StagingArea::create(self.fs, &parent)?;
            self.stage(&source, staging.path())?;
            self.drift(&destination, destination_exists, staging.path(), desired)?
        };

        let changed = !drift.is_empty();
        if changed {
            merge(self.fs, &source, &destination)?;
            if desired.is_set() {
                apply_metadata_mirrored(self.fs, &source, &destination, desired)?;
            }
        }

        let after = PathInfo::capture(self.fs, &destination)?;
        info!(
            source = %source.display(),
            destination = %destination.display(),
            changed,
            reasons = drift.len(),
            "Converged"
        );

        Ok(ConvergeOutcome {
            changed,
            drift,
            before,
            after,
        })
    }

    /// Returns the destination's parent and whether the destination exists.
    fn validate(&self, source: &Path, destination: &Path) -> Result<(PathBuf, bool)> {
        match self.fs.metadata(source) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::SourceNotDirectory {
                    path: source.to_path_buf(),
                });
            }
            Err(e) if e.is_not_found() => {
                return Err(Error::SourceMissing {
                    path: source.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        if destination.starts_with(source) {
            return Err(Error::DestinationInsideSource {
                path: destination.to_path_buf(),
                source_root: source.to_path_buf(),
            });
        }

        let parent = match destination.parent() {
            Some(parent) if self.fs.is_dir(parent)? => parent.to_path_buf(),
            Some(parent) => {
                return Err(Error::ParentMissing {
                    path: parent.to_path_buf(),
                });
            }
            None => {
                return Err(Error::ParentMissing {
                    path: destination.to_path_buf(),
                });
            }
        };

        let exists = match self.fs.try_symlink_metadata(destination)? {
            None => false,
            Some(_) if self.fs.is_dir(destination)? => true,
            Some(_) => {
                return Err(Error::DestinationNotDirectory {
                    path: destination.to_path_buf(),
                });
            }
        };

        Ok((parent, exists))
    }

    /// Build the predicted destination tree inside `staging`. Only its shape
    /// is used; metadata is predicted by [`Converger::expectations`].
    fn stage(&self, source: &Path, staging: &Path) -> Result<()> {
        // The staging root stands in for a freshly created destination root
        self.fs.copy_metadata(source, staging)?;
        merge(self.fs, source, staging)
    }

    /// Metadata every non-symlink entry of the destination should carry after
    /// a converging run, keyed by relative path.
    ///
    /// Directories that already exist are left alone by the real merge, so
    /// they keep their live metadata; new ones take what the trial merge gave
    /// them. `desired` is layered on top the way the metadata pass would.
    fn expectations(
        &self,
        staging: &Path,
        destination: &Path,
        desired: &DesiredMetadata,
    ) -> Result<BTreeMap<PathBuf, ExpectedMetadata>> {
        let mut expected = BTreeMap::new();
        for entry in self.fs.walk(staging)? {
            let entry = entry?;
            if entry.is_symlink {
                continue;
            }
            let staged = self.fs.symlink_metadata(&entry.under(staging))?;
            let current = match self.fs.try_symlink_metadata(&entry.under(destination))? {
                Some(live) if live.is_dir() && staged.is_dir() => live,
                _ => staged,
            };
            expected.insert(entry.relative, desired.predict(&current));
        }
        Ok(expected)
    }

    fn drift(
        &self,
        destination: &Path,
        destination_exists: bool,
        staging: &Path,
        desired: &DesiredMetadata,
    ) -> Result<Vec<DriftItem>> {
        if !destination_exists {
            return Ok(vec![DriftItem {
                path: PathBuf::new(),
                kind: DriftKind::Missing,
                description: "destination does not exist".into(),
            }]);
        }

        let drift = content_drift(self.fs, staging, destination)?;
        if !drift.is_empty() {
            return Ok(drift);
        }
        let expected = self.expectations(staging, destination, desired)?;
        Ok(expected_divergence(self.fs, &expected, destination)?
            .into_iter()
            .collect())
    }
}
