//! Serializable view of a convergence run

use std::path::{Path, PathBuf};

use serde::Serialize;
use symclone_fs::{FileKind, FileSystem};

use crate::compare::DriftItem;
use crate::converge::ConvergeOutcome;
use crate::principal::{group_name, user_name};
use crate::Result;

/// What occupies a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathState {
    Absent,
    Directory,
    File,
    Link,
    Other,
}

/// Snapshot of a single path, taken without following a final symlink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathInfo {
    pub path: PathBuf,
    pub state: PathState,
    /// Permission bits as a zero-padded octal string, e.g. `"0755"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl PathInfo {
    pub fn capture<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> Result<Self> {
        let Some(meta) = fs.try_symlink_metadata(path)? else {
            return Ok(Self {
                path: path.to_path_buf(),
                state: PathState::Absent,
                mode: None,
                uid: None,
                gid: None,
                owner: None,
                group: None,
            });
        };

        let state = match meta.kind {
            FileKind::Directory => PathState::Directory,
            FileKind::File => PathState::File,
            FileKind::Symlink => PathState::Link,
            FileKind::Other => PathState::Other,
        };

        Ok(Self {
            path: path.to_path_buf(),
            state,
            mode: Some(format!("0{:03o}", meta.mode)),
            uid: Some(meta.uid),
            gid: Some(meta.gid),
            owner: user_name(meta.uid),
            group: group_name(meta.gid),
        })
    }
}

/// Destination state on either side of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathDiff {
    pub before: PathInfo,
    pub after: PathInfo,
}

/// Machine-readable result of a convergence run.
///
/// The destination snapshot is flattened into the top level next to
/// `changed` and `src`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvergeReport {
    pub changed: bool,
    pub src: PathBuf,
    #[serde(flatten)]
    pub path: PathInfo,
    pub drift: Vec<DriftItem>,
    pub diff: PathDiff,
}

impl ConvergeReport {
    pub fn new(source: &Path, outcome: ConvergeOutcome) -> Self {
        Self {
            changed: outcome.changed,
            src: source.to_path_buf(),
            path: outcome.after.clone(),
            drift: outcome.drift,
            diff: PathDiff {
                before: outcome.before,
                after: outcome.after,
            },
        }
    }
}
