//! Symlink-clone replication engine
//!
//! Keeps a destination directory converged onto a source tree: every source
//! directory becomes a real directory, every source file becomes an absolute
//! symlink to it, and mode/ownership can be enforced on the result.
//!
//! - **Merge**: additive projection of the source onto a destination
//! - **Compare**: content and metadata drift between two trees
//! - **Apply**: mode and ownership enforcement that never follows symlinks
//! - **Converge**: stage the merge next to the destination, decide whether
//!   anything would change, then mutate the destination at most once
//!
//! # Architecture
//!
//! ```text
//!              symclone-cli
//!                   |
//!             symclone-core
//!                   |
//!              symclone-fs
//!        (FileSystem: OsFs | MemoryFs)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use symclone_core::{Converger, DesiredMetadata, ModeSpec};
//! use symclone_fs::OsFs;
//!
//! fn example() -> symclone_core::Result<()> {
//!     let desired = DesiredMetadata::unchanged().with_mode(ModeSpec::Bits(0o755));
//!     let outcome = Converger::new(&OsFs)
//!         .converge(Path::new("/opt/app/share"), Path::new("/srv/share"), &desired)?;
//!     println!("changed: {}", outcome.changed);
//!     Ok(())
//! }
//! ```

pub mod apply;
pub mod compare;
pub mod converge;
pub mod desired;
pub mod error;
pub mod merge;
pub mod mode;
pub mod principal;
pub mod report;

pub use apply::{apply_metadata, apply_metadata_mirrored};
pub use compare::{
    DriftItem, DriftKind, ExpectedMetadata, content_drift, expected_divergence,
    first_metadata_divergence, metadata_differs,
};
pub use converge::{ConvergeOutcome, Converger, STAGING_PREFIX};
pub use desired::{DesiredMetadata, MetadataRequest};
pub use error::{Error, Result};
pub use merge::merge;
pub use mode::{ModeSpec, SymbolicMode};
pub use principal::Principal;
pub use report::{ConvergeReport, PathDiff, PathInfo, PathState};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn conflict_error_names_path_and_expected_kind() {
        let error = Error::Conflict {
            path: PathBuf::from("/srv/share/dir1"),
            expected: symclone_fs::EntryKind::Directory,
        };

        let display = error.to_string();
        assert!(display.contains("/srv/share/dir1"), "got: {}", display);
        assert!(display.contains("directory"), "got: {}", display);
        assert!(!error.is_validation());
    }

    #[test]
    fn filesystem_errors_are_not_validation_errors() {
        let error = Error::from(symclone_fs::Error::NotFound {
            path: PathBuf::from("/missing"),
        });
        assert!(error.is_not_found());
        assert!(!error.is_validation());
    }
}
