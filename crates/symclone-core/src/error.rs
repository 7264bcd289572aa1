//! Error types for symclone-core

use std::path::PathBuf;

use symclone_fs::EntryKind;

/// Result type for symclone-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while converging a destination tree
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source tree does not exist
    #[error("source directory {path} does not exist")]
    SourceMissing { path: PathBuf },

    /// The source exists but is not a directory
    #[error("{path} exists but it is not a directory")]
    SourceNotDirectory { path: PathBuf },

    /// The directory that should hold the destination does not exist
    #[error("parent directory {path} does not exist")]
    ParentMissing { path: PathBuf },

    /// The destination lies inside the source tree
    #[error("destination {path} lies inside source {source_root}")]
    DestinationInsideSource { path: PathBuf, source_root: PathBuf },

    /// The destination exists but is not a directory
    #[error("{path} exists and is not a directory")]
    DestinationNotDirectory { path: PathBuf },

    /// No account with this user name
    #[error("Unknown user: {name}")]
    UnknownUser { name: String },

    /// No account with this group name
    #[error("Unknown group: {name}")]
    UnknownGroup { name: String },

    /// The account database could not be queried
    #[error("Failed to look up {name}: {source}")]
    AccountLookup {
        name: String,
        #[source]
        source: nix::errno::Errno,
    },

    /// Mode is neither octal permission bits nor a symbolic expression
    #[error("Invalid mode {value:?}: {reason}")]
    InvalidMode { value: String, reason: String },

    /// An entry of the wrong type occupies a path the merge must fill
    #[error("Cannot place a {expected} at {path}: a conflicting entry is in the way")]
    Conflict { path: PathBuf, expected: EntryKind },

    /// Filesystem error from symclone-fs
    #[error(transparent)]
    Fs(#[from] symclone_fs::Error),
}

impl Error {
    /// Whether the error was raised before anything was mutated.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::SourceMissing { .. }
                | Self::SourceNotDirectory { .. }
                | Self::ParentMissing { .. }
                | Self::DestinationNotDirectory { .. }
                | Self::DestinationInsideSource { .. }
                | Self::UnknownUser { .. }
                | Self::UnknownGroup { .. }
                | Self::AccountLookup { .. }
                | Self::InvalidMode { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Fs(e) if e.is_not_found())
    }
}
