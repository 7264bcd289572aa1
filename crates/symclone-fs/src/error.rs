//! Error types for symclone-fs

use std::path::PathBuf;

/// Result type for symclone-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in symclone-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No such file or directory: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to parse {format} config at {path}: {message}")]
    ConfigParse {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Unsupported config format: {extension}")]
    UnsupportedFormat { extension: String },
}

impl Error {
    /// Wrap an I/O error with the path it occurred at.
    ///
    /// `ErrorKind::NotFound` is promoted to [`Error::NotFound`] so callers can
    /// match on a missing path without inspecting the source error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound { path };
        }
        Self::Io { path, source }
    }

    /// Path the failing operation was applied to, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Io { path, .. } | Self::NotFound { path } | Self::ConfigParse { path, .. } => {
                Some(path)
            }
            Self::UnsupportedFormat { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn io_not_found_is_promoted() {
        let err = Error::io("/missing", std::io::Error::from(ErrorKind::NotFound));
        assert!(err.is_not_found());
        assert_eq!(err.path(), Some(std::path::Path::new("/missing")));
    }

    #[test]
    fn permission_denied_keeps_source() {
        let err = Error::io("/locked", std::io::Error::from(ErrorKind::PermissionDenied));
        assert!(err.is_permission_denied());
        assert!(format!("{}", err).contains("/locked"));
    }
}
