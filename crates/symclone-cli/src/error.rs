//! Error types for symclone-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that can occur in CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from symclone-core
    #[error(transparent)]
    Core(#[from] symclone_core::Error),

    /// Error from symclone-fs
    #[error(transparent)]
    Fs(#[from] symclone_fs::Error),

    /// Report serialization error
    #[error("Failed to render report: {0}")]
    Json(#[from] serde_json::Error),

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl CliError {
    /// Create a new user error with the given message
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }
}
