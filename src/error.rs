//! Error types for the SSH session bootstrapper

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for ssh-bootstrap
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Profile is missing host/username or carries an out-of-range port
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    /// Ephemeral artifact could not be written
    #[error("Failed to stage {}: {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The interactive session rejected a command
    #[error("Session error: {0}")]
    Sink(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Profile file could not be used
    #[error("Profile store error: {0}")]
    ProfileStore(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Profile file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using LaunchError
pub type Result<T> = std::result::Result<T, LaunchError>;

impl LaunchError {
    /// Create an invalid profile error from a string
    pub fn invalid_profile(msg: impl Into<String>) -> Self {
        LaunchError::InvalidProfile(msg.into())
    }

    /// Create a staging error for the artifact at `path`
    pub fn staging(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LaunchError::Staging {
            path: path.into(),
            source,
        }
    }

    /// Create a sink error from a string
    pub fn sink(msg: impl Into<String>) -> Self {
        LaunchError::Sink(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        LaunchError::Config(msg.into())
    }

    /// Create a profile store error from a string
    pub fn store(msg: impl Into<String>) -> Self {
        LaunchError::ProfileStore(msg.into())
    }

    /// True for errors raised before anything was attempted
    pub fn is_invalid_profile(&self) -> bool {
        matches!(self, LaunchError::InvalidProfile(_))
    }
}
