//! Error types for Hegemon
//!
//! Every failure a backup or restore run can hit maps onto one of the
//! variants below. Lifecycle code propagates them with `?` and the lifecycle
//! boundary logs and converts them into a plain success/failure result.

use thiserror::Error;

/// The main error type for Hegemon operations
#[derive(Error, Debug)]
pub enum HegemonError {
    /// Malformed or missing configuration, including unset environment variables
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Bad caller-supplied argument
    #[error("Validation error: {0}")]
    Validation(String),

    /// Cannot reach or authenticate to the database
    #[error("Connection error: {0}")]
    Connection(String),

    /// Engine-level dump failure
    #[error("Backup error: {0}")]
    Backup(String),

    /// Engine-level restore failure
    #[error("Restore error: {0}")]
    Restore(String),

    /// Codec failure
    #[error("Compression error: {0}")]
    Compression(String),

    /// Filesystem precondition or postcondition violated
    #[error("Storage error: {0}")]
    Storage(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),
}

/// Coarse classification of a [`HegemonError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Validation,
    Connection,
    Backup,
    Restore,
    Compression,
    Storage,
    Io,
    Json,
}

impl HegemonError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Configuration error for a required field that is absent
    pub fn missing_field(field: &str) -> Self {
        Self::Configuration(format!("Missing required field: {}", field))
    }

    /// Get the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Backup(_) => ErrorKind::Backup,
            Self::Restore(_) => ErrorKind::Restore,
            Self::Compression(_) => ErrorKind::Compression,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) => ErrorKind::Json,
        }
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<std::io::Error> for HegemonError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for HegemonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for Hegemon operations
pub type HegemonResult<T> = Result<T, HegemonError>;
