//! Error types for mailbag.

use thiserror::Error;

/// Common error type for mailbag.
#[derive(Error, Debug)]
pub enum MailbagError {
    /// Mail index or group name absent.
    #[error("{0} not found")]
    NotFound(String),

    /// Send with an empty resolved destination set.
    #[error("mail has no recipients")]
    NoRecipients,

    /// A group with the same name (compared case-insensitively) already exists.
    #[error("group name already in use: {0}")]
    DuplicateGroupName(String),

    /// Permission denied error.
    ///
    /// The policy evaluator itself answers with a boolean; this variant is
    /// produced by the guarded helpers on top of it.
    #[error("permission denied: {0}")]
    Permission(String),

    /// I/O error while saving or loading persisted records.
    #[error("persistence failure: {0}")]
    Persistence(#[from] std::io::Error),

    /// A single stored mail, group or item failed to parse.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for MailbagError {
    fn from(e: serde_json::Error) -> Self {
        MailbagError::MalformedRecord(e.to_string())
    }
}

/// Result type alias for mailbag operations.
pub type Result<T> = std::result::Result<T, MailbagError>;
