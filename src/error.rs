//! Custom error types for formgraph

use thiserror::Error;

/// Main error type for formgraph operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Form not found: {0}")]
    FormNotFound(i64),

    #[error("Submission not found: {0}")]
    SubmissionNotFound(i64),

    #[error("Relationship not found: {0}")]
    RelationshipNotFound(i64),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("No active form for this share link")]
    ShareTokenNotFound,

    /// Rendered exactly like `FormNotFound` so callers without access
    /// learn nothing about whether the form exists.
    #[error("Form not found: {form_id}")]
    PermissionDenied { form_id: i64 },

    /// An operation reserved for global admins
    #[error("Admin role required to {0}")]
    AdminRequired(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Schema suggestion failed: {0}")]
    Suggest(String),

    #[error("Not initialized: run 'formgraph init' first")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

/// Coarse classification used by callers to pick a presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Permission,
    Conflict,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::FormNotFound(_)
            | Error::SubmissionNotFound(_)
            | Error::RelationshipNotFound(_)
            | Error::UserNotFound(_)
            | Error::ShareTokenNotFound => ErrorKind::NotFound,
            Error::PermissionDenied { .. } | Error::AdminRequired(_) => ErrorKind::Permission,
            Error::Conflict(_) => ErrorKind::Conflict,
            _ => ErrorKind::Internal,
        }
    }

    /// Map a unique-constraint violation onto `Conflict`, leaving other
    /// database errors untouched.
    pub fn from_insert(err: sqlx::Error, conflict: impl FnOnce() -> String) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Error::Conflict(conflict())
            }
            _ => Error::Database(err),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Result type alias for formgraph
pub type Result<T> = std::result::Result<T, Error>;
