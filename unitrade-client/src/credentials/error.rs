//! Credential store error types.

use thiserror::Error;

/// Errors surfaced by a [`super::CredentialStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// User profile (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The stored group is incomplete (e.g. a refresh token without an access token).
    #[error("Corrupt credential record: {0}")]
    Corrupt(String),
}
