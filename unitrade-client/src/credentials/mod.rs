//! Durable credential persistence.
//!
//! The session mirrors its access token, refresh token and cached user profile
//! into a [`CredentialStore`] on every change; on cold start the store is the
//! sole source of truth.
//!
//! - [`CredentialStore`]: group-atomic save / load / clear contract
//! - [`SqliteCredentialStore`]: SQLite-backed implementation
//! - [`MemoryCredentialStore`]: in-process implementation

mod error;
mod sqlite;
mod store;

pub use error::StorageError;
pub use sqlite::SqliteCredentialStore;
pub use store::{CredentialStore, MemoryCredentialStore, StoredCredentials};
