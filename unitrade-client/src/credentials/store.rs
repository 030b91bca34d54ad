//! Credential persistence abstraction.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::error::StorageError;
use crate::session::{Token, UserProfile};

/// The persisted part of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: Token,
    pub refresh_token: Option<Token>,
    pub user: Option<UserProfile>,
}

impl StoredCredentials {
    pub fn new(access_token: Token, refresh_token: Option<Token>, user: Option<UserProfile>) -> Self {
        Self {
            access_token,
            refresh_token,
            user,
        }
    }
}

/// Durable key/value persistence of the credential group.
///
/// Implementations must write and clear the group atomically: `load` never
/// observes a half-written group.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Replace the stored group.
    async fn save(&self, credentials: &StoredCredentials) -> Result<(), StorageError>;

    /// Load the stored group, `None` when nothing is stored.
    async fn load(&self) -> Result<Option<StoredCredentials>, StorageError>;

    /// Remove the stored group.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// In-process credential store.
///
/// Does not survive restarts; used for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<StoredCredentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `credentials`.
    pub fn with_credentials(credentials: StoredCredentials) -> Self {
        Self {
            slot: Mutex::new(Some(credentials)),
        }
    }

    /// Current contents without going through the async trait.
    pub fn snapshot(&self) -> Option<StoredCredentials> {
        self.slot.lock().clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, credentials: &StoredCredentials) -> Result<(), StorageError> {
        *self.slot.lock() = Some(credentials.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<StoredCredentials>, StorageError> {
        Ok(self.slot.lock().clone())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.slot.lock().take();
        Ok(())
    }
}
