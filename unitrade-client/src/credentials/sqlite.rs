//! SQLite-backed credential store (SQLx).
//!
//! The group lives in a single `credential_store` table keyed by
//! `access_token`, `refresh_token` and `user`. Every write replaces the whole
//! group inside one transaction.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tracing::{debug, instrument};

use super::error::StorageError;
use super::store::{CredentialStore, StoredCredentials};
use crate::session::{Token, UserProfile};

const KEY_ACCESS_TOKEN: &str = "access_token";
const KEY_REFRESH_TOKEN: &str = "refresh_token";
const KEY_USER: &str = "user";

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// SQLx-backed credential store.
#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    /// Wrap an existing pool. The schema must already be migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `database_url` and run migrations.
    ///
    /// # Arguments
    /// * `database_url` - SQLite URL (e.g., "sqlite:unitrade.db?mode=rwc")
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let in_memory = database_url.contains(":memory:");

        let mut connect_options = SqliteConnectOptions::from_str(database_url)?
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
            .create_if_missing(true);
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every in-memory connection is its own database.
        let max_connections = if in_memory { 1 } else { 2 };

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30));
        if in_memory {
            // Closing the only connection would drop the database.
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(connect_options).await?;

        Self::run_migrations(&pool).await?;

        debug!(%database_url, "Credential store opened");
        Ok(Self { pool })
    }

    /// Apply the credential store schema.
    pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations").run(pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    #[instrument(skip_all)]
    async fn save(&self, credentials: &StoredCredentials) -> Result<(), StorageError> {
        let now = chrono::Utc::now().timestamp_millis();

        let mut rows: Vec<(&str, String)> =
            vec![(KEY_ACCESS_TOKEN, credentials.access_token.as_str().to_string())];
        if let Some(ref token) = credentials.refresh_token {
            rows.push((KEY_REFRESH_TOKEN, token.as_str().to_string()));
        }
        if let Some(ref user) = credentials.user {
            rows.push((KEY_USER, serde_json::to_string(user)?));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM credential_store")
            .execute(&mut *tx)
            .await?;

        for (key, value) in rows {
            sqlx::query(
                r#"
                INSERT INTO credential_store (key, value, updated_at)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            has_refresh_token = credentials.refresh_token.is_some(),
            has_user = credentials.user.is_some(),
            "Credentials saved"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<StoredCredentials>, StorageError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM credential_store")
                .fetch_all(&self.pool)
                .await?;

        let mut access_token = None;
        let mut refresh_token = None;
        let mut user = None;

        for (key, value) in rows {
            match key.as_str() {
                KEY_ACCESS_TOKEN => access_token = Some(Token::new(value)),
                KEY_REFRESH_TOKEN => refresh_token = Some(Token::new(value)),
                KEY_USER => user = Some(serde_json::from_str::<UserProfile>(&value)?),
                other => debug!(key = %other, "Ignoring unknown credential key"),
            }
        }

        match access_token {
            Some(access_token) => Ok(Some(StoredCredentials {
                access_token,
                refresh_token,
                user,
            })),
            None if refresh_token.is_some() || user.is_some() => Err(StorageError::Corrupt(
                "credential group has no access token".to_string(),
            )),
            None => Ok(None),
        }
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM credential_store")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!("Credentials cleared");
        Ok(())
    }
}
