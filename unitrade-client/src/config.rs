//! Client configuration.
//!
//! Defaults target the production backend. [`ClientConfig::from_env`] loads a
//! `.env` file (if present) and applies `UNITRADE_*` overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Production API base URL.
pub const DEFAULT_API_BASE_URL: &str =
    "https://unitradegh-backend-946167918479.europe-west1.run.app/api";

/// Default credential database.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:unitrade.db?mode=rwc";

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "unitrade_client=info,sqlx=warn";

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to (e.g. "http://10.0.2.2:8000/api").
    pub api_base_url: String,
    /// Per-request timeout; a timed-out request fails with `NetworkUnavailable`.
    pub request_timeout_ms: u64,
    /// Timeout for image uploads and other large bodies.
    pub upload_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// SQLite URL of the credential store.
    pub database_url: String,
    /// Optional server-side token revocation endpoint called on logout.
    pub logout_path: Option<String>,
    pub user_agent: String,
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            upload_timeout_ms: DEFAULT_UPLOAD_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            logout_path: None,
            user_agent: concat!("unitrade-client/", env!("CARGO_PKG_VERSION")).to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load `.env`, then read overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = var("UNITRADE_API_BASE_URL") {
            config.api_base_url = url;
        }
        if let Some(secs) = var("UNITRADE_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_ms = parse_secs("UNITRADE_REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = var("UNITRADE_UPLOAD_TIMEOUT_SECS") {
            config.upload_timeout_ms = parse_secs("UNITRADE_UPLOAD_TIMEOUT_SECS", &secs)?;
        }
        if let Some(url) = var("UNITRADE_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(path) = var("UNITRADE_LOGOUT_PATH") {
            config.logout_path = Some(path);
        }
        if let Some(filter) = var("RUST_LOG") {
            config.log_filter = filter;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.api_base_url)
            .map_err(|e| Error::config(format!("invalid api_base_url '{}': {e}", self.api_base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "api_base_url must be http(s), got '{}'",
                url.scheme()
            )));
        }
        if self.request_timeout_ms == 0 || self.upload_timeout_ms == 0 {
            return Err(Error::config("timeouts must be greater than zero"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map(|secs| secs.saturating_mul(1000))
        .map_err(|e| Error::config(format!("{key}: expected whole seconds, got '{value}' ({e})")))
}
