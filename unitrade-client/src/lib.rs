//! Authenticated API client and session lifecycle manager for the UniTrade
//! storefront backend.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use unitrade_client::{ClientConfig, SessionManager};
//!
//! let manager = SessionManager::connect(ClientConfig::from_env()?).await?;
//! manager.hydrate().await?;
//! if manager.current_user().is_none() {
//!     manager.login("ama@st.ug.edu.gh", "secret").await?;
//! }
//! let _products = manager.products().search("calculator").await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod services;
pub mod session;
pub mod utils;

pub use api::{ApiClient, ApiFailure, ApiRequest, ApiResponse};
pub use config::ClientConfig;
pub use credentials::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
pub use error::{Error, Result};
pub use session::{SessionEvent, SessionManager, SessionState, UserProfile};
