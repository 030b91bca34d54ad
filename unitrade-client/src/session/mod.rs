//! Session lifecycle.
//!
//! [`SessionManager`] is what the application talks to: hydrate on startup,
//! login, logout and the current user. It owns a [`SessionHandle`], the single
//! session object shared with the request dispatcher and refresh coordinator.
//!
//! ```text
//! Unauthenticated --login--> Authenticating --ok--> Authenticated
//!        ^                          |                  |     ^
//!        +-------- failure ---------+            401   v     | refreshed
//!        +------------ logout / refresh failure --- Refreshing
//! ```

mod handle;
mod manager;
mod types;

pub(crate) use handle::RefreshGrant;
pub use handle::{Session, SessionHandle};
pub use manager::SessionManager;
pub use types::{SessionEvent, SessionState, Token, UserProfile};
