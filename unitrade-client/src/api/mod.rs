//! Backend API access.
//!
//! - [`RequestDispatcher`]: transport step, attaches the bearer credential
//! - [`RefreshCoordinator`]: single-flight token refresh
//! - [`ApiClient`]: `send(request)` with transparent refresh and one replay
//! - [`ApiFailure`]: the normalized failure every caller branches on

mod client;
mod dispatcher;
pub mod endpoints;
mod failure;
mod refresh;
mod request;

pub use client::ApiClient;
pub use dispatcher::{DispatchFailure, RequestDispatcher};
pub use failure::{ApiFailure, NON_FIELD_ERRORS};
pub use refresh::RefreshCoordinator;
pub use request::{ApiRequest, ApiResponse};
