//! Authenticated API client.
//!
//! The entry point domain services use for every call. It dispatches the
//! request, and on a 401 joins the single-flight refresh and replays the
//! request exactly once with the renewed token.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::dispatcher::{DispatchFailure, RequestDispatcher};
use super::failure::ApiFailure;
use super::refresh::RefreshCoordinator;
use super::request::{ApiRequest, ApiResponse};
use crate::session::SessionHandle;

/// Cloneable client shared by all domain services of a session.
#[derive(Clone)]
pub struct ApiClient {
    dispatcher: Arc<RequestDispatcher>,
    coordinator: RefreshCoordinator,
    session: SessionHandle,
}

impl ApiClient {
    pub fn new(
        dispatcher: Arc<RequestDispatcher>,
        coordinator: RefreshCoordinator,
        session: SessionHandle,
    ) -> Self {
        Self {
            dispatcher,
            coordinator,
            session,
        }
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Send `request`, transparently refreshing an expired access token.
    ///
    /// A request is replayed at most once; a second 401 resolves to
    /// [`ApiFailure::AuthExpired`], as does a 401 on a request whose session
    /// was logged out or replaced while it was in flight. Timeouts and
    /// transport errors never trigger a refresh.
    #[instrument(skip_all, fields(method = %request.method(), path = %request.path()))]
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiFailure> {
        let failure = match self.dispatcher.send(&request).await {
            Ok(response) => return Ok(response),
            Err(failure) => failure,
        };

        if !failure.is_unauthorized() || request.is_retry() {
            return Err(ApiFailure::from(failure));
        }
        if !request.is_authenticated() {
            return Err(ApiFailure::from_unauthenticated(failure));
        }

        let DispatchFailure::Status {
            bearer, generation, ..
        } = failure
        else {
            return Err(ApiFailure::from(failure));
        };

        let token = self
            .coordinator
            .acquire_fresh_token(bearer.as_ref(), generation)
            .await?;
        // Never replay into a session other than the one the request was sent under.
        if self.session.generation() != generation {
            return Err(ApiFailure::AuthExpired);
        }
        debug!("Replaying request with renewed access token");

        request.mark_retry();
        match self.dispatcher.send_with_token(&request, Some(token)).await {
            Ok(response) => Ok(response),
            Err(DispatchFailure::Status { bearer, status, .. })
                if status == reqwest::StatusCode::UNAUTHORIZED =>
            {
                self.coordinator.reject_replayed(bearer.as_ref()).await;
                Err(ApiFailure::AuthExpired)
            }
            Err(failure) => Err(ApiFailure::from(failure)),
        }
    }
}
