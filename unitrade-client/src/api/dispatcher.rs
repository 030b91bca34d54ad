//! Request dispatcher.
//!
//! Builds and sends HTTP requests, attaching the session's access token as a
//! bearer credential. It never retries or refreshes; that is the job of
//! [`super::ApiClient`] and [`super::RefreshCoordinator`].

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::failure::extract_message;
use super::request::{ApiRequest, ApiResponse};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::session::{SessionHandle, Token};
use crate::utils::http_client::build_http_client;

/// A request that did not produce a 2xx response.
#[derive(Debug, Error)]
pub enum DispatchFailure {
    /// The request exceeded its timeout.
    #[error("Request to {} timed out", .request.path())]
    Timeout { request: Box<ApiRequest> },

    /// Connection or body transfer failed.
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        request: Box<ApiRequest>,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Status {
        status: StatusCode,
        /// Best-effort server message.
        message: String,
        /// Parsed body, when it was JSON.
        body: Option<Value>,
        /// The bearer credential the request carried.
        bearer: Option<Token>,
        /// Session generation the request was sent under.
        generation: u64,
        request: Box<ApiRequest>,
    },
}

impl DispatchFailure {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The request that failed, for replay.
    pub fn request(&self) -> &ApiRequest {
        match self {
            Self::Timeout { request }
            | Self::Transport { request, .. }
            | Self::Status { request, .. } => request,
        }
    }

    #[inline]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

/// Sends [`ApiRequest`]s to the configured backend.
pub struct RequestDispatcher {
    http: reqwest::Client,
    base_url: String,
    session: SessionHandle,
}

impl RequestDispatcher {
    /// Create a dispatcher with an HTTP client built from `config`.
    pub fn new(config: &ClientConfig, session: SessionHandle) -> Result<Self> {
        let http = build_http_client(config)?;
        Ok(Self::with_http_client(http, config, session))
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    pub fn with_http_client(
        http: reqwest::Client,
        config: &ClientConfig,
        session: SessionHandle,
    ) -> Self {
        Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send `request`, attaching the current access token when the request is
    /// authenticated and the session holds one.
    pub async fn send(&self, request: &ApiRequest) -> std::result::Result<ApiResponse, DispatchFailure> {
        let (bearer, generation) = if request.is_authenticated() {
            self.session.bearer()
        } else {
            (None, self.session.generation())
        };
        self.dispatch(request, bearer, generation).await
    }

    /// Send `request` with an explicit bearer credential.
    pub(crate) async fn send_with_token(
        &self,
        request: &ApiRequest,
        bearer: Option<Token>,
    ) -> std::result::Result<ApiResponse, DispatchFailure> {
        let generation = self.session.generation();
        self.dispatch(request, bearer, generation).await
    }

    #[instrument(
        skip(self, request, bearer),
        fields(method = %request.method(), path = %request.path(), retry = request.is_retry())
    )]
    async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<Token>,
        generation: u64,
    ) -> std::result::Result<ApiResponse, DispatchFailure> {
        let mut builder = self
            .http
            .request(request.method().clone(), self.url(request.path()));

        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(ref token) = bearer {
            builder = builder.bearer_auth(token.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_failure(e, request))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_failure(e, request))?;

        if status.is_success() {
            debug!(status = status.as_u16(), "Request succeeded");
            return Ok(ApiResponse::new(status, body));
        }

        let parsed: Option<Value> = serde_json::from_slice(&body).ok();
        let message = extract_message(parsed.as_ref(), &String::from_utf8_lossy(&body));

        debug!(
            status = status.as_u16(),
            %message,
            has_bearer = bearer.is_some(),
            "Request rejected by server"
        );

        Err(DispatchFailure::Status {
            status,
            message,
            body: parsed,
            bearer,
            generation,
            request: Box::new(request.clone()),
        })
    }
}

fn transport_failure(err: reqwest::Error, request: &ApiRequest) -> DispatchFailure {
    let request = Box::new(request.clone());
    if err.is_timeout() {
        warn!(path = %request.path(), "Request timed out");
        DispatchFailure::Timeout { request }
    } else {
        warn!(path = %request.path(), error = %err, "Request failed to reach server");
        DispatchFailure::Transport {
            message: err.to_string(),
            request,
        }
    }
}
