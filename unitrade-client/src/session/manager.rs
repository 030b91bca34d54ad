//! Session manager.
//!
//! Orchestrates the credential store, the request dispatcher and the refresh
//! coordinator behind the operations the application uses.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::handle::SessionHandle;
use super::types::{SessionEvent, SessionState, Token, UserProfile};
use crate::api::{
    ApiClient, ApiFailure, ApiRequest, ApiResponse, RefreshCoordinator, RequestDispatcher,
    endpoints,
};
use crate::config::ClientConfig;
use crate::credentials::{CredentialStore, SqliteCredentialStore, StoredCredentials};
use crate::error::Result;
use crate::services::{
    AccountService, MessagingService, NotificationService, OrderService, ProductService,
    WishlistService,
};

/// Login endpoint response.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
    #[serde(default)]
    user: Option<Value>,
}

/// Session manager for one signed-in user.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    config: Arc<ClientConfig>,
    session: SessionHandle,
    client: ApiClient,
}

impl SessionManager {
    /// Create a manager persisting into `store`. The session starts
    /// `Unauthenticated`; call [`SessionManager::hydrate`] to restore it.
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        config.validate()?;

        let session = SessionHandle::new(store);
        let dispatcher = Arc::new(RequestDispatcher::new(&config, session.clone())?);
        let coordinator = RefreshCoordinator::new(session.clone(), Arc::clone(&dispatcher));
        let client = ApiClient::new(dispatcher, coordinator, session.clone());

        Ok(Self {
            config: Arc::new(config),
            session,
            client,
        })
    }

    /// Create a manager backed by the SQLite store at `config.database_url`.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let store = SqliteCredentialStore::connect(&config.database_url).await?;
        Self::new(config, Arc::new(store))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The authenticated client domain services send through.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.state().has_credentials()
    }

    /// The cached user profile. Never touches the network.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.session.current_user()
    }

    /// Subscribe to session events (login, logout, forced logout on expiry).
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    /// Restore the persisted session. No network call is made.
    #[instrument(skip(self))]
    pub async fn hydrate(&self) -> Result<SessionState> {
        let state = self.session.hydrate().await?;
        info!(%state, "Session hydrated");
        Ok(state)
    }

    /// Log in with email and password.
    ///
    /// On failure the session is left `Unauthenticated`.
    #[instrument(skip_all)]
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> std::result::Result<UserProfile, ApiFailure> {
        if self.session.state().has_credentials() {
            debug!("Replacing existing session");
            let (_, cleared) = self.session.reset().await;
            cleared?;
        }

        let generation = self.session.begin_login()?;

        let request = ApiRequest::post(endpoints::LOGIN)
            .unauthenticated()
            .with_body(json!({ "email": identifier, "password": secret }));

        let response = match self.client.dispatcher().send(&request).await {
            Ok(response) => response,
            Err(failure) => {
                self.session.abort_login(generation);
                let failure = ApiFailure::from_login(failure);
                info!(error = %failure, "Login failed");
                return Err(failure);
            }
        };

        let (credentials, user) = match parse_login(&response) {
            Ok(parsed) => parsed,
            Err(failure) => {
                self.session.abort_login(generation);
                warn!(error = %failure, "Unusable login response");
                return Err(failure);
            }
        };

        if !self.session.complete_login(generation, credentials).await? {
            info!("Login superseded by logout");
            return Err(ApiFailure::unknown("Login was cancelled"));
        }

        info!(user_id = ?user.id(), "Logged in");
        Ok(user)
    }

    /// Log out.
    ///
    /// The local session and the credential store are always cleared first;
    /// server-side invalidation is best effort and never fails the logout.
    /// An error is returned only if the store could not be wiped.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> std::result::Result<(), ApiFailure> {
        let (previous, cleared) = self.session.reset().await;

        if previous.state().has_credentials() {
            if let Some(access_token) = previous.access_token() {
                self.invalidate_remote(
                    access_token,
                    previous.refresh_token(),
                    previous.push_token(),
                )
                .await;
            }
        }

        match cleared {
            Ok(()) => {
                info!("Logged out");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to wipe credential store on logout");
                Err(e.into())
            }
        }
    }

    async fn invalidate_remote(
        &self,
        access_token: &Token,
        refresh_token: Option<&Token>,
        push_token: Option<&str>,
    ) {
        let dispatcher = self.client.dispatcher();

        if let Some(push_token) = push_token {
            let request = ApiRequest::post(endpoints::REMOVE_PUSH_TOKEN)
                .with_body(json!({ "token": push_token }));
            if let Err(e) = dispatcher.send_with_token(&request, Some(access_token.clone())).await {
                warn!(error = %e, "Failed to remove push token on logout");
            }
        }

        if let Some(path) = self.config.logout_path.as_deref() {
            let mut request = ApiRequest::post(path);
            if let Some(refresh_token) = refresh_token {
                request = request.with_body(json!({ "refresh": refresh_token.as_str() }));
            }
            if let Err(e) = dispatcher.send_with_token(&request, Some(access_token.clone())).await {
                warn!(error = %e, "Server-side logout failed");
            }
        }
    }

    /// Fetch the signed-in user and replace the cached profile.
    #[instrument(skip(self))]
    pub async fn refresh_profile(&self) -> std::result::Result<UserProfile, ApiFailure> {
        let generation = self.session.generation();
        let response = self.client.send(ApiRequest::get(endpoints::USER_ME)).await?;
        self.adopt_user(generation, &response).await
    }

    /// Update profile fields and replace the cached profile with the result.
    #[instrument(skip_all)]
    pub async fn update_profile(
        &self,
        fields: Value,
    ) -> std::result::Result<UserProfile, ApiFailure> {
        let generation = self.session.generation();
        let request = ApiRequest::put(endpoints::USER_PROFILE).with_body(fields);
        let response = self.client.send(request).await?;
        self.adopt_user(generation, &response).await
    }

    /// Register this device's push token. It is removed again on logout.
    #[instrument(skip(self, token))]
    pub async fn register_push_token(
        &self,
        token: &str,
        device_type: &str,
    ) -> std::result::Result<(), ApiFailure> {
        let generation = self.session.generation();
        let request = ApiRequest::post(endpoints::SAVE_PUSH_TOKEN)
            .with_body(json!({ "token": token, "device_type": device_type }));
        self.client.send(request).await?;

        if !self.session.set_push_token(generation, token.to_string()) {
            return Err(ApiFailure::AuthExpired);
        }
        debug!("Push token registered");
        Ok(())
    }

    async fn adopt_user(
        &self,
        generation: u64,
        response: &ApiResponse,
    ) -> std::result::Result<UserProfile, ApiFailure> {
        let user = parse_user(response.json_value()?)?;
        if !self.session.replace_user(generation, user.clone()).await? {
            return Err(ApiFailure::AuthExpired);
        }
        Ok(user)
    }

    pub fn accounts(&self) -> AccountService {
        AccountService::new(self.client.clone())
    }

    pub fn products(&self) -> ProductService {
        ProductService::new(self.client.clone(), self.config.upload_timeout())
    }

    pub fn messaging(&self) -> MessagingService {
        MessagingService::new(self.client.clone())
    }

    pub fn notifications(&self) -> NotificationService {
        NotificationService::new(self.client.clone())
    }

    pub fn orders(&self) -> OrderService {
        OrderService::new(self.client.clone())
    }

    pub fn wishlist(&self) -> WishlistService {
        WishlistService::new(self.client.clone())
    }
}

fn parse_login(
    response: &ApiResponse,
) -> std::result::Result<(StoredCredentials, UserProfile), ApiFailure> {
    let body: LoginResponse = response.json()?;
    if body.access.is_empty() {
        return Err(ApiFailure::unknown("Login response carried no access token"));
    }
    let user = match body.user {
        Some(Value::Null) | None => {
            return Err(ApiFailure::unknown("Login response carried no user"));
        }
        Some(user) => UserProfile::new(user),
    };

    let credentials = StoredCredentials::new(
        Token::new(body.access),
        body.refresh.filter(|r| !r.is_empty()).map(Token::new),
        Some(user.clone()),
    );
    Ok((credentials, user))
}

/// Profile endpoints answer `{"success": true, "user": {..}}`; a bare user
/// object is accepted too.
fn parse_user(body: Value) -> std::result::Result<UserProfile, ApiFailure> {
    match body {
        Value::Object(mut map) => match map.remove("user") {
            Some(user @ Value::Object(_)) => Ok(UserProfile::new(user)),
            Some(_) => Err(ApiFailure::unknown("Malformed response body: invalid user")),
            None => Ok(UserProfile::new(Value::Object(map))),
        },
        _ => Err(ApiFailure::unknown("Malformed response body: expected a user object")),
    }
}
