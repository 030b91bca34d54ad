//! The single owned session object shared by the dispatcher, the refresh
//! coordinator and the session manager.
//!
//! In-memory state sits behind a `parking_lot::RwLock` that is never held across
//! an `.await`. Every change that must be mirrored into the credential store runs
//! under an async persist lock, so a store write can never land after a newer
//! logout or expiry has cleared the group.
//!
//! Each login, logout and expiry bumps the session *generation*. Work that
//! started against an older generation (an in-flight refresh, a profile fetch)
//! is discarded when it settles.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};

use super::types::{SessionEvent, SessionState, Token, UserProfile};
use crate::credentials::{CredentialStore, StoredCredentials};
use crate::error::{Error, Result};

/// Broadcast channel capacity for session events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Session data.
#[derive(Debug, Clone, Default)]
pub struct Session {
    access_token: Option<Token>,
    refresh_token: Option<Token>,
    user: Option<UserProfile>,
    state: SessionState,
    push_token: Option<String>,
    generation: u64,
}

impl Session {
    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn access_token(&self) -> Option<&Token> {
        self.access_token.as_ref()
    }

    pub fn refresh_token(&self) -> Option<&Token> {
        self.refresh_token.as_ref()
    }

    /// Push token handed to the backend for this device, if any.
    pub fn push_token(&self) -> Option<&str> {
        self.push_token.as_deref()
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn transition(&mut self, to: SessionState, events: &mut Vec<SessionEvent>) -> Result<()> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(Error::invalid_transition(from, to));
        }
        self.state = to;
        if from != to {
            events.push(SessionEvent::StateChanged { from, to });
        }
        Ok(())
    }

    /// Drop all credentials and start a new generation.
    fn clear(&mut self, events: &mut Vec<SessionEvent>) {
        let from = self.state;
        self.access_token = None;
        self.refresh_token = None;
        self.user = None;
        self.push_token = None;
        self.generation += 1;
        self.state = SessionState::Unauthenticated;
        if from != SessionState::Unauthenticated {
            events.push(SessionEvent::StateChanged {
                from,
                to: SessionState::Unauthenticated,
            });
        }
    }
}

/// Result of asking the session for permission to refresh.
#[derive(Debug, Clone)]
pub(crate) enum RefreshGrant {
    /// The session moved to `Refreshing`; the caller must settle it.
    Granted { generation: u64, refresh_token: Token },
    /// Authenticated, but there is nothing to refresh with.
    NoRefreshToken { generation: u64 },
    /// No live session.
    Unavailable,
}

struct HandleInner {
    session: RwLock<Session>,
    store: Arc<dyn CredentialStore>,
    persist_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

/// Cloneable handle to the session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    /// Create an empty (`Unauthenticated`) session mirrored into `store`.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(HandleInner {
                session: RwLock::new(Session::default()),
                store,
                persist_lock: Mutex::new(()),
                events,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.session.read().state
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.inner.session.read().user.clone()
    }

    /// Copy of the current session.
    pub fn snapshot(&self) -> Session {
        self.inner.session.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.store
    }

    pub(crate) fn generation(&self) -> u64 {
        self.inner.session.read().generation
    }

    /// Access token to attach together with the generation it belongs to,
    /// read under one lock.
    pub(crate) fn bearer(&self) -> (Option<Token>, u64) {
        let session = self.inner.session.read();
        let token = if session.state.has_credentials() {
            session.access_token.clone()
        } else {
            None
        };
        (token, session.generation)
    }

    fn publish(&self, events: Vec<SessionEvent>) {
        for event in events {
            debug!(event = event.event_name(), "Session event");
            // No subscribers is fine.
            let _ = self.inner.events.send(event);
        }
    }

    /// Restore a persisted session. A live session is left untouched.
    pub(crate) async fn hydrate(&self) -> Result<SessionState> {
        let _persist = self.inner.persist_lock.lock().await;
        let stored = self.inner.store.load().await?;

        let mut events = Vec::new();
        let state = {
            let mut session = self.inner.session.write();
            if session.state == SessionState::Unauthenticated {
                if let Some(stored) = stored {
                    session.access_token = Some(stored.access_token);
                    session.refresh_token = stored.refresh_token;
                    session.user = stored.user;
                    session.state = SessionState::Authenticated;
                    events.push(SessionEvent::StateChanged {
                        from: SessionState::Unauthenticated,
                        to: SessionState::Authenticated,
                    });
                }
            }
            session.state
        };

        self.publish(events);
        Ok(state)
    }

    /// Enter `Authenticating`. Returns the generation the login belongs to.
    pub(crate) fn begin_login(&self) -> Result<u64> {
        let mut events = Vec::new();
        let generation = {
            let mut session = self.inner.session.write();
            session.transition(SessionState::Authenticating, &mut events)?;
            session.generation += 1;
            session.generation
        };
        self.publish(events);
        Ok(generation)
    }

    /// Persist and adopt the login result.
    ///
    /// Returns `Ok(false)` if the login was superseded (e.g. by a logout).
    pub(crate) async fn complete_login(
        &self,
        generation: u64,
        credentials: StoredCredentials,
    ) -> Result<bool> {
        let _persist = self.inner.persist_lock.lock().await;

        {
            let session = self.inner.session.read();
            if session.generation != generation || session.state != SessionState::Authenticating {
                return Ok(false);
            }
        }

        if let Err(e) = self.inner.store.save(&credentials).await {
            self.abort_login(generation);
            return Err(e.into());
        }

        let mut events = Vec::new();
        {
            let mut session = self.inner.session.write();
            session.transition(SessionState::Authenticated, &mut events)?;
            session.access_token = Some(credentials.access_token);
            session.refresh_token = credentials.refresh_token;
            session.user = credentials.user.clone();
            events.push(SessionEvent::LoggedIn {
                user: credentials.user,
            });
        }
        self.publish(events);
        Ok(true)
    }

    /// Leave `Authenticating` after a failed login.
    pub(crate) fn abort_login(&self, generation: u64) {
        let mut events = Vec::new();
        {
            let mut session = self.inner.session.write();
            if session.generation == generation && session.state == SessionState::Authenticating {
                session.clear(&mut events);
            }
        }
        self.publish(events);
    }

    /// Ask to start a refresh of `generation`; on `Granted` the session is in
    /// `Refreshing`.
    pub(crate) fn begin_refresh(&self, generation: u64) -> Result<RefreshGrant> {
        let mut events = Vec::new();
        let grant = {
            let mut session = self.inner.session.write();
            if session.generation != generation {
                return Ok(RefreshGrant::Unavailable);
            }
            match (session.state, session.refresh_token.clone()) {
                (SessionState::Authenticated, Some(refresh_token)) => {
                    session.transition(SessionState::Refreshing, &mut events)?;
                    RefreshGrant::Granted {
                        generation: session.generation,
                        refresh_token,
                    }
                }
                (SessionState::Authenticated, None) => RefreshGrant::NoRefreshToken {
                    generation: session.generation,
                },
                _ => RefreshGrant::Unavailable,
            }
        };
        self.publish(events);
        Ok(grant)
    }

    /// Adopt a new access token (and rotated refresh token, if any).
    ///
    /// Returns the token callers should retry with, or `None` when the session
    /// moved on while the refresh was in flight.
    pub(crate) async fn complete_refresh(
        &self,
        generation: u64,
        access_token: Token,
        rotated_refresh_token: Option<Token>,
    ) -> Result<Option<Token>> {
        let _persist = self.inner.persist_lock.lock().await;

        let stored = {
            let session = self.inner.session.read();
            if session.generation != generation || session.state != SessionState::Refreshing {
                return Ok(None);
            }
            StoredCredentials {
                access_token: access_token.clone(),
                refresh_token: rotated_refresh_token.or_else(|| session.refresh_token.clone()),
                user: session.user.clone(),
            }
        };

        if let Err(e) = self.inner.store.save(&stored).await {
            warn!(error = %e, "Failed to persist refreshed credentials; keeping them in memory");
        }

        let mut events = Vec::new();
        {
            let mut session = self.inner.session.write();
            session.transition(SessionState::Authenticated, &mut events)?;
            session.access_token = Some(access_token.clone());
            session.refresh_token = stored.refresh_token;
            events.push(SessionEvent::Refreshed);
        }
        self.publish(events);
        Ok(Some(access_token))
    }

    /// Forced logout: the credentials of `generation` can no longer be renewed.
    ///
    /// Returns `false` if that generation is already gone.
    pub(crate) async fn expire(&self, generation: u64) -> bool {
        let _persist = self.inner.persist_lock.lock().await;

        let mut events = Vec::new();
        {
            let mut session = self.inner.session.write();
            if session.generation != generation {
                return false;
            }
            session.clear(&mut events);
            events.push(SessionEvent::Expired);
        }

        if let Err(e) = self.inner.store.clear().await {
            warn!(error = %e, "Failed to clear credential store after session expiry");
        }

        self.publish(events);
        true
    }

    /// Explicit logout. Returns the session as it was before the reset.
    ///
    /// The in-memory session is always cleared; the returned error only
    /// reports a failure to wipe the store.
    pub(crate) async fn reset(&self) -> (Session, Result<()>) {
        let _persist = self.inner.persist_lock.lock().await;

        let mut events = Vec::new();
        let previous = {
            let mut session = self.inner.session.write();
            let previous = session.clone();
            session.clear(&mut events);
            if previous.state != SessionState::Unauthenticated {
                events.push(SessionEvent::LoggedOut);
            }
            previous
        };
        self.publish(events);

        let cleared = self.inner.store.clear().await.map_err(Error::from);
        (previous, cleared)
    }

    /// Replace the cached user profile of `generation`.
    pub(crate) async fn replace_user(&self, generation: u64, user: UserProfile) -> Result<bool> {
        let _persist = self.inner.persist_lock.lock().await;

        let stored = {
            let session = self.inner.session.read();
            match (&session.access_token, session.state.has_credentials()) {
                (Some(access_token), true) if session.generation == generation => {
                    StoredCredentials {
                        access_token: access_token.clone(),
                        refresh_token: session.refresh_token.clone(),
                        user: Some(user.clone()),
                    }
                }
                _ => return Ok(false),
            }
        };

        self.inner.store.save(&stored).await?;

        let mut events = Vec::new();
        {
            let mut session = self.inner.session.write();
            if session.generation != generation {
                return Ok(false);
            }
            session.user = Some(user.clone());
            events.push(SessionEvent::ProfileUpdated { user });
        }
        self.publish(events);
        Ok(true)
    }

    /// Remember the push token registered for this device.
    pub(crate) fn set_push_token(&self, generation: u64, token: String) -> bool {
        let mut session = self.inner.session.write();
        if session.generation != generation || !session.state.has_credentials() {
            return false;
        }
        session.push_token = Some(token);
        true
    }
}
