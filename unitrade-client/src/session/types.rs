//! Core session types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A bearer credential (access or refresh token).
///
/// `Debug` is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// User record returned by the backend at login, refresh or "who am I" time.
///
/// The client does not interpret the record; it is replaced wholesale on every
/// successful fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(serde_json::Value);

impl UserProfile {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Raw field lookup.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Backend user id, when present.
    pub fn id(&self) -> Option<i64> {
        self.get("id").and_then(serde_json::Value::as_i64)
    }

    pub fn email(&self) -> Option<&str> {
        self.get("email").and_then(serde_json::Value::as_str)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Refreshing => "refreshing",
        }
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Staying in `Unauthenticated` is allowed (logout of an empty session).
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (_, Unauthenticated)
                | (Unauthenticated, Authenticating)
                | (Authenticating, Authenticated)
                | (Authenticated, Refreshing)
                | (Refreshing, Authenticated)
        )
    }

    /// Whether requests should carry a bearer credential in this state.
    #[inline]
    pub fn has_credentials(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Refreshing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events broadcast by the session so the presentation layer can react
/// (e.g. route to the login screen on [`SessionEvent::Expired`]).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    LoggedIn {
        user: Option<UserProfile>,
    },
    /// The user logged out explicitly.
    LoggedOut,
    /// The session was cleared because the credentials could not be renewed.
    Expired,
    /// A new access token was obtained.
    Refreshed,
    ProfileUpdated {
        user: UserProfile,
    },
}

impl SessionEvent {
    /// Event name for subscription matching and logs.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "session_state_changed",
            Self::LoggedIn { .. } => "session_logged_in",
            Self::LoggedOut => "session_logged_out",
            Self::Expired => "session_expired",
            Self::Refreshed => "session_refreshed",
            Self::ProfileUpdated { .. } => "session_profile_updated",
        }
    }
}
