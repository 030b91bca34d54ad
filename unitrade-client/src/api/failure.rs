//! Error normalization.
//!
//! Every transport, protocol and server failure is mapped into the closed
//! [`ApiFailure`] set before it leaves the client. Callers branch on this type
//! only; raw status codes and transport errors do not escape.

use std::collections::BTreeMap;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use super::dispatcher::DispatchFailure;
use crate::credentials::StorageError;

/// Key under which messages that do not belong to a field are collected.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Fallback message when the server gave nothing usable.
const GENERIC_MESSAGE: &str = "An error occurred";

/// Envelope keys that never name a form field.
const ENVELOPE_KEYS: &[&str] = &["success", "code", "message", "detail", "error", "status"];

/// Normalized failure of a client operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiFailure {
    /// Unreachable host, connection reset, timeout.
    #[error("No response from server. Please check your connection.")]
    NetworkUnavailable,

    /// Login rejected.
    #[error("Invalid email or password.")]
    InvalidCredentials,

    /// The session can no longer be renewed; the user must log in again.
    #[error("Your session has expired. Please log in again.")]
    AuthExpired,

    /// The server rejected the submitted data.
    #[error("Validation failed: {}", summarize(.fields))]
    ValidationError { fields: BTreeMap<String, Vec<String>> },

    /// Any other non-2xx response.
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("{message}")]
    Unknown { message: String },
}

impl ApiFailure {
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    pub(crate) fn malformed_body(err: &serde_json::Error) -> Self {
        Self::unknown(format!("Malformed response body: {err}"))
    }

    /// Normalize a failed login call.
    ///
    /// The backend answers bad credentials with 400 (`invalid_credentials` /
    /// `authentication_failed`) or 401; field-level errors stay validation errors.
    pub fn from_login(failure: DispatchFailure) -> Self {
        match &failure {
            DispatchFailure::Status { status, .. } if *status == StatusCode::UNAUTHORIZED => {
                Self::InvalidCredentials
            }
            DispatchFailure::Status {
                status, body, ..
            } if *status == StatusCode::BAD_REQUEST => {
                let code = body
                    .as_ref()
                    .and_then(|b| b.get("code"))
                    .and_then(Value::as_str);
                if matches!(code, Some("invalid_credentials" | "authentication_failed")) {
                    return Self::InvalidCredentials;
                }
                let fields = field_errors(body.as_ref());
                if fields.is_empty() {
                    Self::InvalidCredentials
                } else {
                    Self::ValidationError { fields }
                }
            }
            _ => Self::from(failure),
        }
    }

    /// Normalize a failed call that was sent without a session.
    ///
    /// A 401 there rejects the request itself; there is no session to expire.
    pub fn from_unauthenticated(failure: DispatchFailure) -> Self {
        match failure {
            DispatchFailure::Status {
                status, message, ..
            } if status == StatusCode::UNAUTHORIZED => Self::ServerError {
                status: status.as_u16(),
                message,
            },
            other => Self::from(other),
        }
    }

    #[inline]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkUnavailable => true,
            Self::ServerError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Field errors of a [`ApiFailure::ValidationError`].
    pub fn field_errors(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        match self {
            Self::ValidationError { fields } => Some(fields),
            _ => None,
        }
    }

    /// Short message suitable for an alert.
    pub fn user_message(&self) -> String {
        match self {
            Self::ValidationError { fields } => fields
                .values()
                .flatten()
                .next()
                .cloned()
                .unwrap_or_else(|| GENERIC_MESSAGE.to_string()),
            Self::ServerError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<DispatchFailure> for ApiFailure {
    fn from(failure: DispatchFailure) -> Self {
        match failure {
            DispatchFailure::Timeout { .. } | DispatchFailure::Transport { .. } => {
                Self::NetworkUnavailable
            }
            DispatchFailure::Status {
                status,
                message,
                body,
                ..
            } => from_status(status, message, body.as_ref()),
        }
    }
}

impl From<StorageError> for ApiFailure {
    fn from(err: StorageError) -> Self {
        Self::unknown(format!("Credential storage failed: {err}"))
    }
}

impl From<crate::Error> for ApiFailure {
    fn from(err: crate::Error) -> Self {
        Self::unknown(err.to_string())
    }
}

fn from_status(status: StatusCode, message: String, body: Option<&Value>) -> ApiFailure {
    match status {
        StatusCode::UNAUTHORIZED => ApiFailure::AuthExpired,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            let mut fields = field_errors(body);
            if fields.is_empty() {
                fields.insert(NON_FIELD_ERRORS.to_string(), vec![message]);
            }
            ApiFailure::ValidationError { fields }
        }
        _ => ApiFailure::ServerError {
            status: status.as_u16(),
            message,
        },
    }
}

/// Best-effort server message across the shapes the backend produces:
/// a bare string, `message`, `detail`, `error`, else the JSON text.
pub(crate) fn extract_message(body: Option<&Value>, raw: &str) -> String {
    match body {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Object(map)) => ["message", "detail", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| body.map(Value::to_string).unwrap_or_default()),
        Some(Value::Null) | None => {
            let raw = raw.trim();
            if raw.is_empty() {
                GENERIC_MESSAGE.to_string()
            } else {
                raw.to_string()
            }
        }
        Some(other) => other.to_string(),
    }
}

/// Field errors in the `{"field": ["msg", ..]}` shape.
fn field_errors(body: Option<&Value>) -> BTreeMap<String, Vec<String>> {
    let mut fields = BTreeMap::new();
    let Some(Value::Object(map)) = body else {
        return fields;
    };

    for (key, value) in map {
        if ENVELOPE_KEYS.contains(&key.as_str()) {
            continue;
        }
        let messages: Vec<String> = match value {
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Value::String(s) => vec![s.clone()],
            Value::Object(_) => vec![value.to_string()],
            _ => continue,
        };
        if !messages.is_empty() {
            fields.insert(key.clone(), messages);
        }
    }
    fields
}

fn summarize(fields: &BTreeMap<String, Vec<String>>) -> String {
    fields
        .iter()
        .map(|(field, messages)| format!("{field}: {}", messages.join(" ")))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::ApiRequest;

    fn status_failure(status: u16, body: Value) -> DispatchFailure {
        let raw = body.to_string();
        DispatchFailure::Status {
            status: StatusCode::from_u16(status).unwrap(),
            message: extract_message(Some(&body), &raw),
            body: Some(body),
            bearer: None,
            generation: 0,
            request: Box::new(ApiRequest::get("/products/")),
        }
    }

    #[test]
    fn test_extract_message_shapes() {
        assert_eq!(extract_message(Some(&json!("Not allowed")), ""), "Not allowed");
        assert_eq!(
            extract_message(Some(&json!({"success": false, "message": "Email not verified."})), ""),
            "Email not verified."
        );
        assert_eq!(
            extract_message(Some(&json!({"detail": "Not found."})), ""),
            "Not found."
        );
        assert_eq!(
            extract_message(Some(&json!({"error": "Token is required"})), ""),
            "Token is required"
        );
        assert_eq!(
            extract_message(Some(&json!({"email": ["taken"]})), ""),
            r#"{"email":["taken"]}"#
        );
        assert_eq!(extract_message(None, "Bad Gateway\n"), "Bad Gateway");
        assert_eq!(extract_message(None, ""), GENERIC_MESSAGE);
    }

    #[test]
    fn test_transport_failures_are_network_unavailable() {
        let request = Box::new(ApiRequest::get("/products/"));
        assert_eq!(
            ApiFailure::from(DispatchFailure::Timeout {
                request: request.clone()
            }),
            ApiFailure::NetworkUnavailable
        );
        assert_eq!(
            ApiFailure::from(DispatchFailure::Transport {
                message: "connection refused".into(),
                request,
            }),
            ApiFailure::NetworkUnavailable
        );
    }

    #[test]
    fn test_field_validation_errors() {
        let failure = ApiFailure::from(status_failure(
            400,
            json!({"title": ["This field is required."], "price": ["A valid number is required."]}),
        ));

        let fields = failure.field_errors().unwrap();
        assert_eq!(fields["title"], vec!["This field is required."]);
        assert_eq!(fields["price"], vec!["A valid number is required."]);
        assert_eq!(failure.user_message(), "A valid number is required.");
    }

    #[test]
    fn test_message_only_400_is_non_field_error() {
        let failure = ApiFailure::from(status_failure(
            400,
            json!({"success": false, "message": "Current password is incorrect."}),
        ));

        assert_eq!(
            failure.field_errors().unwrap()[NON_FIELD_ERRORS],
            vec!["Current password is incorrect."]
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiFailure::from(status_failure(401, json!({"detail": "Token expired"}))),
            ApiFailure::AuthExpired
        );
        assert_eq!(
            ApiFailure::from(status_failure(404, json!({"detail": "Not found."}))),
            ApiFailure::ServerError {
                status: 404,
                message: "Not found.".into()
            }
        );
        let server = ApiFailure::from(status_failure(503, json!({"error": "maintenance"})));
        assert!(server.is_retryable());
        assert!(!ApiFailure::AuthExpired.is_retryable());
    }

    #[test]
    fn test_unauthenticated_401_is_not_auth_expired() {
        let failure = ApiFailure::from_unauthenticated(status_failure(
            401,
            json!({"detail": "Invalid or expired OTP."}),
        ));
        assert_eq!(
            failure,
            ApiFailure::ServerError {
                status: 401,
                message: "Invalid or expired OTP.".into()
            }
        );
        assert!(matches!(
            ApiFailure::from_unauthenticated(status_failure(400, json!({"otp": ["Required."]}))),
            ApiFailure::ValidationError { .. }
        ));
    }

    #[test]
    fn test_login_failures() {
        assert_eq!(
            ApiFailure::from_login(status_failure(
                400,
                json!({"success": false, "message": "Invalid email or password.", "code": "invalid_credentials"})
            )),
            ApiFailure::InvalidCredentials
        );
        assert_eq!(
            ApiFailure::from_login(status_failure(401, json!({"detail": "No active account"}))),
            ApiFailure::InvalidCredentials
        );
        assert!(matches!(
            ApiFailure::from_login(status_failure(400, json!({"email": ["This field is required."]}))),
            ApiFailure::ValidationError { .. }
        ));
        assert!(matches!(
            ApiFailure::from_login(status_failure(500, json!({}))),
            ApiFailure::ServerError { status: 500, .. }
        ));
    }
}
