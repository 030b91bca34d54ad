//! Account flows: signup with email OTP, password reset and password change,
//! plus the university and campus directory the signup form picks from.
//!
//! Everything except `change_password` runs before a session exists and is
//! sent without a bearer credential.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::instrument;

use super::into_items;
use crate::api::{ApiClient, ApiFailure, ApiRequest, endpoints};

/// Signup form. Optional fields are omitted when unset.
#[derive(Clone, Serialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub university_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campus_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Clone)]
pub struct AccountService {
    client: ApiClient,
}

impl AccountService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    async fn post_public(&self, path: &str, body: Value) -> Result<Value, ApiFailure> {
        let request = ApiRequest::post(path).unauthenticated().with_body(body);
        self.client.send(request).await?.json_value()
    }

    /// Email a signup verification code.
    #[instrument(skip(self))]
    pub async fn send_otp(&self, email: &str) -> Result<Value, ApiFailure> {
        self.post_public(endpoints::SEND_OTP, json!({ "email": email }))
            .await
    }

    #[instrument(skip(self, otp))]
    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<Value, ApiFailure> {
        self.post_public(endpoints::VERIFY_OTP, json!({ "email": email, "otp": otp }))
            .await
    }

    /// Universities a student can sign up under.
    pub async fn universities(&self) -> Result<Vec<Value>, ApiFailure> {
        let request = ApiRequest::get(endpoints::UNIVERSITIES).unauthenticated();
        Ok(into_items(self.client.send(request).await?.json_value()?))
    }

    /// Campuses, optionally narrowed to one university.
    #[instrument(skip(self))]
    pub async fn campuses(&self, university_id: Option<i64>) -> Result<Vec<Value>, ApiFailure> {
        let mut request = ApiRequest::get(endpoints::CAMPUSES).unauthenticated();
        if let Some(university_id) = university_id {
            request = request.with_query("university_id", university_id);
        }
        Ok(into_items(self.client.send(request).await?.json_value()?))
    }

    /// Create the account. The email must have been verified first.
    #[instrument(skip_all, fields(email = %registration.email))]
    pub async fn register(&self, registration: &Registration) -> Result<Value, ApiFailure> {
        let request = ApiRequest::post(endpoints::REGISTER)
            .unauthenticated()
            .with_json(registration)
            .map_err(|e| ApiFailure::unknown(format!("Invalid registration: {e}")))?;
        self.client.send(request).await?.json_value()
    }

    #[instrument(skip(self))]
    pub async fn send_password_reset_otp(&self, email: &str) -> Result<Value, ApiFailure> {
        self.post_public(endpoints::PASSWORD_RESET_SEND_OTP, json!({ "email": email }))
            .await
    }

    #[instrument(skip(self, otp))]
    pub async fn verify_password_reset_otp(
        &self,
        email: &str,
        otp: &str,
    ) -> Result<Value, ApiFailure> {
        self.post_public(
            endpoints::PASSWORD_RESET_VERIFY_OTP,
            json!({ "email": email, "otp": otp }),
        )
        .await
    }

    #[instrument(skip(self, otp, new_password))]
    pub async fn reset_password(
        &self,
        email: &str,
        otp: &str,
        new_password: &str,
    ) -> Result<Value, ApiFailure> {
        self.post_public(
            endpoints::PASSWORD_RESET,
            json!({ "email": email, "otp": otp, "new_password": new_password }),
        )
        .await
    }

    /// Change the signed-in user's password.
    #[instrument(skip_all)]
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<Value, ApiFailure> {
        let request = ApiRequest::post(endpoints::CHANGE_PASSWORD).with_body(json!({
            "current_password": current_password,
            "new_password": new_password,
            "confirm_password": confirm_password,
        }));
        self.client.send(request).await?.json_value()
    }
}
