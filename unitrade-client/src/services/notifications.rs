use serde_json::Value;

use super::into_items;
use crate::api::{ApiClient, ApiFailure, ApiRequest, endpoints};

/// In-app notifications of the signed-in user.
#[derive(Clone)]
pub struct NotificationService {
    client: ApiClient,
}

impl NotificationService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<Value>, ApiFailure> {
        let response = self
            .client
            .send(ApiRequest::get(endpoints::NOTIFICATIONS))
            .await?;
        Ok(into_items(response.json_value()?))
    }

    pub async fn mark_read(&self, id: i64) -> Result<(), ApiFailure> {
        self.client
            .send(ApiRequest::post(endpoints::mark_notification_read(id)))
            .await?;
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<(), ApiFailure> {
        self.client
            .send(ApiRequest::post(endpoints::MARK_ALL_NOTIFICATIONS_READ))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiFailure> {
        self.client
            .send(ApiRequest::delete(endpoints::notification_detail(id)))
            .await?;
        Ok(())
    }
}
