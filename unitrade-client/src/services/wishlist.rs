use serde_json::{Value, json};
use tracing::instrument;

use super::into_items;
use crate::api::{ApiClient, ApiFailure, ApiRequest, endpoints};

/// Saved products of the signed-in user.
#[derive(Clone)]
pub struct WishlistService {
    client: ApiClient,
}

impl WishlistService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Wishlist entries, each with the full `product` nested.
    pub async fn list(&self) -> Result<Vec<Value>, ApiFailure> {
        let response = self.client.send(ApiRequest::get(endpoints::WISHLIST)).await?;
        Ok(into_items(response.json_value()?))
    }

    #[instrument(skip(self))]
    pub async fn add(&self, product_id: i64) -> Result<Value, ApiFailure> {
        let request =
            ApiRequest::post(endpoints::WISHLIST).with_body(json!({ "product_id": product_id }));
        self.client.send(request).await?.json_value()
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, product_id: i64) -> Result<(), ApiFailure> {
        self.client
            .send(ApiRequest::delete(endpoints::wishlist_item(product_id)))
            .await?;
        Ok(())
    }
}
