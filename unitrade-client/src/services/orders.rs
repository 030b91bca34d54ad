//! Orders and Paystack checkout.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use super::into_items;
use crate::api::{ApiClient, ApiFailure, ApiRequest, endpoints};

#[derive(Debug, Deserialize)]
struct PaymentInit {
    authorization_url: String,
}

/// Orders placed by the signed-in buyer.
#[derive(Clone)]
pub struct OrderService {
    client: ApiClient,
}

impl OrderService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<Value>, ApiFailure> {
        let response = self.client.send(ApiRequest::get(endpoints::ORDERS)).await?;
        Ok(into_items(response.json_value()?))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<Value, ApiFailure> {
        self.client
            .send(ApiRequest::get(endpoints::order_detail(id)))
            .await?
            .json_value()
    }

    /// Place an order. `order` carries `items`, `total`, `payment_method` and
    /// `delivery_address`; the buyer is taken from the session.
    #[instrument(skip_all)]
    pub async fn create(&self, order: Value) -> Result<Value, ApiFailure> {
        let request = ApiRequest::post(endpoints::ORDERS).with_body(order);
        self.client.send(request).await?.json_value()
    }

    /// Start a Paystack transaction for `order_id` and return the checkout URL.
    /// `amount` is in cedis; the backend converts it to pesewas.
    #[instrument(skip(self, email))]
    pub async fn initialize_payment(
        &self,
        amount: f64,
        email: &str,
        order_id: i64,
    ) -> Result<String, ApiFailure> {
        let request = ApiRequest::post(endpoints::PAYSTACK_INIT).with_body(json!({
            "amount": amount,
            "email": email,
            "order_id": order_id,
        }));
        let init: PaymentInit = self.client.send(request).await?.json()?;
        Ok(init.authorization_url)
    }

    #[instrument(skip(self))]
    pub async fn verify_payment(&self, reference: &str) -> Result<Value, ApiFailure> {
        let request =
            ApiRequest::post(endpoints::VERIFY_PAYMENT).with_body(json!({ "reference": reference }));
        self.client.send(request).await?.json_value()
    }
}
