use serde_json::{Value, json};
use tracing::instrument;

use super::into_items;
use crate::api::{ApiClient, ApiFailure, ApiRequest, endpoints};

/// Buyer/seller message threads.
#[derive(Clone)]
pub struct MessagingService {
    client: ApiClient,
}

impl MessagingService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn threads(&self) -> Result<Vec<Value>, ApiFailure> {
        let response = self
            .client
            .send(ApiRequest::get(endpoints::MESSAGE_THREADS))
            .await?;
        Ok(into_items(response.json_value()?))
    }

    pub async fn thread(&self, id: i64) -> Result<Value, ApiFailure> {
        self.client
            .send(ApiRequest::get(endpoints::message_thread_detail(id)))
            .await?
            .json_value()
    }

    /// Open a thread between a buyer and a seller about a product.
    #[instrument(skip(self))]
    pub async fn create_thread(
        &self,
        buyer: i64,
        seller: i64,
        product: i64,
    ) -> Result<Value, ApiFailure> {
        let request = ApiRequest::post(endpoints::MESSAGE_THREADS).with_body(json!({
            "buyer": buyer,
            "seller": seller,
            "product": product,
        }));
        self.client.send(request).await?.json_value()
    }

    pub async fn messages(&self, thread: i64) -> Result<Vec<Value>, ApiFailure> {
        let request = ApiRequest::get(endpoints::MESSAGES).with_query("thread", thread);
        let response = self.client.send(request).await?;
        Ok(into_items(response.json_value()?))
    }

    #[instrument(skip(self, content))]
    pub async fn send_message(&self, thread: i64, content: &str) -> Result<Value, ApiFailure> {
        let request = ApiRequest::post(endpoints::MESSAGES)
            .with_body(json!({ "thread": thread, "content": content }));
        self.client.send(request).await?.json_value()
    }

    pub async fn mark_read(&self, thread: i64) -> Result<(), ApiFailure> {
        self.client
            .send(ApiRequest::post(endpoints::mark_thread_read(thread)))
            .await?;
        Ok(())
    }
}
