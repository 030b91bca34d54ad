use std::time::Duration;

use serde_json::{Value, json};
use tracing::instrument;

use super::into_items;
use crate::api::{ApiClient, ApiFailure, ApiRequest, endpoints};

/// Filters for the product listing.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub campus: Option<i64>,
    pub page: Option<u32>,
    /// Extra filters passed through verbatim.
    pub extra: Vec<(String, String)>,
}

impl ProductQuery {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
            ..Self::default()
        }
    }

    fn apply(&self, mut request: ApiRequest) -> ApiRequest {
        if let Some(ref search) = self.search {
            request = request.with_query("search", search);
        }
        if let Some(ref category) = self.category {
            request = request.with_query("category", category);
        }
        if let Some(campus) = self.campus {
            request = request.with_query("campus", campus);
        }
        if let Some(page) = self.page {
            request = request.with_query("page", page);
        }
        for (key, value) in &self.extra {
            request = request.with_query(key.clone(), value);
        }
        request
    }
}

/// Product catalogue.
#[derive(Clone)]
pub struct ProductService {
    client: ApiClient,
    upload_timeout: Duration,
}

impl ProductService {
    pub fn new(client: ApiClient, upload_timeout: Duration) -> Self {
        Self {
            client,
            upload_timeout,
        }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, query: &ProductQuery) -> Result<Vec<Value>, ApiFailure> {
        let request = query.apply(ApiRequest::get(endpoints::PRODUCTS));
        let response = self.client.send(request).await?;
        Ok(into_items(response.json_value()?))
    }

    pub async fn search(&self, term: &str) -> Result<Vec<Value>, ApiFailure> {
        self.list(&ProductQuery::search(term)).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<Value, ApiFailure> {
        let response = self
            .client
            .send(ApiRequest::get(endpoints::product_detail(id)))
            .await?;
        response.json_value()
    }

    /// Create a listing. Images travel inline as `images_base64`, so the
    /// upload timeout applies.
    #[instrument(skip_all)]
    pub async fn create(&self, product: Value) -> Result<Value, ApiFailure> {
        let request = ApiRequest::post(endpoints::PRODUCTS)
            .with_body(product)
            .with_timeout(self.upload_timeout);
        self.client.send(request).await?.json_value()
    }

    #[instrument(skip(self, product))]
    pub async fn update(&self, id: i64, product: Value) -> Result<Value, ApiFailure> {
        let request = ApiRequest::put(endpoints::product_detail(id))
            .with_body(product)
            .with_timeout(self.upload_timeout);
        self.client.send(request).await?.json_value()
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), ApiFailure> {
        self.client
            .send(ApiRequest::delete(endpoints::product_detail(id)))
            .await?;
        Ok(())
    }

    pub async fn ratings(&self, id: i64) -> Result<Vec<Value>, ApiFailure> {
        let response = self
            .client
            .send(ApiRequest::get(endpoints::product_ratings(id)))
            .await?;
        Ok(into_items(response.json_value()?))
    }

    #[instrument(skip(self, comment))]
    pub async fn rate(
        &self,
        id: i64,
        rating: u8,
        comment: Option<&str>,
    ) -> Result<Value, ApiFailure> {
        let mut body = json!({ "rating": rating });
        if let Some(comment) = comment {
            body["comment"] = json!(comment);
        }
        let request = ApiRequest::post(endpoints::product_ratings(id)).with_body(body);
        self.client.send(request).await?.json_value()
    }
}
