//! Domain services over the authenticated [`ApiClient`](crate::api::ApiClient).
//!
//! Every call goes through `ApiClient::send`, so an expired access token is
//! refreshed transparently and failures arrive as
//! [`ApiFailure`](crate::api::ApiFailure).

mod accounts;
mod messaging;
mod notifications;
mod orders;
mod products;
mod wishlist;

pub use accounts::{AccountService, Registration};
pub use messaging::MessagingService;
pub use notifications::NotificationService;
pub use orders::OrderService;
pub use products::{ProductQuery, ProductService};
pub use wishlist::WishlistService;

use serde_json::Value;

/// Unwrap a paginated list response (`{"count", "next", "results": [..]}`).
/// Plain arrays pass through; anything else yields an empty list.
pub fn into_items(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
