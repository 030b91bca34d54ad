//! Domain services against the mock backend.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::json;
use unitrade_client::{ApiFailure, MemoryCredentialStore, SessionManager};

use common::{EMAIL, MockBackend, bounded};

#[tokio::test]
async fn test_directory_lookup_works_without_session() {
    let backend = MockBackend::start().await;
    let manager =
        SessionManager::new(backend.config(), Arc::new(MemoryCredentialStore::new())).unwrap();
    let accounts = manager.accounts();

    let universities = bounded(accounts.universities()).await.unwrap();
    assert_eq!(universities.len(), 2);

    let all = bounded(accounts.campuses(None)).await.unwrap();
    assert_eq!(all.len(), 3);

    let legon = bounded(accounts.campuses(Some(1))).await.unwrap();
    let names: Vec<_> = legon.iter().map(|c| c["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["Legon", "Korle Bu"]);
}

#[tokio::test]
async fn test_wishlist_add_list_remove() {
    let backend = MockBackend::start().await;
    let (manager, _store) = backend.signed_in_manager().await;
    let wishlist = manager.wishlist();

    bounded(wishlist.add(7)).await.unwrap();
    bounded(wishlist.add(9)).await.unwrap();

    let entries = bounded(wishlist.list()).await.unwrap();
    let products: Vec<_> = entries.iter().map(|e| e["product"]["id"].as_i64()).collect();
    assert_eq!(products, [Some(7), Some(9)]);

    bounded(wishlist.remove(7)).await.unwrap();
    assert_eq!(*backend.state.wishlist.lock(), vec![9]);

    let err = bounded(wishlist.remove(7)).await.unwrap_err();
    assert!(matches!(err, ApiFailure::ServerError { status: 404, .. }));
}

#[tokio::test]
async fn test_wishlist_refreshes_expired_token() {
    let backend = MockBackend::start().await;
    let (manager, _store) = backend.signed_in_manager().await;
    backend.state.expire_access_tokens();

    bounded(manager.wishlist().add(3)).await.unwrap();

    assert_eq!(backend.state.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*backend.state.wishlist.lock(), vec![3]);
}

#[tokio::test]
async fn test_order_checkout() {
    let backend = MockBackend::start().await;
    let (manager, _store) = backend.signed_in_manager().await;
    let orders = manager.orders();

    let order = bounded(orders.create(json!({
        "items": [{"product": 1, "name": "Casio fx-991ES", "price": "120.00", "quantity": 1}],
        "total": "120.00",
        "payment_method": "paystack",
        "delivery_address": "Commonwealth Hall",
    })))
    .await
    .unwrap();
    let order_id = order["id"].as_i64().unwrap();
    assert_eq!(order["status"], "pending");

    let url = bounded(orders.initialize_payment(120.0, EMAIL, order_id))
        .await
        .unwrap();
    assert!(url.starts_with("https://checkout.paystack.com/"));

    let err = bounded(orders.initialize_payment(120.0, EMAIL, order_id + 1))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ApiFailure::ServerError {
            status: 404,
            message: "Order not found.".into()
        }
    );

    assert_eq!(bounded(orders.list()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_mark_all_notifications_read() {
    let backend = MockBackend::start().await;
    let (manager, _store) = backend.signed_in_manager().await;

    bounded(manager.notifications().mark_all_read()).await.unwrap();
    assert!(backend.state.notifications_cleared.load(Ordering::SeqCst));
}
