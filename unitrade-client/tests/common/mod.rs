//! In-process mock of the storefront backend.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use unitrade_client::credentials::{MemoryCredentialStore, StoredCredentials};
use unitrade_client::session::Token;
use unitrade_client::{ClientConfig, SessionManager, UserProfile};

pub const EMAIL: &str = "ama@st.ug.edu.gh";
pub const PASSWORD: &str = "correct-horse";
pub const LOGOUT_PATH: &str = "/users/logout/";

pub fn user_json() -> Value {
    json!({"id": 42, "email": EMAIL, "first_name": "Ama", "last_name": "Owusu"})
}

pub struct MockState {
    access_tokens: Mutex<HashSet<String>>,
    refresh_tokens: Mutex<HashSet<String>>,
    next_token: AtomicU64,

    /// Rotate the refresh token on every refresh.
    pub rotate_refresh: AtomicBool,
    /// Park refresh calls until [`MockState::release_refresh`].
    hold_refresh: AtomicBool,
    refresh_gate: Semaphore,
    /// Delay before answering the product listing.
    pub products_delay_ms: AtomicU64,
    /// Answer logout and push-token removal with 500.
    pub fail_logout: AtomicBool,

    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub products_calls: AtomicUsize,
    pub always_401_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub push_saved: Mutex<Vec<String>>,
    pub push_removed: Mutex<Vec<String>>,
    pub wishlist: Mutex<Vec<i64>>,
    pub orders: Mutex<Vec<Value>>,
    pub notifications_cleared: AtomicBool,
}

impl MockState {
    fn new() -> Self {
        Self {
            access_tokens: Mutex::default(),
            refresh_tokens: Mutex::default(),
            next_token: AtomicU64::new(1),
            rotate_refresh: AtomicBool::new(false),
            hold_refresh: AtomicBool::new(false),
            refresh_gate: Semaphore::new(0),
            products_delay_ms: AtomicU64::new(0),
            fail_logout: AtomicBool::new(false),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            products_calls: AtomicUsize::new(0),
            always_401_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            push_saved: Mutex::default(),
            push_removed: Mutex::default(),
            wishlist: Mutex::default(),
            orders: Mutex::default(),
            notifications_cleared: AtomicBool::new(false),
        }
    }

    fn mint(&self, kind: &str) -> String {
        format!("{kind}-{}", self.next_token.fetch_add(1, Ordering::SeqCst))
    }

    /// Issue a valid token pair, as a successful login would.
    pub fn issue_session(&self) -> (String, String) {
        let access = self.mint("access");
        let refresh = self.mint("refresh");
        self.access_tokens.lock().insert(access.clone());
        self.refresh_tokens.lock().insert(refresh.clone());
        (access, refresh)
    }

    /// Every access token issued so far stops being accepted.
    pub fn expire_access_tokens(&self) {
        self.access_tokens.lock().clear();
    }

    pub fn revoke_refresh_tokens(&self) {
        self.refresh_tokens.lock().clear();
    }

    pub fn is_access_valid(&self, token: &str) -> bool {
        self.access_tokens.lock().contains(token)
    }

    pub fn hold_refresh(&self) {
        self.hold_refresh.store(true, Ordering::SeqCst);
    }

    /// Let one parked (or the next) refresh call through.
    pub fn release_refresh(&self) {
        self.refresh_gate.add_permits(1);
    }

    fn bearer(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        self.bearer(headers)
            .is_some_and(|token| self.is_access_valid(&token))
    }
}

fn token_not_valid() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "detail": "Given token not valid for any token type",
            "code": "token_not_valid",
        })),
    )
        .into_response()
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.login_calls.fetch_add(1, Ordering::SeqCst);
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();

    if email.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"email": ["This field is required."]})),
        )
            .into_response();
    }
    if email != EMAIL || password != PASSWORD {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "Invalid email or password.",
                "code": "invalid_credentials",
            })),
        )
            .into_response();
    }

    let (access, refresh) = state.issue_session();
    Json(json!({
        "success": true,
        "access": access,
        "refresh": refresh,
        "user": user_json(),
    }))
    .into_response()
}

async fn token_refresh(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if state.hold_refresh.load(Ordering::SeqCst) {
        if let Ok(permit) = state.refresh_gate.acquire().await {
            permit.forget();
        }
    }

    let refresh = body.get("refresh").and_then(Value::as_str).unwrap_or_default();
    if !state.refresh_tokens.lock().contains(refresh) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token is invalid or expired", "code": "token_not_valid"})),
        )
            .into_response();
    }

    let access = state.mint("access");
    state.access_tokens.lock().insert(access.clone());

    if state.rotate_refresh.load(Ordering::SeqCst) {
        let rotated = state.mint("refresh");
        let mut refresh_tokens = state.refresh_tokens.lock();
        refresh_tokens.remove(refresh);
        refresh_tokens.insert(rotated.clone());
        return Json(json!({"access": access, "refresh": rotated})).into_response();
    }
    Json(json!({"access": access})).into_response()
}

async fn me(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return token_not_valid();
    }
    Json(json!({"success": true, "user": user_json()})).into_response()
}

async fn update_profile(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return token_not_valid();
    }
    if body.get("phone_number").and_then(Value::as_str) == Some("") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"phone_number": ["This field may not be blank."]})),
        )
            .into_response();
    }
    let mut user = user_json();
    if let (Value::Object(user), Value::Object(fields)) = (&mut user, body) {
        user.extend(fields);
    }
    Json(json!({"success": true, "user": user})).into_response()
}

async fn products(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.products_calls.fetch_add(1, Ordering::SeqCst);
    let delay = state.products_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if !state.authorized(&headers) {
        return token_not_valid();
    }
    Json(json!({
        "count": 2,
        "next": null,
        "previous": null,
        "results": [
            {"id": 1, "name": "Casio fx-991ES", "price": "120.00"},
            {"id": 2, "name": "Mini fridge", "price": "850.00"},
        ],
    }))
    .into_response()
}

async fn always_401(State(state): State<Arc<MockState>>) -> Response {
    state.always_401_calls.fetch_add(1, Ordering::SeqCst);
    token_not_valid()
}

async fn save_push_token(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return token_not_valid();
    }
    let token = body.get("token").and_then(Value::as_str).unwrap_or_default();
    state.push_saved.lock().push(token.to_string());
    Json(json!({"success": true, "message": "Push token saved successfully"})).into_response()
}

async fn remove_push_token(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    if state.fail_logout.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let token = body.get("token").and_then(Value::as_str).unwrap_or_default();
    state.push_removed.lock().push(token.to_string());
    Json(json!({"success": true})).into_response()
}

async fn logout(State(state): State<Arc<MockState>>) -> Response {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    if state.fail_logout.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream unavailable").into_response();
    }
    StatusCode::RESET_CONTENT.into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response()
}

fn paginated(results: Vec<Value>) -> Response {
    Json(json!({
        "count": results.len(),
        "next": null,
        "previous": null,
        "results": results,
    }))
    .into_response()
}

async fn universities() -> Response {
    paginated(vec![
        json!({"id": 1, "name": "University of Ghana"}),
        json!({"id": 2, "name": "KNUST"}),
    ])
}

async fn campuses(Query(params): Query<HashMap<String, String>>) -> Response {
    let all = vec![
        json!({"id": 10, "name": "Legon", "university": 1}),
        json!({"id": 11, "name": "Korle Bu", "university": 1}),
        json!({"id": 20, "name": "Kumasi", "university": 2}),
    ];
    let results = match params.get("university_id").and_then(|id| id.parse::<i64>().ok()) {
        Some(university) => all
            .into_iter()
            .filter(|campus| campus["university"] == university)
            .collect(),
        None => all,
    };
    paginated(results)
}

async fn wishlist(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return token_not_valid();
    }
    let entries = state
        .wishlist
        .lock()
        .iter()
        .map(|id| json!({"id": id * 100, "product": {"id": id}}))
        .collect();
    paginated(entries)
}

async fn add_to_wishlist(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return token_not_valid();
    }
    let Some(product_id) = body.get("product_id").and_then(Value::as_i64) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"product_id": ["This field is required."]})),
        )
            .into_response();
    };
    state.wishlist.lock().push(product_id);
    (
        StatusCode::CREATED,
        Json(json!({"id": product_id * 100, "product": {"id": product_id}})),
    )
        .into_response()
}

async fn remove_from_wishlist(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(product_id): Path<i64>,
) -> Response {
    if !state.authorized(&headers) {
        return token_not_valid();
    }
    let mut wishlist = state.wishlist.lock();
    let before = wishlist.len();
    wishlist.retain(|id| *id != product_id);
    if wishlist.len() == before {
        return not_found();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn orders(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return token_not_valid();
    }
    paginated(state.orders.lock().clone())
}

async fn create_order(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return token_not_valid();
    }
    let mut orders = state.orders.lock();
    body["id"] = json!(orders.len() + 1);
    body["status"] = json!("pending");
    body["paystack_reference"] = json!(format!("UT-{}", orders.len() + 1));
    orders.push(body.clone());
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn paystack_init(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return token_not_valid();
    }
    let order_id = body.get("order_id").and_then(Value::as_i64);
    if body.get("amount").is_none() || body.get("email").is_none() || order_id.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "amount, email, and order_id are required."})),
        )
            .into_response();
    }
    let exists = state
        .orders
        .lock()
        .iter()
        .any(|order| order["id"].as_i64() == order_id);
    if !exists {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Order not found."}))).into_response();
    }
    Json(json!({"authorization_url": "https://checkout.paystack.com/ut-test"})).into_response()
}

async fn mark_all_notifications_read(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return token_not_valid();
    }
    state.notifications_cleared.store(true, Ordering::SeqCst);
    Json(json!({"success": true})).into_response()
}

pub struct MockBackend {
    pub state: Arc<MockState>,
    pub base_url: String,
    server: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::new());

        let api = Router::new()
            .route("/users/login/", post(login))
            .route("/users/token/refresh/", post(token_refresh))
            .route("/users/me/", get(me))
            .route("/users/profile/", put(update_profile))
            .route("/users/push-tokens/", post(save_push_token))
            .route("/users/push-tokens/remove/", post(remove_push_token))
            .route("/users/logout/", post(logout))
            .route("/users/universities/", get(universities))
            .route("/users/campuses/", get(campuses))
            .route("/users/wishlist/", get(wishlist).post(add_to_wishlist))
            .route("/users/wishlist/{product_id}/", delete(remove_from_wishlist))
            .route(
                "/users/notifications/mark-all-read/",
                post(mark_all_notifications_read),
            )
            .route("/orders/", get(orders).post(create_order))
            .route("/orders/paystack-init/", post(paystack_init))
            .route("/products/", get(products))
            .route("/always-401/", get(always_401))
            .with_state(Arc::clone(&state));
        let app = Router::new().nest("/api", api);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            base_url: format!("http://{addr}/api"),
            server,
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            api_base_url: self.base_url.clone(),
            request_timeout_ms: 5_000,
            logout_path: Some(LOGOUT_PATH.to_string()),
            ..ClientConfig::default()
        }
    }

    /// A manager restored from a store that already holds a valid session.
    pub async fn signed_in_manager(&self) -> (SessionManager, Arc<MemoryCredentialStore>) {
        self.signed_in_manager_with(self.config()).await
    }

    pub async fn signed_in_manager_with(
        &self,
        config: ClientConfig,
    ) -> (SessionManager, Arc<MemoryCredentialStore>) {
        let (access, refresh) = self.state.issue_session();
        let store = Arc::new(MemoryCredentialStore::with_credentials(StoredCredentials::new(
            Token::new(access),
            Some(Token::new(refresh)),
            Some(UserProfile::new(user_json())),
        )));
        let manager = SessionManager::new(config, store.clone()).unwrap();
        manager.hydrate().await.unwrap();
        (manager, store)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Poll `condition` until it holds; panics after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Await `fut` with a generous upper bound so a hung test fails instead.
pub async fn bounded<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("operation did not complete in time")
}
