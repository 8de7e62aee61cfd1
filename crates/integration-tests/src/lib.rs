//! Integration tests for the Soko storefront client.
//!
//! The tests drive the real [`AppState`] against [`StubBackend`], an
//! in-process marketplace API served by axum on an ephemeral port. The stub
//! speaks the same envelope format as the production API and keeps just
//! enough state to exercise auth, catalog, checkout, payments and orders.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p soko-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `auth_session` - login, token refresh and session expiry
//! - `catalog_cart` - catalog caching and cart stock rules
//! - `checkout_flow` - the checkout wizard through M-Pesa confirmation
//! - `orders` - cancellation, payment retry and card verification

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

use soko_core::{
    AddressId, CategoryId, DeliveryZoneId, Email, Money, OrderId, OrderStatus, PaymentMethod,
    PaymentStatus, ProductId, UserId,
};
use soko_storefront::api::types::{
    Address, Category, DeliveryZone, Order, OrderItem, Pagination, Product, ProductPage, User,
};
use soko_storefront::config::StorefrontConfig;
use soko_storefront::services::payments::PollConfig;
use soko_storefront::state::AppState;
use soko_storefront::storage::LocalStore;
use soko_storefront::StorefrontError;

/// Email of the seeded customer.
pub const CUSTOMER_EMAIL: &str = "wanjiku@example.com";
/// Password of the seeded customer.
pub const CUSTOMER_PASSWORD: &str = "karibu-sana-2024";

/// Poll budget used by clients built from the stub: fast enough for tests.
pub const TEST_POLL: PollConfig = PollConfig::new(10, Duration::from_millis(20));

// =============================================================================
// Stub State
// =============================================================================

/// How many times the stub served selected endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub refresh: u32,
    pub product_lists: u32,
    pub product_gets: u32,
    pub orders_created: u32,
    pub cancels: u32,
    pub status_checks: u32,
}

/// Mutable state behind the stub API. Tests adjust it between requests.
#[derive(Debug)]
pub struct StubData {
    pub user: User,
    pub password: String,
    pub products: Vec<Product>,
    pub categories: Vec<Category>,
    pub addresses: Vec<Address>,
    pub zones: Vec<DeliveryZone>,
    pub orders: Vec<Order>,
    /// Access tokens the stub accepts.
    pub access_tokens: HashSet<String>,
    /// Access tokens answered with a `TOKEN_EXPIRED` 401.
    pub expired_tokens: HashSet<String>,
    pub refresh_tokens: HashSet<String>,
    /// When false, every refresh is rejected.
    pub refresh_enabled: bool,
    /// When true, refreshed access tokens are already expired.
    pub refreshed_tokens_expire: bool,
    /// When false, STK push requests fail with 503.
    pub mpesa_available: bool,
    /// Statuses returned by successive status checks; `pending` once empty.
    pub payment_script: VecDeque<PaymentStatus>,
    /// `(order, phone)` of every STK push requested.
    pub mpesa_requests: Vec<(OrderId, String)>,
    pub calls: CallCounts,
    issued: u32,
}

impl StubData {
    fn seeded() -> Self {
        Self {
            user: User {
                id: UserId::new(1),
                name: "Wanjiku Kamau".to_string(),
                email: Email::parse(CUSTOMER_EMAIL).expect("seed email is valid"),
                phone: Some("0712345678".to_string()),
                role: Some("customer".to_string()),
            },
            password: CUSTOMER_PASSWORD.to_string(),
            products: vec![
                product(1, "Solar Lantern", 2_500, 10),
                product(2, "Maasai Shuka", 1_800, 3),
                product(3, "Jiko Cookstove", 4_200, 0),
            ],
            categories: vec![Category {
                id: CategoryId::new(1),
                name: "Home & Living".to_string(),
                slug: Some("home-living".to_string()),
                product_count: Some(3),
            }],
            addresses: vec![
                address(7, "Home", "Kilimani", true, Some(2)),
                address(8, "Office", "Upper Hill", false, None),
            ],
            zones: vec![
                zone(1, "Nairobi CBD", 200),
                zone(2, "Nairobi Suburbs", 350),
            ],
            orders: Vec::new(),
            access_tokens: HashSet::new(),
            expired_tokens: HashSet::new(),
            refresh_tokens: HashSet::new(),
            refresh_enabled: true,
            refreshed_tokens_expire: false,
            mpesa_available: true,
            payment_script: VecDeque::new(),
            mpesa_requests: Vec::new(),
            calls: CallCounts::default(),
            issued: 0,
        }
    }

    fn issue_tokens(&mut self) -> (String, String) {
        self.issued += 1;
        let access = format!("access-{}", self.issued);
        let refresh = format!("refresh-{}", self.issued);
        self.access_tokens.insert(access.clone());
        self.refresh_tokens.insert(refresh.clone());
        (access, refresh)
    }

    fn order_mut(&mut self, id: i64) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.id == OrderId::new(id))
    }

    /// Set a product's stock level.
    pub fn set_stock(&mut self, id: i64, stock: u32) {
        if let Some(product) = self.products.iter_mut().find(|p| p.id == ProductId::new(id)) {
            product.stock_quantity = stock;
        }
    }

    /// Move an order along the fulfilment pipeline.
    pub fn set_order_status(&mut self, id: i64, status: OrderStatus) {
        if let Some(order) = self.order_mut(id) {
            order.status = status;
        }
    }
}

fn product(id: i64, name: &str, price: i64, stock: u32) -> Product {
    Product {
        id: ProductId::new(id),
        name: name.to_string(),
        description: None,
        price: Money::from_shillings(price),
        original_price: None,
        stock_quantity: stock,
        category_id: Some(CategoryId::new(1)),
        category_name: Some("Home & Living".to_string()),
        brand: None,
        image_url: None,
    }
}

fn address(id: i64, label: &str, street: &str, is_default: bool, zone: Option<i64>) -> Address {
    Address {
        id: AddressId::new(id),
        label: Some(label.to_string()),
        recipient_name: "Wanjiku Kamau".to_string(),
        phone: "0712345678".to_string(),
        county: "Nairobi".to_string(),
        town: "Nairobi".to_string(),
        street: street.to_string(),
        building: None,
        delivery_zone_id: zone.map(DeliveryZoneId::new),
        is_default,
    }
}

fn zone(id: i64, name: &str, fee: i64) -> DeliveryZone {
    DeliveryZone {
        id: DeliveryZoneId::new(id),
        name: name.to_string(),
        fee: Money::from_shillings(fee),
        estimated_days: Some("1-2 days".to_string()),
    }
}

type Shared = Arc<Mutex<StubData>>;

fn lock(shared: &Shared) -> MutexGuard<'_, StubData> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// StubBackend
// =============================================================================

/// A marketplace API running on `127.0.0.1` for the lifetime of the value.
pub struct StubBackend {
    addr: SocketAddr,
    data: Shared,
    server: JoinHandle<()>,
}

impl StubBackend {
    /// Bind an ephemeral port and start serving the seeded catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> std::io::Result<Self> {
        let data: Shared = Arc::new(Mutex::new(StubData::seeded()));
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = router(data.clone());
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, data, server })
    }

    /// Base URL of the API, ending in `/api/`.
    ///
    /// # Panics
    ///
    /// Panics if the bound address does not form a URL, which cannot happen
    /// for a socket address.
    #[must_use]
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/api/", self.addr)).expect("socket address is a valid host")
    }

    /// Client configuration pointing at the stub with a fast poll budget.
    #[must_use]
    pub fn config(&self) -> StorefrontConfig {
        let mut config = StorefrontConfig::new(self.base_url(), PathBuf::from("unused"));
        config.request_timeout = Duration::from_secs(5);
        config.payment_poll = TEST_POLL;
        config
    }

    /// A fresh client over in-memory storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built.
    pub fn app_state(&self) -> Result<AppState, StorefrontError> {
        AppState::with_store(self.config(), LocalStore::in_memory())
    }

    /// A fresh client already logged in as the seeded customer.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built or login fails.
    pub async fn logged_in_state(&self) -> Result<AppState, StorefrontError> {
        let state = self.app_state()?;
        state.auth().login(CUSTOMER_EMAIL, CUSTOMER_PASSWORD).await?;
        Ok(state)
    }

    /// Lock the stub's state for inspection or adjustment.
    pub fn data(&self) -> MutexGuard<'_, StubData> {
        lock(&self.data)
    }

    /// Snapshot of the endpoint call counters.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.data().calls
    }

    /// Make every access token issued so far expired.
    pub fn expire_access_tokens(&self) {
        let mut data = self.data();
        let tokens: Vec<String> = data.access_tokens.drain().collect();
        data.expired_tokens.extend(tokens);
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn router(data: Shared) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/me", get(me))
        .route("/api/auth/profile", put(update_profile))
        .route("/api/products", get(list_products))
        .route("/api/products/{id}", get(get_product))
        .route("/api/categories", get(list_categories))
        .route("/api/addresses", get(list_addresses))
        .route("/api/delivery-zones", get(list_zones))
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/cancel", put(cancel_order))
        .route("/api/payments/mpesa/initiate", post(initiate_mpesa))
        .route("/api/payments/status/{id}", get(payment_status))
        .route("/api/payments/card/initiate", post(initiate_card))
        .route("/api/payments/card/verify", post(verify_card))
        .with_state(data)
}

// =============================================================================
// Responses
// =============================================================================

fn ok<T: Serialize>(data: T) -> Response {
    Json(json!({ "success": true, "data": data })).into_response()
}

fn fail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

/// Check the bearer token the way the production API does.
fn authorize(data: &StubData, headers: &HeaderMap) -> Result<(), Response> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(t) if data.access_tokens.contains(t) => Ok(()),
        Some(t) if data.expired_tokens.contains(t) => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "success": false,
                "message": "Token expired",
                "code": "TOKEN_EXPIRED"
            })),
        )
            .into_response()),
        _ => Err(fail(StatusCode::UNAUTHORIZED, "Invalid token")),
    }
}

// =============================================================================
// Auth Handlers
// =============================================================================

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

async fn login(State(shared): State<Shared>, Json(body): Json<Credentials>) -> Response {
    let mut data = lock(&shared);
    if !body.email.eq_ignore_ascii_case(data.user.email.as_str()) || body.password != data.password
    {
        return fail(StatusCode::UNAUTHORIZED, "Invalid email or password");
    }
    let (token, refresh_token) = data.issue_tokens();
    ok(json!({ "user": data.user, "token": token, "refresh_token": refresh_token }))
}

#[derive(Deserialize)]
struct Registration {
    name: String,
    email: String,
    phone: String,
    password: String,
}

async fn register(State(shared): State<Shared>, Json(body): Json<Registration>) -> Response {
    let mut data = lock(&shared);
    let Ok(email) = Email::parse(&body.email) else {
        return fail(StatusCode::BAD_REQUEST, "Invalid email address");
    };
    if email == data.user.email {
        return fail(StatusCode::CONFLICT, "Email is already registered");
    }
    data.user = User {
        id: UserId::new(2),
        name: body.name,
        email,
        phone: Some(body.phone),
        role: Some("customer".to_string()),
    };
    data.password = body.password;
    let (token, refresh_token) = data.issue_tokens();
    (
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": { "user": data.user, "token": token, "refresh_token": refresh_token }
        })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh_token: String,
}

async fn refresh(State(shared): State<Shared>, Json(body): Json<RefreshBody>) -> Response {
    let mut data = lock(&shared);
    data.calls.refresh += 1;
    if !data.refresh_enabled || !data.refresh_tokens.remove(&body.refresh_token) {
        return fail(StatusCode::UNAUTHORIZED, "Invalid refresh token");
    }
    let (token, refresh_token) = data.issue_tokens();
    if data.refreshed_tokens_expire {
        data.access_tokens.remove(&token);
        data.expired_tokens.insert(token.clone());
    }
    ok(json!({ "token": token, "refresh_token": refresh_token }))
}

async fn me(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let data = lock(&shared);
    if let Err(denied) = authorize(&data, &headers) {
        return denied;
    }
    ok(&data.user)
}

#[derive(Deserialize)]
struct ProfileBody {
    name: Option<String>,
    phone: Option<String>,
}

async fn update_profile(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<ProfileBody>,
) -> Response {
    let mut data = lock(&shared);
    if let Err(denied) = authorize(&data, &headers) {
        return denied;
    }
    if let Some(name) = body.name {
        data.user.name = name;
    }
    if let Some(phone) = body.phone {
        data.user.phone = Some(phone);
    }
    ok(&data.user)
}

// =============================================================================
// Catalog Handlers
// =============================================================================

#[derive(Deserialize)]
struct ProductFilters {
    search: Option<String>,
    category: Option<i64>,
}

async fn list_products(
    State(shared): State<Shared>,
    Query(filters): Query<ProductFilters>,
) -> Response {
    let mut data = lock(&shared);
    data.calls.product_lists += 1;

    let needle = filters.search.map(|s| s.to_lowercase());
    let products: Vec<Product> = data
        .products
        .iter()
        .filter(|p| {
            needle
                .as_deref()
                .is_none_or(|n| p.name.to_lowercase().contains(n))
        })
        .filter(|p| {
            filters
                .category
                .is_none_or(|c| p.category_id == Some(CategoryId::new(c)))
        })
        .cloned()
        .collect();

    let total = u64::try_from(products.len()).unwrap_or(u64::MAX);
    ok(ProductPage {
        pagination: Pagination {
            page: 1,
            limit: 20,
            total,
            total_pages: 1,
        },
        products,
    })
}

async fn get_product(State(shared): State<Shared>, Path(id): Path<i64>) -> Response {
    let mut data = lock(&shared);
    data.calls.product_gets += 1;
    match data.products.iter().find(|p| p.id == ProductId::new(id)) {
        Some(product) => ok(product),
        None => fail(StatusCode::NOT_FOUND, "Product not found"),
    }
}

async fn list_categories(State(shared): State<Shared>) -> Response {
    ok(&lock(&shared).categories)
}

async fn list_addresses(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let data = lock(&shared);
    if let Err(denied) = authorize(&data, &headers) {
        return denied;
    }
    ok(&data.addresses)
}

async fn list_zones(State(shared): State<Shared>) -> Response {
    ok(&lock(&shared).zones)
}

// =============================================================================
// Order Handlers
// =============================================================================

#[derive(Deserialize)]
struct OrderLine {
    product_id: i64,
    quantity: u32,
}

#[derive(Deserialize)]
struct NewOrder {
    items: Vec<OrderLine>,
    address_id: i64,
    payment_method: PaymentMethod,
}

async fn create_order(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<NewOrder>,
) -> Response {
    let mut data = lock(&shared);
    if let Err(denied) = authorize(&data, &headers) {
        return denied;
    }
    if body.items.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "Order has no items");
    }

    let Some(address) = data
        .addresses
        .iter()
        .find(|a| a.id == AddressId::new(body.address_id))
        .cloned()
    else {
        return fail(StatusCode::BAD_REQUEST, "Address not found");
    };

    let mut items = Vec::with_capacity(body.items.len());
    for line in &body.items {
        let Some(product) = data
            .products
            .iter()
            .find(|p| p.id == ProductId::new(line.product_id))
        else {
            return fail(StatusCode::BAD_REQUEST, "Product not found");
        };
        if line.quantity > product.stock_quantity {
            let message = format!("Insufficient stock for {}", product.name);
            return fail(StatusCode::BAD_REQUEST, &message);
        }
        items.push(OrderItem {
            product_id: product.id,
            product_name: product.name.clone(),
            quantity: line.quantity,
            price: product.price,
        });
    }
    for item in &items {
        if let Some(product) = data.products.iter_mut().find(|p| p.id == item.product_id) {
            product.stock_quantity -= item.quantity;
        }
    }

    let delivery_fee = address
        .delivery_zone_id
        .and_then(|id| data.zones.iter().find(|z| z.id == id))
        .map_or(Money::ZERO, |z| z.fee);
    let subtotal: Money = items.iter().map(OrderItem::line_total).sum();

    data.calls.orders_created += 1;
    let id = 100 + i64::from(data.calls.orders_created);
    let order = Order {
        id: OrderId::new(id),
        order_number: Some(format!("SK-{id}")),
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        payment_method: Some(body.payment_method),
        items,
        subtotal,
        delivery_fee,
        total: subtotal + delivery_fee,
        address: Some(address),
        tracking_number: None,
        created_at: None,
    };
    data.orders.push(order.clone());
    (
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": order })),
    )
        .into_response()
}

async fn list_orders(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let data = lock(&shared);
    if let Err(denied) = authorize(&data, &headers) {
        return denied;
    }
    let newest_first: Vec<&Order> = data.orders.iter().rev().collect();
    ok(newest_first)
}

async fn get_order(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut data = lock(&shared);
    if let Err(denied) = authorize(&data, &headers) {
        return denied;
    }
    match data.order_mut(id) {
        Some(order) => ok(&*order),
        None => fail(StatusCode::NOT_FOUND, "Order not found"),
    }
}

async fn cancel_order(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut data = lock(&shared);
    if let Err(denied) = authorize(&data, &headers) {
        return denied;
    }
    data.calls.cancels += 1;
    let Some(order) = data.order_mut(id) else {
        return fail(StatusCode::NOT_FOUND, "Order not found");
    };
    if !order.status.is_cancellable() {
        return fail(StatusCode::BAD_REQUEST, "Order can no longer be cancelled");
    }
    order.status = OrderStatus::Cancelled;
    if order.payment_status != PaymentStatus::Completed {
        order.payment_status = PaymentStatus::Cancelled;
    }
    ok(&*order)
}

// =============================================================================
// Payment Handlers
// =============================================================================

#[derive(Deserialize)]
struct StkPush {
    order_id: i64,
    phone_number: String,
}

async fn initiate_mpesa(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<StkPush>,
) -> Response {
    let mut data = lock(&shared);
    if let Err(denied) = authorize(&data, &headers) {
        return denied;
    }
    data.mpesa_requests
        .push((OrderId::new(body.order_id), body.phone_number));
    if !data.mpesa_available {
        return fail(
            StatusCode::SERVICE_UNAVAILABLE,
            "M-Pesa service is temporarily unavailable",
        );
    }
    if data.order_mut(body.order_id).is_none() {
        return fail(StatusCode::NOT_FOUND, "Order not found");
    }
    ok(json!({
        "checkout_request_id": format!("ws_CO_{}", body.order_id),
        "customer_message": "Success. Request accepted for processing"
    }))
}

async fn payment_status(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut data = lock(&shared);
    if let Err(denied) = authorize(&data, &headers) {
        return denied;
    }
    data.calls.status_checks += 1;
    let status = data.payment_script.pop_front().unwrap_or_default();
    if let Some(order) = data.order_mut(id) {
        order.payment_status = status;
        if status == PaymentStatus::Completed {
            order.status = OrderStatus::Confirmed;
        }
    }
    let receipt = (status == PaymentStatus::Completed).then(|| format!("QK{id}XYZ"));
    ok(json!({ "status": status, "mpesa_receipt": receipt }))
}

#[derive(Deserialize)]
struct CardCheckout {
    order_id: i64,
}

async fn initiate_card(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<CardCheckout>,
) -> Response {
    let data = lock(&shared);
    if let Err(denied) = authorize(&data, &headers) {
        return denied;
    }
    let reference = format!("SOKO-{}", body.order_id);
    ok(json!({
        "authorization_url": format!("https://pay.example.test/checkout/{reference}"),
        "reference": reference
    }))
}

#[derive(Deserialize)]
struct CardReference {
    reference: String,
}

async fn verify_card(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<CardReference>,
) -> Response {
    let mut data = lock(&shared);
    if let Err(denied) = authorize(&data, &headers) {
        return denied;
    }
    let id = body
        .reference
        .strip_prefix("SOKO-")
        .and_then(|id| id.parse::<i64>().ok());
    let Some(order) = id.and_then(|id| data.order_mut(id)) else {
        return fail(StatusCode::NOT_FOUND, "Unknown payment reference");
    };
    order.payment_status = PaymentStatus::Completed;
    order.status = OrderStatus::Confirmed;
    ok(json!({
        "order_id": order.id,
        "status": order.payment_status,
        "message": "Payment verified"
    }))
}
