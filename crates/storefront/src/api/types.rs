//! Request and response types for the marketplace API.
//!
//! Every payload the client reads is decoded into one of these types at the
//! HTTP boundary. A response that does not match its schema is a decode
//! error, never a partially trusted value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use soko_core::{
    AddressId, CategoryId, DeliveryZoneId, Email, Money, OrderId, OrderStatus, PaymentMethod,
    PaymentStatus, ProductId, UserId,
};

// =============================================================================
// Envelope
// =============================================================================

/// Standard response wrapper: `{ "success": true, "data": ..., "message": ... }`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: Option<bool>,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body returned with non-success status codes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    /// Machine-readable error code, e.g. `TOKEN_EXPIRED`.
    #[serde(default)]
    pub code: Option<String>,
}

impl ErrorBody {
    /// Whether the server is telling us the access token expired.
    #[must_use]
    pub fn signals_expiry(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| code.eq_ignore_ascii_case("TOKEN_EXPIRED"))
            || self
                .message
                .as_deref()
                .is_some_and(|message| message.to_ascii_lowercase().contains("expired"))
    }
}

// =============================================================================
// Auth Types
// =============================================================================

/// A marketplace customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    /// Phone as stored by the server; parse with `PhoneNumber` before use.
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Body for `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Body for `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub password: &'a str,
}

/// Body for `POST /auth/refresh`.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Session issued by login and registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Tokens issued by `POST /auth/refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub token: String,
    /// Present when the server rotates refresh tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Body for `PUT /auth/profile`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

// =============================================================================
// Catalog Types
// =============================================================================

/// A product in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Money,
    /// Price before discount, when the product is on offer.
    #[serde(default)]
    pub original_price: Option<Money>,
    pub stock_quantity: u32,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Product {
    /// Whether at least one unit can be ordered.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock_quantity > 0
    }
}

/// Pagination metadata for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

/// A page of products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub pagination: Pagination,
}

/// Sort order for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductSort {
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl ProductSort {
    /// Wire value used by the API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::PriceAsc => "price_asc",
            Self::PriceDesc => "price_desc",
            Self::Name => "name",
        }
    }
}

/// Filters for `GET /products`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub category: Option<CategoryId>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    pub sort: Option<ProductSort>,
}

impl ProductQuery {
    /// Query-string pairs, omitting unset filters.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        if let Some(category) = self.category {
            pairs.push(("category", category.to_string()));
        }
        if let Some(min) = self.min_price {
            pairs.push(("min_price", min.amount().to_string()));
        }
        if let Some(max) = self.max_price {
            pairs.push(("max_price", max.amount().to_string()));
        }
        if let Some(sort) = self.sort {
            pairs.push(("sort", sort.as_str().to_string()));
        }
        pairs
    }

    /// Whether this is a free-text search (search results are not cached).
    #[must_use]
    pub fn is_search(&self) -> bool {
        self.search.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub product_count: Option<u32>,
}

// =============================================================================
// Address & Delivery Types
// =============================================================================

/// A saved delivery address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    #[serde(default)]
    pub label: Option<String>,
    pub recipient_name: String,
    pub phone: String,
    pub county: String,
    pub town: String,
    pub street: String,
    #[serde(default)]
    pub building: Option<String>,
    #[serde(default)]
    pub delivery_zone_id: Option<DeliveryZoneId>,
    #[serde(default)]
    pub is_default: bool,
}

impl Address {
    /// One-line summary for lists.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![self.street.as_str()];
        if let Some(building) = self.building.as_deref() {
            parts.push(building);
        }
        parts.push(self.town.as_str());
        parts.push(self.county.as_str());
        format!("{} - {}", self.recipient_name, parts.join(", "))
    }
}

/// Body for creating or updating an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub recipient_name: String,
    pub phone: String,
    pub county: String,
    pub town: String,
    pub street: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_zone_id: Option<DeliveryZoneId>,
    pub is_default: bool,
}

/// A server-defined delivery pricing tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryZone {
    pub id: DeliveryZoneId,
    pub name: String,
    pub fee: Money,
    #[serde(default)]
    pub estimated_days: Option<String>,
}

// =============================================================================
// Order Types
// =============================================================================

/// One product line in an order request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderItemInput {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Body for `POST /orders`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemInput>,
    pub address_id: AddressId,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A product line on a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub price: Money,
}

impl OrderItem {
    /// Price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.price * self.quantity
    }
}

/// An order as the server reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub order_number: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    #[serde(default)]
    pub delivery_fee: Money,
    pub total: Money,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Human reference: the order number when assigned, else `#id`.
    #[must_use]
    pub fn reference(&self) -> String {
        self.order_number
            .clone()
            .unwrap_or_else(|| format!("#{}", self.id))
    }
}

// =============================================================================
// Payment Types
// =============================================================================

/// Body for `POST /payments/mpesa/initiate`.
#[derive(Debug, Clone, Serialize)]
pub struct MpesaInitiateRequest<'a> {
    pub order_id: OrderId,
    pub phone_number: &'a str,
}

/// Result of an STK push request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MpesaInitiateResponse {
    pub checkout_request_id: String,
    #[serde(default)]
    pub customer_message: Option<String>,
}

/// Body of `GET /payments/status/{orderId}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentStatusResponse {
    pub status: PaymentStatus,
    #[serde(default)]
    pub mpesa_receipt: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body for `POST /payments/card/initiate`.
#[derive(Debug, Clone, Serialize)]
pub struct CardInitiateRequest<'a> {
    pub order_id: OrderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<&'a str>,
}

/// Hosted payment page for a card payment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CardInitiateResponse {
    pub authorization_url: String,
    pub reference: String,
}

/// Body for `POST /payments/card/verify`.
#[derive(Debug, Clone, Serialize)]
pub struct CardVerifyRequest<'a> {
    pub reference: &'a str,
}

/// Verification result for a card payment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CardVerifyResponse {
    pub order_id: OrderId,
    pub status: PaymentStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expiry_signal() {
        let by_code = ErrorBody {
            message: None,
            code: Some("TOKEN_EXPIRED".to_string()),
        };
        let by_message = ErrorBody {
            message: Some("jwt expired".to_string()),
            code: None,
        };
        let other = ErrorBody {
            message: Some("Invalid token".to_string()),
            code: Some("INVALID_TOKEN".to_string()),
        };
        assert!(by_code.signals_expiry());
        assert!(by_message.signals_expiry());
        assert!(!other.signals_expiry());
        assert!(!ErrorBody::default().signals_expiry());
    }

    #[test]
    fn test_product_query_pairs_skip_unset() {
        let query = ProductQuery {
            page: Some(2),
            search: Some("  ".to_string()),
            category: Some(CategoryId::new(4)),
            sort: Some(ProductSort::PriceAsc),
            ..ProductQuery::default()
        };
        assert_eq!(
            query.to_pairs(),
            vec![
                ("page", "2".to_string()),
                ("category", "4".to_string()),
                ("sort", "price_asc".to_string()),
            ]
        );
        assert!(!query.is_search());
    }

    #[test]
    fn test_product_decodes_string_prices() {
        let product: Product = serde_json::from_value(json!({
            "id": 3,
            "name": "Solar Inverter 3kVA",
            "price": "45999.00",
            "stock_quantity": 4
        }))
        .unwrap();
        assert_eq!(product.price, Money::from_shillings(45_999));
        assert!(product.in_stock());
        assert!(product.image_url.is_none());
    }

    #[test]
    fn test_order_rejects_unknown_status() {
        let result = serde_json::from_value::<Order>(json!({
            "id": 1,
            "status": "teleported",
            "payment_status": "pending",
            "subtotal": 100,
            "total": 100
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_order_reference() {
        let order: Order = serde_json::from_value(json!({
            "id": 12,
            "status": "pending",
            "payment_status": "pending",
            "subtotal": 100,
            "total": 350
        }))
        .unwrap();
        assert_eq!(order.reference(), "#12");
        assert!(order.delivery_fee.is_zero());
    }
}
