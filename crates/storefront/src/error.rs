//! Unified error handling with Sentry integration.
//!
//! Every layer has its own `thiserror` enum; [`StorefrontError`] aggregates
//! them for callers that drive whole flows (the CLI views). Views show
//! [`StorefrontError::user_message`] and call [`StorefrontError::report`] so
//! unexpected failures reach Sentry.

use thiserror::Error;

use crate::api::ApiError;
use crate::cart::CartError;
use crate::config::ConfigError;
use crate::services::auth::AuthError;
use crate::services::checkout::CheckoutError;
use crate::services::orders::OrderError;
use crate::storage::StorageError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Talking to the marketplace API failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Local storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Login, registration or profile update failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// A cart operation was rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// The checkout wizard could not proceed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// An order action was refused.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),
}

impl StorefrontError {
    /// The notice to show the customer.
    ///
    /// Transport and storage details are never included.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(err) => format!("The storefront is misconfigured: {err}"),
            Self::Api(err) => api_message(err),
            Self::Storage(_) => "Could not save your data on this device.".to_string(),
            Self::Auth(err) => match err {
                AuthError::Api(api) => api_message(api),
                AuthError::Storage(_) => "Could not save your session on this device.".to_string(),
                other => other.to_string(),
            },
            Self::Cart(err) => match err {
                CartError::Api(api) => api_message(api),
                CartError::Storage(_) => "Could not save your cart on this device.".to_string(),
                other => other.to_string(),
            },
            Self::Checkout(err) => match err {
                CheckoutError::Api(api) => api_message(api),
                CheckoutError::Cart(cart) => cart.to_string(),
                other => other.to_string(),
            },
            Self::Order(err) => match err {
                OrderError::Api(api) => api_message(api),
                other => other.to_string(),
            },
        }
    }

    /// Whether the customer has to log in again.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(
            self.api_error(),
            Some(ApiError::SessionExpired | ApiError::Unauthorized(_))
        )
    }

    /// Capture unexpected failures to Sentry and log them.
    ///
    /// Rejections the customer can act on (validation, stock, server
    /// messages) are not reported.
    pub fn report(&self) {
        let unexpected = match self {
            Self::Config(_)
            | Self::Storage(_)
            | Self::Auth(AuthError::Storage(_))
            | Self::Cart(CartError::Storage(_)) => true,
            _ => self.api_error().is_some_and(|e| {
                e.is_transport()
                    || matches!(e, ApiError::Url(_) | ApiError::Storage(_))
                    || matches!(e, ApiError::Status { status, .. } if status.is_server_error())
            }),
        };

        if unexpected {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront error"
            );
        } else {
            tracing::debug!(error = %self, "Storefront error");
        }
    }

    const fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e)
            | Self::Auth(AuthError::Api(e))
            | Self::Cart(CartError::Api(e))
            | Self::Checkout(CheckoutError::Api(e))
            | Self::Order(OrderError::Api(e)) => Some(e),
            _ => None,
        }
    }
}

fn api_message(err: &ApiError) -> String {
    match err {
        ApiError::SessionExpired => "Your session has expired. Please log in again.".to_string(),
        ApiError::Http(e) if e.is_timeout() => {
            "The server took too long to respond. Please try again.".to_string()
        }
        ApiError::Http(_) => {
            "Could not reach the store. Check your connection and try again.".to_string()
        }
        ApiError::Decode { .. } | ApiError::Url(_) => {
            "Something went wrong. Please try again later.".to_string()
        }
        ApiError::RateLimited(secs) => {
            format!("Too many requests. Please wait {secs} seconds and try again.")
        }
        ApiError::Storage(_) => "Could not save your session on this device.".to_string(),
        ApiError::Unauthorized(_) | ApiError::NotFound(_) | ApiError::Status { .. } => err
            .server_message()
            .map_or_else(|| "Request failed. Please try again.".to_string(), str::to_string),
    }
}

/// Result type alias for `StorefrontError`.
pub type Result<T> = std::result::Result<T, StorefrontError>;

/// Set the Sentry user context.
///
/// Call this after a successful login to associate errors with the customer.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout or session expiry.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a customer action.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "12")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
