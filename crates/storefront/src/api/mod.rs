//! Marketplace API client.
//!
//! # Architecture
//!
//! - Plain JSON over HTTP via `reqwest`; every response is wrapped in an
//!   `{ success, data, message }` envelope and decoded into [`types`]
//! - The server is the source of truth - the client never computes fees,
//!   verifies payments or moves orders between states
//! - Product listings and details are cached in memory via `moka`
//! - Authenticated requests carry the session's bearer token; an expired
//!   token is refreshed once and the request retried once
//!
//! # Example
//!
//! ```rust,ignore
//! use soko_storefront::api::ApiClient;
//!
//! let client = ApiClient::new(&config, session)?;
//! let page = client.list_products(&ProductQuery::default()).await?;
//! let order = client.get_order(OrderId::new(42)).await?;
//! ```

mod account;
mod cache;
mod catalog;
mod client;
mod orders;
mod payments;
pub mod types;

pub use client::ApiClient;

use reqwest::StatusCode;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can occur when talking to the marketplace API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be sent or the connection failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A request URL could not be built.
    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    /// The response body did not match the expected schema.
    #[error("Unexpected response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// Request requires a login and there is none, or credentials were rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The access token expired and could not be refreshed; the session was cleared.
    #[error("Session expired")]
    SessionExpired,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The server rejected the request.
    #[error("API error ({status}): {message}")]
    Status { status: StatusCode, message: String },

    /// Session storage failed while updating tokens.
    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// Whether the failure happened below HTTP semantics (network, timeout,
    /// malformed body) rather than being an answer from the server.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Decode { .. })
    }

    /// The server's own explanation, when it sent one.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } | Self::Unauthorized(message) | Self::NotFound(message)
                if !message.is_empty() =>
            {
                Some(message)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::NotFound("Product not found".to_string());
        assert_eq!(err.to_string(), "Not found: Product not found");

        let err = ApiError::Status {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "Insufficient stock".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API error (422 Unprocessable Entity): Insufficient stock"
        );
    }

    #[test]
    fn test_rate_limited_error() {
        let err = ApiError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");
    }

    #[test]
    fn test_server_message() {
        let err = ApiError::Unauthorized("Invalid email or password".to_string());
        assert_eq!(err.server_message(), Some("Invalid email or password"));
        assert_eq!(ApiError::SessionExpired.server_message(), None);
        let err = ApiError::Status {
            status: StatusCode::BAD_REQUEST,
            message: String::new(),
        };
        assert_eq!(err.server_message(), None);
    }
}
