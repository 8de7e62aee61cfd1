//! Request execution: envelope decoding, error mapping and token refresh.

use std::sync::Arc;

use moka::future::Cache;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::ApiError;
use super::cache::{CacheKey, CacheValue};
use super::types::{Envelope, ErrorBody};
use crate::config::StorefrontConfig;
use crate::session::Session;

/// Whether a call needs the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Access {
    Public,
    Authenticated,
}

/// A request description that can be sent more than once.
#[derive(Debug, Clone)]
pub(super) struct Call {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<Value>,
    access: Access,
}

impl Call {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            access: Access::Public,
        }
    }

    pub(super) fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub(super) fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub(super) fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub(super) fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub(super) fn query(mut self, pairs: Vec<(&'static str, String)>) -> Self {
        self.query = pairs;
        self
    }

    pub(super) fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|source| ApiError::Decode {
            endpoint: self.path.clone(),
            source,
        })?;
        self.body = Some(value);
        Ok(self)
    }

    pub(super) const fn authenticated(mut self) -> Self {
        self.access = Access::Authenticated;
        self
    }
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the marketplace API.
///
/// Cheaply cloneable; clones share the connection pool, cache and session.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    base_url: Url,
    session: Session,
    cache: Cache<CacheKey, CacheValue>,
    /// Serialises token refreshes so concurrent 401s trigger one refresh.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl ApiClient {
    /// Create a new API client bound to `session`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &StorefrontConfig, session: Session) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("soko-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(config.catalog_cache_ttl)
            .build();

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                http,
                base_url: config.api_base_url.clone(),
                session,
                cache,
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// The session whose token this client sends.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub(super) fn cache(&self) -> &Cache<CacheKey, CacheValue> {
        &self.inner.cache
    }

    /// Execute a call and decode its `data` payload.
    pub(super) async fn execute<T: DeserializeOwned>(&self, call: Call) -> Result<T, ApiError> {
        let value = self.execute_value(&call).await?;
        decode_data(&call, value)
    }

    /// Send a public call once, without the expiry handling of `execute`.
    ///
    /// The refresh request goes through here so that refreshing never
    /// re-enters `execute_value`.
    pub(super) async fn execute_once<T: DeserializeOwned>(
        &self,
        call: Call,
    ) -> Result<T, ApiError> {
        let response = self.dispatch(&call, None).await?;
        let value = decode_payload(&call, response).await?;
        decode_data(&call, value)
    }

    /// Execute a call and return its raw `data` payload.
    pub(super) async fn execute_value(&self, call: &Call) -> Result<Value, ApiError> {
        let token = match call.access {
            Access::Public => None,
            Access::Authenticated => Some(self.inner.session.access_token().ok_or_else(|| {
                ApiError::Unauthorized("Please log in to continue".to_string())
            })?),
        };

        let response = self.dispatch(call, token.as_ref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED
            && let Some(stale) = token
        {
            let body = read_error_body(response).await;
            if !body.signals_expiry() {
                return Err(ApiError::Unauthorized(
                    body.message
                        .unwrap_or_else(|| "Please log in to continue".to_string()),
                ));
            }

            let fresh = self.refresh_after_expiry(&stale).await?;
            let retry = self.dispatch(call, Some(&fresh)).await?;
            if retry.status() == StatusCode::UNAUTHORIZED {
                warn!(path = %call.path, "Refreshed token rejected");
                self.expire_session();
                return Err(ApiError::SessionExpired);
            }
            return decode_payload(call, retry).await;
        }

        decode_payload(call, response).await
    }

    async fn dispatch(
        &self,
        call: &Call,
        token: Option<&SecretString>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut url = self.inner.base_url.join(call.path.trim_start_matches('/'))?;
        if !call.query.is_empty() {
            url.query_pairs_mut().extend_pairs(call.query.iter());
        }

        let mut request = self
            .inner
            .http
            .request(call.method.clone(), url)
            .header(ACCEPT, "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        debug!(method = %call.method, path = %call.path, "API request");
        Ok(request.send().await?)
    }

    /// Obtain a usable access token after `stale` was rejected as expired.
    ///
    /// Holds the refresh lock, so requests that expired together share one
    /// refresh. Any failure clears the session.
    async fn refresh_after_expiry(&self, stale: &SecretString) -> Result<SecretString, ApiError> {
        let _guard = self.inner.refresh_lock.lock().await;
        let session = &self.inner.session;

        if let Some(current) = session.access_token()
            && current.expose_secret() != stale.expose_secret()
        {
            debug!("Token already refreshed by a concurrent request");
            return Ok(current);
        }

        let Some(refresh_token) = session.refresh_token() else {
            info!("Access token expired and no refresh token is stored");
            self.expire_session();
            return Err(ApiError::SessionExpired);
        };

        match self.refresh_tokens(refresh_token.expose_secret()).await {
            Ok(tokens) => {
                let access = SecretString::from(tokens.token);
                session.update_tokens(access.clone(), tokens.refresh_token.map(SecretString::from))?;
                info!("Access token refreshed");
                Ok(access)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                self.expire_session();
                Err(ApiError::SessionExpired)
            }
        }
    }

    fn expire_session(&self) {
        if let Err(e) = self.inner.session.clear() {
            warn!(error = %e, "Failed to clear expired session");
        }
        crate::error::clear_sentry_user();
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("session", &self.inner.session)
            .finish_non_exhaustive()
    }
}

fn decode_data<T: DeserializeOwned>(call: &Call, value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|source| {
        warn!(path = %call.path, error = %source, "Response did not match schema");
        ApiError::Decode {
            endpoint: call.path.clone(),
            source,
        }
    })
}

/// Map status codes to errors and unwrap the response envelope.
async fn decode_payload(call: &Call, response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(ApiError::RateLimited(retry_after));
    }

    let text = response.text().await?;

    if !status.is_success() {
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = body.message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });
        warn!(
            status = %status,
            path = %call.path,
            message = %message,
            "API returned non-success status"
        );
        return Err(match status {
            StatusCode::NOT_FOUND => ApiError::NotFound(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized(message),
            _ => ApiError::Status { status, message },
        });
    }

    let envelope: Envelope<Value> = serde_json::from_str(&text).map_err(|source| {
        tracing::error!(
            path = %call.path,
            error = %source,
            body = %text.chars().take(500).collect::<String>(),
            "Failed to parse API response"
        );
        ApiError::Decode {
            endpoint: call.path.clone(),
            source,
        }
    })?;

    if envelope.success == Some(false) {
        return Err(ApiError::Status {
            status,
            message: envelope.message.unwrap_or_default(),
        });
    }

    Ok(envelope.data.unwrap_or(Value::Null))
}

async fn read_error_body(response: reqwest::Response) -> ErrorBody {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str(&text).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_builder() {
        let call = Call::get("/products")
            .query(vec![("page", "2".to_string())])
            .authenticated();
        assert_eq!(call.method, Method::GET);
        assert_eq!(call.access, Access::Authenticated);
        assert_eq!(call.query.len(), 1);
        assert!(call.body.is_none());
    }

    #[test]
    fn test_call_json_body() {
        #[derive(Serialize)]
        struct Body {
            quantity: u32,
        }
        let call = Call::post("orders").json(&Body { quantity: 2 });
        let call = call.ok();
        assert_eq!(
            call.and_then(|c| c.body),
            Some(serde_json::json!({ "quantity": 2 }))
        );
    }
}
