//! Application state shared across views.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::api::ApiClient;
use crate::cart::CartStore;
use crate::config::StorefrontConfig;
use crate::error::StorefrontError;
use crate::services::auth::AuthService;
use crate::services::orders::OrderService;
use crate::services::payments::{PaymentPoller, PaymentService};
use crate::session::Session;
use crate::storage::LocalStore;

/// Application state shared across all views.
///
/// This struct is cheaply cloneable via `Arc` and is passed explicitly to
/// whatever needs it; there is no global store. Writes to local storage
/// happen only through [`Session`] and [`CartStore`].
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    store: LocalStore,
    api: ApiClient,
    cart: Mutex<CartStore>,
    poller: PaymentPoller,
}

impl AppState {
    /// Create the state, opening local storage in the configured data dir.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be opened or the HTTP client
    /// cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, StorefrontError> {
        let store = LocalStore::open(&config.data_dir)?;
        Self::with_store(config, store)
    }

    /// Create the state over an existing store (in-memory in tests).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built. An unreadable
    /// saved session is discarded.
    pub fn with_store(config: StorefrontConfig, store: LocalStore) -> Result<Self, StorefrontError> {
        let session = Session::restore(store.clone())?;
        let api = ApiClient::new(&config, session)?;
        let cart = CartStore::load(store.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                api,
                cart: Mutex::new(cart),
                poller: PaymentPoller::new(),
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to local storage.
    #[must_use]
    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    /// Get a reference to the marketplace API client.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Get a reference to the current session.
    #[must_use]
    pub fn session(&self) -> &Session {
        self.inner.api.session()
    }

    /// Lock the cart for reading or changing it.
    pub async fn cart(&self) -> MutexGuard<'_, CartStore> {
        self.inner.cart.lock().await
    }

    /// Get a reference to the payment poller.
    #[must_use]
    pub fn poller(&self) -> &PaymentPoller {
        &self.inner.poller
    }

    /// Authentication service bound to this state.
    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(self.api(), self.session())
    }

    /// Payment service using the configured polling budget.
    #[must_use]
    pub fn payments(&self) -> PaymentService {
        PaymentService::new(
            self.inner.api.clone(),
            self.inner.poller.clone(),
            self.inner.config.payment_poll,
            self.inner.config.card_callback_url.clone(),
        )
    }

    /// Order service.
    #[must_use]
    pub fn orders(&self) -> OrderService {
        OrderService::new(self.inner.api.clone(), self.payments())
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("api", &self.inner.api)
            .field("poller", &self.inner.poller)
            .finish_non_exhaustive()
    }
}
