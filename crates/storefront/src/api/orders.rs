//! Order endpoints. All require a login.

use tracing::instrument;

use soko_core::OrderId;

use super::client::Call;
use super::types::{CreateOrderRequest, Order};
use super::{ApiClient, ApiError};

impl ApiClient {
    /// Place an order. The server prices it and reserves stock.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the order (for example on
    /// insufficient stock) or the request fails.
    #[instrument(skip(self, request), fields(items = request.items.len(), address_id = %request.address_id))]
    pub async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order, ApiError> {
        let order: Order = self
            .execute(Call::post("orders").json(request)?.authenticated())
            .await?;
        // Stock levels changed server side.
        self.invalidate_catalog();
        Ok(order)
    }

    /// The customer's orders, newest first as returned by the server.
    ///
    /// # Errors
    ///
    /// Returns an error if not logged in or the request fails.
    #[instrument(skip(self))]
    pub async fn my_orders(&self) -> Result<Vec<Order>, ApiError> {
        self.execute(Call::get("orders").authenticated()).await
    }

    /// A single order with its items and address.
    ///
    /// # Errors
    ///
    /// Returns an error if the order does not exist or the request fails.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order, ApiError> {
        self.execute(Call::get(format!("orders/{id}")).authenticated())
            .await
    }

    /// Ask the server to cancel an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses or the request fails.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn cancel_order(&self, id: OrderId) -> Result<Order, ApiError> {
        let order: Order = self
            .execute(Call::put(format!("orders/{id}/cancel")).authenticated())
            .await?;
        self.invalidate_catalog();
        Ok(order)
    }
}
