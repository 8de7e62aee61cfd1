//! Order history, tracking and cancellation.
//!
//! Orders are read-only projections of server state. The only actions are
//! asking the server to cancel and starting a payment again.

use thiserror::Error;
use tracing::{info, instrument};

use soko_core::{OrderId, OrderStatus, PaymentStatus};

use super::payments::{PaymentChoice, PaymentInitiation, PaymentService};
use crate::api::types::Order;
use crate::api::{ApiClient, ApiError};

/// Errors from order actions.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order has moved past the point where it can be cancelled.
    #[error("Order cannot be cancelled once it is {0}")]
    NotCancellable(OrderStatus),

    /// The order was cancelled, so it cannot be paid.
    #[error("This order was cancelled")]
    Cancelled,

    /// The order is already paid.
    #[error("This order has already been paid")]
    AlreadyPaid,

    /// API request failed.
    #[error("{0}")]
    Api(#[from] ApiError),
}

/// One stage on the tracking timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingStep {
    pub status: OrderStatus,
    /// The order has reached (or passed) this stage.
    pub reached: bool,
    /// This is the stage the order is in now.
    pub current: bool,
}

/// Display projection of an order.
#[derive(Debug, Clone)]
pub struct OrderView {
    pub order: Order,
}

impl OrderView {
    #[must_use]
    pub const fn new(order: Order) -> Self {
        Self { order }
    }

    /// Fulfilment timeline. Empty for cancelled orders.
    #[must_use]
    pub fn tracking(&self) -> Vec<TrackingStep> {
        let Some(stage) = self.order.status.stage() else {
            return Vec::new();
        };
        OrderStatus::PROGRESSION
            .iter()
            .enumerate()
            .map(|(i, status)| TrackingStep {
                status: *status,
                reached: i <= stage,
                current: i == stage,
            })
            .collect()
    }

    #[must_use]
    pub const fn status_label(&self) -> &'static str {
        self.order.status.label()
    }

    #[must_use]
    pub const fn payment_label(&self) -> &'static str {
        self.order.payment_status.label()
    }

    #[must_use]
    pub const fn can_cancel(&self) -> bool {
        self.order.status.is_cancellable()
    }

    /// Whether a payment can be started for this order.
    #[must_use]
    pub const fn can_pay(&self) -> bool {
        !matches!(self.order.status, OrderStatus::Cancelled)
            && self.order.payment_status.is_payable()
    }

    #[must_use]
    pub const fn is_paid(&self) -> bool {
        matches!(self.order.payment_status, PaymentStatus::Completed)
    }
}

/// Order operations for the logged-in customer.
#[derive(Debug, Clone)]
pub struct OrderService {
    api: ApiClient,
    payments: PaymentService,
}

impl OrderService {
    #[must_use]
    pub const fn new(api: ApiClient, payments: PaymentService) -> Self {
        Self { api, payments }
    }

    /// The customer's orders.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn my_orders(&self) -> Result<Vec<OrderView>, OrderError> {
        let orders = self.api.my_orders().await?;
        Ok(orders.into_iter().map(OrderView::new).collect())
    }

    /// One order.
    ///
    /// # Errors
    ///
    /// Returns an error if the order does not exist or the request fails.
    pub async fn order(&self, id: OrderId) -> Result<OrderView, OrderError> {
        Ok(OrderView::new(self.api.get_order(id).await?))
    }

    /// Cancel an order that has not progressed too far.
    ///
    /// The current status is checked first so an order that already shipped
    /// is refused without a request.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotCancellable` if the order is past confirmation,
    /// or the API error.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn cancel(&self, id: OrderId) -> Result<OrderView, OrderError> {
        let current = self.api.get_order(id).await?;
        if !current.status.is_cancellable() {
            return Err(OrderError::NotCancellable(current.status));
        }
        let order = self.api.cancel_order(id).await?;
        info!(status = %order.status, "Order cancelled");
        Ok(OrderView::new(order))
    }

    /// Start payment again for an unpaid order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::AlreadyPaid` or `OrderError::Cancelled` when the
    /// order cannot be paid, or the API error.
    #[instrument(skip(self, choice), fields(order_id = %id))]
    pub async fn retry_payment(
        &self,
        id: OrderId,
        choice: &PaymentChoice,
    ) -> Result<PaymentInitiation, OrderError> {
        let order = self.api.get_order(id).await?;
        if order.status == OrderStatus::Cancelled {
            return Err(OrderError::Cancelled);
        }
        if !order.payment_status.is_payable() {
            return Err(OrderError::AlreadyPaid);
        }
        Ok(self.payments.initiate(order.id, choice).await)
    }
}
