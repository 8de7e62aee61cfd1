//! Order commands.

use clap::Subcommand;

use soko_core::OrderId;
use soko_storefront::Result;
use soko_storefront::state::AppState;

use super::payments::{MethodArg, choice, follow};
use crate::views;

#[derive(Subcommand)]
pub enum OrdersAction {
    /// List your orders
    List,
    /// Show an order
    Show { id: OrderId },
    /// Show where an order is
    Track { id: OrderId },
    /// Cancel a pending or confirmed order
    Cancel { id: OrderId },
    /// Pay for an unpaid order
    Pay {
        id: OrderId,

        /// Payment method
        #[arg(short, long, value_enum)]
        method: MethodArg,

        /// M-Pesa number to charge (defaults to your account phone)
        #[arg(short, long)]
        phone: Option<String>,

        /// Do not wait for M-Pesa confirmation
        #[arg(long)]
        no_wait: bool,
    },
}

pub async fn run(state: &AppState, action: OrdersAction) -> Result<()> {
    let orders = state.orders();
    match action {
        OrdersAction::List => views::orders(&orders.my_orders().await?),
        OrdersAction::Show { id } => views::order(&orders.order(id).await?),
        OrdersAction::Track { id } => views::tracking(&orders.order(id).await?),
        OrdersAction::Cancel { id } => {
            let view = orders.cancel(id).await?;
            views::notice(&format!(
                "Order {} is now {}.",
                view.order.reference(),
                view.status_label()
            ));
        }
        OrdersAction::Pay {
            id,
            method,
            phone,
            no_wait,
        } => {
            let choice = choice(state, method, phone.as_deref())?;
            let initiation = orders.retry_payment(id, &choice).await?;
            follow(state, id, &initiation, !no_wait).await;
        }
    }
    Ok(())
}
