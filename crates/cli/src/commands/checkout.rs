//! Checkout command: walks the three wizard steps, places the order and
//! follows the payment.

use clap::Args;

use soko_core::{AddressId, PaymentMethod};
use soko_storefront::Result;
use soko_storefront::services::checkout::CheckoutWizard;
use soko_storefront::state::AppState;

use super::payments::{MethodArg, follow};
use crate::views;

#[derive(Args)]
pub struct CheckoutArgs {
    /// Delivery address id (defaults to your default address)
    #[arg(short, long)]
    address: Option<AddressId>,

    /// Payment method
    #[arg(short, long, value_enum)]
    method: MethodArg,

    /// M-Pesa number to charge (defaults to your account phone)
    #[arg(short, long)]
    phone: Option<String>,

    /// Delivery instructions
    #[arg(short, long)]
    notes: Option<String>,

    /// Do not wait for M-Pesa confirmation
    #[arg(long)]
    no_wait: bool,
}

pub async fn run(state: &AppState, args: CheckoutArgs) -> Result<()> {
    let mut wizard = CheckoutWizard::load(state.api()).await?;

    views::checkout_step(wizard.step());
    if let Some(id) = args.address {
        wizard.select_address(id)?;
    }
    views::checkout_step(wizard.next()?);

    wizard.select_payment_method(PaymentMethod::from(args.method));
    if let Some(phone) = args.phone {
        wizard.set_phone(phone);
    }
    if let Some(notes) = args.notes {
        wizard.set_notes(notes);
    }
    views::checkout_step(wizard.next()?);

    let placed = {
        let mut cart = state.cart().await;
        views::checkout_summary(&wizard.summary(cart.cart())?);
        wizard
            .place_order(&mut cart, state.api(), &state.payments())
            .await?
    };

    views::placed_order(&placed);
    follow(state, placed.order.id, &placed.payment, !args.no_wait).await;
    Ok(())
}
