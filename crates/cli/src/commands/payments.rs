//! Payment commands and the shared payment follow-up used after checkout.

use clap::{Subcommand, ValueEnum};

use soko_core::{OrderId, PaymentMethod};
use soko_storefront::Result;
use soko_storefront::services::checkout::CheckoutError;
use soko_storefront::services::payments::{PaymentChoice, PaymentInitiation};
use soko_storefront::state::AppState;

use crate::views;

#[derive(Subcommand)]
pub enum PaymentsAction {
    /// Show an order's payment status
    Status { order_id: OrderId },
    /// Confirm a card payment after returning from the payment page
    Verify {
        /// Reference shown when the card payment was started
        reference: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MethodArg {
    Mpesa,
    Card,
}

impl From<MethodArg> for PaymentMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Mpesa => Self::Mpesa,
            MethodArg::Card => Self::Card,
        }
    }
}

pub async fn run(state: &AppState, action: PaymentsAction) -> Result<()> {
    let payments = state.payments();
    match action {
        PaymentsAction::Status { order_id } => {
            views::payment_status(&payments.status(order_id).await?);
        }
        PaymentsAction::Verify { reference } => {
            views::card_verification(&payments.verify_card(&reference).await?);
        }
    }
    Ok(())
}

/// Build a payment choice, falling back to the account phone for M-Pesa.
pub fn choice(
    state: &AppState,
    method: MethodArg,
    phone: Option<&str>,
) -> std::result::Result<PaymentChoice, CheckoutError> {
    let account_phone = state.session().user().and_then(|u| u.phone);
    PaymentChoice::resolve(method.into(), phone, account_phone.as_deref())
}

/// Show how the payment started and, for M-Pesa, wait for the customer to
/// approve it. Ctrl+C stops waiting.
pub async fn follow(state: &AppState, order_id: OrderId, initiation: &PaymentInitiation, wait: bool) {
    views::payment_initiation(initiation);
    if !wait || !matches!(initiation, PaymentInitiation::StkPushSent { .. }) {
        return;
    }

    let handle = state
        .payments()
        .watch(order_id, |observation| views::poll_observation(&observation));
    let stopper = handle.stopper();
    let outcome = handle.wait();
    tokio::pin!(outcome);

    let outcome = tokio::select! {
        outcome = &mut outcome => outcome,
        _ = tokio::signal::ctrl_c() => {
            stopper.stop();
            outcome.await
        }
    };
    views::poll_outcome(outcome);
}
