//! Integration tests for the checkout wizard and M-Pesa confirmation.
//!
//! The client polls the stub every 20ms, so a scripted payment reaches its
//! terminal status within a few hundred milliseconds of real time.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use soko_core::{AddressId, Money, OrderId, OrderStatus, PaymentMethod, PaymentStatus, ProductId};
use soko_integration_tests::{StubBackend, TEST_POLL};
use soko_storefront::services::checkout::{CheckoutError, CheckoutStep, CheckoutWizard};
use soko_storefront::services::payments::{PaymentInitiation, PollOutcome};
use soko_storefront::state::AppState;

/// Log in and put two lanterns and one shuka in the cart.
async fn shopper(stub: &StubBackend) -> AppState {
    let state = stub.logged_in_state().await.unwrap();
    let lantern = state.api().get_product(ProductId::new(1)).await.unwrap();
    let shuka = state.api().get_product(ProductId::new(2)).await.unwrap();
    let mut cart = state.cart().await;
    cart.add(&lantern, 2).unwrap();
    cart.add(&shuka, 1).unwrap();
    drop(cart);
    state
}

/// A wizard at the review step paying with M-Pesa.
async fn reviewed_mpesa(state: &AppState) -> CheckoutWizard {
    let mut wizard = CheckoutWizard::load(state.api()).await.unwrap();
    wizard.next().unwrap();
    wizard.select_payment_method(PaymentMethod::Mpesa);
    wizard.set_phone("+254 712 345 678");
    wizard.next().unwrap();
    wizard
}

// =============================================================================
// Wizard
// =============================================================================

#[tokio::test]
async fn test_wizard_preselects_default_address() {
    let stub = StubBackend::start().await.unwrap();
    let state = shopper(&stub).await;

    let mut wizard = CheckoutWizard::load(state.api()).await.unwrap();

    assert_eq!(wizard.step(), CheckoutStep::Address);
    assert_eq!(wizard.address().map(|a| a.id), Some(AddressId::new(7)));
    assert_eq!(wizard.next().unwrap(), CheckoutStep::PaymentMethod);
    assert!(matches!(
        wizard.next(),
        Err(CheckoutError::PaymentMethodRequired)
    ));
}

#[tokio::test]
async fn test_wizard_requires_login() {
    let stub = StubBackend::start().await.unwrap();
    let state = stub.app_state().unwrap();

    let result = CheckoutWizard::load(state.api()).await;

    assert!(matches!(result, Err(CheckoutError::NotLoggedIn)));
}

#[tokio::test]
async fn test_review_summary_includes_zone_fee() {
    let stub = StubBackend::start().await.unwrap();
    let state = shopper(&stub).await;
    let wizard = reviewed_mpesa(&state).await;

    let summary = wizard.summary(state.cart().await.cart()).unwrap();

    assert_eq!(summary.subtotal, Money::from_shillings(6_800));
    assert_eq!(summary.delivery_fee, Some(Money::from_shillings(350)));
    assert_eq!(summary.total, Money::from_shillings(7_150));
    assert_eq!(summary.item_count, 3);
}

// =============================================================================
// Placing Orders
// =============================================================================

#[tokio::test]
async fn test_mpesa_checkout_until_paid() {
    let stub = StubBackend::start().await.unwrap();
    let state = shopper(&stub).await;
    let wizard = reviewed_mpesa(&state).await;
    stub.data().payment_script.extend([
        PaymentStatus::Pending,
        PaymentStatus::Pending,
        PaymentStatus::Completed,
    ]);

    let placed = {
        let mut cart = state.cart().await;
        wizard
            .place_order(&mut cart, state.api(), &state.payments())
            .await
            .unwrap()
    };

    assert_eq!(placed.order.total, Money::from_shillings(7_150));
    assert!(matches!(placed.payment, PaymentInitiation::StkPushSent { .. }));
    assert!(state.cart().await.cart().is_empty());
    assert_eq!(
        stub.data().mpesa_requests,
        vec![(placed.order.id, "254712345678".to_string())]
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handle = state.payments().watch(placed.order.id, move |observation| {
        sink.lock().unwrap().push(observation.status);
    });
    let outcome = handle.wait().await;

    assert_eq!(outcome, PollOutcome::Terminal(PaymentStatus::Completed));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            PaymentStatus::Pending,
            PaymentStatus::Pending,
            PaymentStatus::Completed
        ]
    );
    assert_eq!(stub.calls().status_checks, 3);
    assert!(!state.poller().is_polling(placed.order.id));

    let order = state.orders().order(placed.order.id).await.unwrap();
    assert!(order.is_paid());
    assert_eq!(order.order.status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn test_unanswered_stk_push_times_out() {
    let stub = StubBackend::start().await.unwrap();
    let state = shopper(&stub).await;
    let wizard = reviewed_mpesa(&state).await;
    let placed = {
        let mut cart = state.cart().await;
        wizard
            .place_order(&mut cart, state.api(), &state.payments())
            .await
            .unwrap()
    };

    let outcome = state.payments().watch(placed.order.id, |_| {}).wait().await;

    assert_eq!(outcome, PollOutcome::TimedOut);
    assert_eq!(stub.calls().status_checks, TEST_POLL.max_attempts);
}

#[tokio::test]
async fn test_stock_change_blocks_order() {
    let stub = StubBackend::start().await.unwrap();
    let state = shopper(&stub).await;
    let wizard = reviewed_mpesa(&state).await;
    stub.data().set_stock(1, 1);

    let result = {
        let mut cart = state.cart().await;
        wizard
            .place_order(&mut cart, state.api(), &state.payments())
            .await
    };

    let Err(CheckoutError::CartChanged(changes)) = &result else {
        panic!("expected CartChanged, got {result:?}");
    };
    assert_eq!(changes.len(), 1);
    assert_eq!(stub.calls().orders_created, 0);
    assert_eq!(state.cart().await.cart().item_count(), 2);
}

#[tokio::test]
async fn test_failed_stk_push_keeps_order() {
    let stub = StubBackend::start().await.unwrap();
    let state = shopper(&stub).await;
    let wizard = reviewed_mpesa(&state).await;
    stub.data().mpesa_available = false;

    let placed = {
        let mut cart = state.cart().await;
        wizard
            .place_order(&mut cart, state.api(), &state.payments())
            .await
            .unwrap()
    };

    let PaymentInitiation::Failed { message } = &placed.payment else {
        panic!("expected a failed initiation, got {:?}", placed.payment);
    };
    assert!(message.contains("M-Pesa"));
    assert!(state.cart().await.cart().is_empty());
    assert_eq!(stub.data().orders.len(), 1);
    assert_eq!(placed.order.id, OrderId::new(101));
}

#[tokio::test]
async fn test_place_order_before_review() {
    let stub = StubBackend::start().await.unwrap();
    let state = shopper(&stub).await;
    let wizard = CheckoutWizard::load(state.api()).await.unwrap();

    let result = {
        let mut cart = state.cart().await;
        wizard
            .place_order(&mut cart, state.api(), &state.payments())
            .await
    };

    assert!(matches!(result, Err(CheckoutError::NotReviewed)));
    assert_eq!(stub.calls().orders_created, 0);
}
