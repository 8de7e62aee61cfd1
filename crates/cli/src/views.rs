//! Terminal rendering of storefront pages.
//!
//! Everything the customer reads goes to stdout from here; logs go to stderr.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use soko_core::PaymentStatus;
use soko_storefront::StorefrontError;
use soko_storefront::api::types::{
    Address, CardVerifyResponse, Category, DeliveryZone, PaymentStatusResponse, Product,
    ProductPage, User,
};
use soko_storefront::cart::{Cart, CartChange};
use soko_storefront::services::checkout::{CheckoutStep, CheckoutSummary, PlacedOrder};
use soko_storefront::services::orders::OrderView;
use soko_storefront::services::payments::{PaymentInitiation, PollObservation, PollOutcome};

pub fn error(err: &StorefrontError) {
    eprintln!("Error: {}", err.user_message());
    if err.requires_login() {
        eprintln!("Run `soko login` to continue.");
    }
}

pub fn notice(message: &str) {
    println!("{message}");
}

// =============================================================================
// Account
// =============================================================================

pub fn user(user: &User) {
    println!("{} <{}>", user.name, user.email);
    if let Some(phone) = &user.phone {
        println!("Phone: {phone}");
    }
}

// =============================================================================
// Catalog
// =============================================================================

pub fn product_page(page: &ProductPage) {
    if page.products.is_empty() {
        println!("No products found.");
        return;
    }
    for product in &page.products {
        let stock = if product.in_stock() { "" } else { "  (out of stock)" };
        println!(
            "{:>6}  {:<40}  {:>16}{stock}",
            product.id, product.name, product.price
        );
    }
    let p = &page.pagination;
    println!();
    println!("Page {} of {} ({} products)", p.page, p.total_pages.max(1), p.total);
}

pub fn product(product: &Product) {
    println!("{}", product.name);
    if let Some(brand) = &product.brand {
        println!("Brand: {brand}");
    }
    if let Some(category) = &product.category_name {
        println!("Category: {category}");
    }
    match product.original_price {
        Some(original) if original > product.price => {
            println!("Price: {} (was {original})", product.price);
        }
        _ => println!("Price: {}", product.price),
    }
    if product.in_stock() {
        println!("In stock: {}", product.stock_quantity);
    } else {
        println!("Out of stock");
    }
    if let Some(description) = &product.description {
        println!();
        println!("{description}");
    }
}

pub fn categories(categories: &[Category]) {
    for category in categories {
        match category.product_count {
            Some(count) => println!("{:>4}  {} ({count})", category.id, category.name),
            None => println!("{:>4}  {}", category.id, category.name),
        }
    }
}

pub fn zones(zones: &[DeliveryZone]) {
    for zone in zones {
        let days = zone.estimated_days.as_deref().unwrap_or("-");
        println!("{:>4}  {:<24}  {:>14}  {days}", zone.id, zone.name, zone.fee);
    }
}

// =============================================================================
// Cart
// =============================================================================

pub fn cart(cart: &Cart) {
    if cart.is_empty() {
        println!("Your cart is empty.");
        return;
    }
    for line in cart.lines() {
        println!(
            "{:>6}  {:<36}  {:>3} x {:>14}  = {:>16}",
            line.product_id,
            line.name,
            line.quantity,
            line.price,
            line.line_total()
        );
    }
    println!();
    println!("{} items, subtotal {}", cart.item_count(), cart.subtotal());
    println!("Delivery is calculated at checkout.");
}

pub fn cart_change(name: &str, change: CartChange) {
    match change {
        CartChange::Added { quantity } => println!("Added {quantity} x {name} to your cart."),
        CartChange::Updated { quantity } => println!("{name}: quantity is now {quantity}."),
        CartChange::Clamped {
            requested,
            quantity,
        } => println!(
            "Only {quantity} of {name} available; you asked for {requested}. Quantity set to {quantity}."
        ),
        CartChange::Removed => println!("Removed {name} from your cart."),
    }
}

// =============================================================================
// Addresses
// =============================================================================

pub fn addresses(addresses: &[Address]) {
    if addresses.is_empty() {
        println!("No saved addresses. Add one with `soko addresses add`.");
        return;
    }
    for address in addresses {
        let marker = if address.is_default { "*" } else { " " };
        let label = address.label.as_deref().unwrap_or("");
        println!("{marker} {:>4}  {label:<8}  {}", address.id, address.summary());
    }
}

// =============================================================================
// Checkout
// =============================================================================

pub fn checkout_step(step: CheckoutStep) {
    println!("[{}/3] {}", step.number(), step.title());
}

pub fn checkout_summary(summary: &CheckoutSummary) {
    for line in &summary.lines {
        println!(
            "  {:<36}  {:>3} x {:>14}",
            line.name, line.quantity, line.price
        );
    }
    println!();
    println!("Deliver to: {}", summary.address.summary());
    println!("Pay with:   {}", summary.payment.method());
    if let Some(notes) = &summary.notes {
        println!("Notes:      {notes}");
    }
    println!("Subtotal:   {}", summary.subtotal);
    match (summary.delivery_fee, &summary.zone) {
        (Some(fee), Some(zone)) => println!("Delivery:   {fee} ({})", zone.name),
        _ => println!("Delivery:   calculated when the order is placed"),
    }
    println!("Total:      {}", summary.total);
}

pub fn placed_order(placed: &PlacedOrder) {
    println!(
        "Order {} placed. Total {}.",
        placed.order.reference(),
        placed.order.total
    );
    payment_initiation(&placed.payment);
}

pub fn payment_initiation(initiation: &PaymentInitiation) {
    match initiation {
        PaymentInitiation::StkPushSent { message, .. } => {
            println!(
                "{}",
                message
                    .as_deref()
                    .unwrap_or("Check your phone and enter your M-Pesa PIN to pay.")
            );
        }
        PaymentInitiation::CardRedirect {
            authorization_url,
            reference,
        } => {
            println!("Complete your card payment at:");
            println!("  {authorization_url}");
            println!("Then run `soko payments verify {reference}`.");
        }
        PaymentInitiation::Failed { message } => {
            println!("Payment could not be started: {message}");
            println!("Your order is saved; pay later with `soko orders pay`.");
        }
    }
}

pub fn poll_observation(observation: &PollObservation) {
    if observation.status == PaymentStatus::Pending {
        println!(
            "  Waiting for M-Pesa confirmation (check {})...",
            observation.attempt
        );
    }
}

pub fn poll_outcome(outcome: PollOutcome) {
    match outcome {
        PollOutcome::Terminal(PaymentStatus::Completed) => println!("Payment received. Thank you!"),
        PollOutcome::Terminal(status) => {
            println!("{status}. You can try again with `soko orders pay`.");
        }
        PollOutcome::TimedOut => println!(
            "We have not received confirmation yet. Check later with `soko payments status`."
        ),
        PollOutcome::Stopped => println!("Stopped waiting for payment confirmation."),
    }
}

pub fn payment_status(status: &PaymentStatusResponse) {
    println!("{}", status.status);
    if let Some(receipt) = &status.mpesa_receipt {
        println!("M-Pesa receipt: {receipt}");
    }
    if let Some(message) = &status.message {
        println!("{message}");
    }
}

pub fn card_verification(result: &CardVerifyResponse) {
    println!("Order #{}: {}", result.order_id, result.status);
    if let Some(message) = &result.message {
        println!("{message}");
    }
}

// =============================================================================
// Orders
// =============================================================================

pub fn orders(orders: &[OrderView]) {
    if orders.is_empty() {
        println!("You have no orders yet.");
        return;
    }
    for view in orders {
        let order = &view.order;
        let date = order
            .created_at
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{:>6}  {:<14}  {date:<10}  {:<10}  {:<22}  {:>16}",
            order.id,
            order.reference(),
            view.status_label(),
            view.payment_label(),
            order.total
        );
    }
}

pub fn order(view: &OrderView) {
    let order = &view.order;
    println!("Order {}", order.reference());
    println!("Status:  {}", view.status_label());
    println!("Payment: {}", view.payment_label());
    if let Some(method) = order.payment_method {
        println!("Method:  {method}");
    }
    println!();
    for item in &order.items {
        println!(
            "  {:<36}  {:>3} x {:>14}  = {:>16}",
            item.product_name,
            item.quantity,
            item.price,
            item.line_total()
        );
    }
    println!();
    println!("Subtotal: {}", order.subtotal);
    println!("Delivery: {}", order.delivery_fee);
    println!("Total:    {}", order.total);
    if let Some(address) = &order.address {
        println!("Deliver to: {}", address.summary());
    }
}

pub fn tracking(view: &OrderView) {
    let steps = view.tracking();
    if steps.is_empty() {
        println!("Order {} was cancelled.", view.order.reference());
        return;
    }
    for step in steps {
        let marker = if step.current {
            ">"
        } else if step.reached {
            "x"
        } else {
            " "
        };
        println!("[{marker}] {}", step.status);
    }
    if let Some(tracking) = &view.order.tracking_number {
        println!("Tracking number: {tracking}");
    }
}
