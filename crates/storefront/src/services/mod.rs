//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Login, registration and profile with client-side validation
//! - `checkout` - Address, payment method and review steps, order placement
//! - `orders` - Order history, tracking and cancellation
//! - `payments` - M-Pesa and card payments, payment status polling

pub mod auth;
pub mod checkout;
pub mod orders;
pub mod payments;
