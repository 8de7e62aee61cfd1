//! Soko storefront library.
//!
//! Client side of the Soko electronics marketplace: the API client, the
//! cart kept on the device, the checkout wizard and M-Pesa/card payment
//! orchestration. Views (the `soko` CLI) drive it through [`state::AppState`].
//!
//! The server owns prices, delivery fees, stock, order state and payment
//! verification; this crate only asks and shows.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod services;
pub mod session;
pub mod state;
pub mod storage;

pub use error::{Result, StorefrontError};
