//! Subcommand implementations. Each one drives the storefront library and
//! hands the result to [`crate::views`].

pub mod account;
pub mod addresses;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod payments;
