//! Soko Core - Shared domain types.
//!
//! This crate provides the types shared by every Soko component:
//! - `storefront` - API client, cart, checkout and payment orchestration
//! - `cli` - The `soko` terminal storefront
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no storage.
//! Everything here can be constructed and validated without a runtime.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, money, emails, phone numbers and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
