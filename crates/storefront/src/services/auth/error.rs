//! Authentication error types.

use thiserror::Error;

use soko_core::{EmailError, PhoneNumberError};

use crate::api::ApiError;
use crate::storage::StorageError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Invalid phone number.
    #[error("Invalid phone number: {0}")]
    InvalidPhone(#[from] PhoneNumberError),

    /// A required field was left empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Password too weak or invalid.
    #[error("{0}")]
    WeakPassword(String),

    /// Password and confirmation differ.
    #[error("Passwords do not match")]
    PasswordMismatch,

    /// Wrong email or password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The action needs a logged-in customer.
    #[error("Please log in to continue")]
    NotLoggedIn,

    /// API request failed.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// Session could not be saved.
    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),
}
