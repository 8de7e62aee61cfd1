//! Authentication service.
//!
//! Validates login and registration forms before they reach the server,
//! then records the resulting session locally.

mod error;

pub use error::AuthError;

use tracing::{info, instrument};

use soko_core::{Email, PhoneNumber};

use crate::api::{ApiClient, ApiError};
use crate::api::types::{AuthResponse, LoginRequest, ProfileUpdate, RegisterRequest, User};
use crate::error::{clear_sentry_user, set_sentry_user};
use crate::session::{AuthTokens, Session};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Registration form as entered by the customer.
#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub password_confirmation: String,
}

/// A registration form that passed validation.
#[derive(Debug, Clone)]
pub struct ValidRegistration {
    pub name: String,
    pub email: Email,
    pub phone: PhoneNumber,
    password: String,
}

impl RegisterForm {
    /// Check the form, returning the first problem found.
    ///
    /// # Errors
    ///
    /// Returns the `AuthError` describing the first invalid field.
    pub fn validate(&self) -> Result<ValidRegistration, AuthError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AuthError::MissingField("Name"));
        }
        let email = Email::parse(&self.email)?;
        let phone = PhoneNumber::parse(&self.phone)?;
        validate_password(&self.password)?;
        if self.password != self.password_confirmation {
            return Err(AuthError::PasswordMismatch);
        }

        Ok(ValidRegistration {
            name: name.to_string(),
            email,
            phone,
            password: self.password.clone(),
        })
    }
}

/// Authentication service.
///
/// Handles login, registration, logout and profile updates.
pub struct AuthService<'a> {
    api: &'a ApiClient,
    session: &'a Session,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(api: &'a ApiClient, session: &'a Session) -> Self {
        Self { api, session }
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        if password.is_empty() {
            return Err(AuthError::MissingField("Password"));
        }

        let response = self
            .api
            .login(&LoginRequest {
                email: email.as_str(),
                password,
            })
            .await
            .map_err(|e| match e {
                ApiError::Unauthorized(_) => AuthError::InvalidCredentials,
                other => AuthError::Api(other),
            })?;

        self.start_session(response)
    }

    /// Register a new customer and log them in.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid form, or the server's
    /// rejection (for example an email already in use).
    #[instrument(skip_all)]
    pub async fn register(&self, form: &RegisterForm) -> Result<User, AuthError> {
        let valid = form.validate()?;
        let response = self
            .api
            .register(&RegisterRequest {
                name: &valid.name,
                email: valid.email.as_str(),
                phone: valid.phone.as_str(),
                password: &valid.password,
            })
            .await?;

        self.start_session(response)
    }

    /// Forget the session. The cart stays on the device.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be updated.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.session.clear()?;
        clear_sentry_user();
        info!("Logged out");
        Ok(())
    }

    /// The logged-in customer, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.session.user()
    }

    /// Re-fetch the profile from the server.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotLoggedIn` without a session, or the API error.
    pub async fn refresh_profile(&self) -> Result<User, AuthError> {
        self.require_login()?;
        let user = self.api.me().await?;
        self.session.update_user(user.clone())?;
        Ok(user)
    }

    /// Update name and/or phone.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid phone, `AuthError::NotLoggedIn`
    /// without a session, or the API error.
    #[instrument(skip_all)]
    pub async fn update_profile(
        &self,
        name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<User, AuthError> {
        self.require_login()?;

        let name = match name.map(str::trim) {
            Some("") => return Err(AuthError::MissingField("Name")),
            other => other.map(str::to_string),
        };
        let phone = phone
            .map(PhoneNumber::parse)
            .transpose()?
            .map(String::from);

        let user = self.api.update_profile(&ProfileUpdate { name, phone }).await?;
        self.session.update_user(user.clone())?;
        Ok(user)
    }

    fn require_login(&self) -> Result<(), AuthError> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(AuthError::NotLoggedIn)
        }
    }

    fn start_session(&self, response: AuthResponse) -> Result<User, AuthError> {
        let AuthResponse {
            user,
            token,
            refresh_token,
        } = response;
        self.session
            .establish(user.clone(), AuthTokens::new(token, refresh_token))?;
        set_sentry_user(&user.id, Some(user.email.as_str()));
        info!(user_id = %user.id, "Logged in");
        Ok(user)
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form() -> RegisterForm {
        RegisterForm {
            name: "  Wanjiru Kamau ".to_string(),
            email: "wanjiru@example.co.ke".to_string(),
            phone: "0722 000 111".to_string(),
            password: "mtumbaprices".to_string(),
            password_confirmation: "mtumbaprices".to_string(),
        }
    }

    #[test]
    fn test_valid_form() {
        let valid = form().validate().unwrap();
        assert_eq!(valid.name, "Wanjiru Kamau");
        assert_eq!(valid.phone.as_str(), "254722000111");
    }

    #[test]
    fn test_missing_name() {
        let form = RegisterForm {
            name: "   ".to_string(),
            ..form()
        };
        assert!(matches!(form.validate(), Err(AuthError::MissingField("Name"))));
    }

    #[test]
    fn test_invalid_email_and_phone() {
        let bad_email = RegisterForm {
            email: "wanjiru.example.co.ke".to_string(),
            ..form()
        };
        assert!(matches!(bad_email.validate(), Err(AuthError::InvalidEmail(_))));

        let bad_phone = RegisterForm {
            phone: "12345".to_string(),
            ..form()
        };
        assert!(matches!(bad_phone.validate(), Err(AuthError::InvalidPhone(_))));
    }

    #[test]
    fn test_password_rules() {
        let short = RegisterForm {
            password: "short".to_string(),
            password_confirmation: "short".to_string(),
            ..form()
        };
        assert!(matches!(short.validate(), Err(AuthError::WeakPassword(_))));

        let mismatch = RegisterForm {
            password_confirmation: "different1".to_string(),
            ..form()
        };
        assert!(matches!(mismatch.validate(), Err(AuthError::PasswordMismatch)));
    }
}
