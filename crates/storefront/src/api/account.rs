//! Authentication, profile and address endpoints.

use serde::de::IgnoredAny;
use tracing::instrument;

use soko_core::AddressId;

use super::client::Call;
use super::types::{
    Address, AddressInput, AuthResponse, DeliveryZone, LoginRequest, ProfileUpdate,
    RefreshRequest, RefreshResponse, RegisterRequest, User,
};
use super::{ApiClient, ApiError};

impl ApiClient {
    // =========================================================================
    // Auth
    // =========================================================================

    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` for wrong credentials, or another
    /// error if the request fails.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: &LoginRequest<'_>) -> Result<AuthResponse, ApiError> {
        self.execute(Call::post("auth/login").json(request)?).await
    }

    /// Create an account; the response logs the new customer in.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the registration or the request fails.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: &RegisterRequest<'_>) -> Result<AuthResponse, ApiError> {
        self.execute(Call::post("auth/register").json(request)?).await
    }

    /// Trade a refresh token for a new access token.
    ///
    /// Sent once with no bearer token; a rejected refresh token is returned
    /// as an error and leaves the session untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh token is rejected or the request fails.
    #[instrument(skip_all)]
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        self.execute_once(Call::post("auth/refresh").json(&RefreshRequest { refresh_token })?)
            .await
    }

    /// Fetch the logged-in customer's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if not logged in or the request fails.
    #[instrument(skip(self))]
    pub async fn me(&self) -> Result<User, ApiError> {
        self.execute(Call::get("auth/me").authenticated()).await
    }

    /// Update the logged-in customer's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if not logged in or the request fails.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.execute(Call::put("auth/profile").json(update)?.authenticated())
            .await
    }

    // =========================================================================
    // Addresses
    // =========================================================================

    /// List the customer's saved addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if not logged in or the request fails.
    #[instrument(skip(self))]
    pub async fn list_addresses(&self) -> Result<Vec<Address>, ApiError> {
        self.execute(Call::get("addresses").authenticated()).await
    }

    /// Save a new address.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the address or the request fails.
    #[instrument(skip(self, input))]
    pub async fn create_address(&self, input: &AddressInput) -> Result<Address, ApiError> {
        self.execute(Call::post("addresses").json(input)?.authenticated())
            .await
    }

    /// Replace an existing address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not exist or the request fails.
    #[instrument(skip(self, input), fields(address_id = %id))]
    pub async fn update_address(
        &self,
        id: AddressId,
        input: &AddressInput,
    ) -> Result<Address, ApiError> {
        self.execute(Call::put(format!("addresses/{id}")).json(input)?.authenticated())
            .await
    }

    /// Delete an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not exist or the request fails.
    #[instrument(skip(self), fields(address_id = %id))]
    pub async fn delete_address(&self, id: AddressId) -> Result<(), ApiError> {
        let _: IgnoredAny = self
            .execute(Call::delete(format!("addresses/{id}")).authenticated())
            .await?;
        Ok(())
    }

    /// Mark an address as the default; the server unmarks the previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not exist or the request fails.
    #[instrument(skip(self), fields(address_id = %id))]
    pub async fn set_default_address(&self, id: AddressId) -> Result<Address, ApiError> {
        self.execute(Call::put(format!("addresses/{id}/default")).authenticated())
            .await
    }

    /// List delivery zones and their fees.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_delivery_zones(&self) -> Result<Vec<DeliveryZone>, ApiError> {
        self.execute(Call::get("delivery-zones")).await
    }
}
