//! Payment endpoints: M-Pesa STK push, status checks and card checkout.

use serde_json::Value;
use tracing::instrument;

use soko_core::{OrderId, PhoneNumber};

use super::client::Call;
use super::types::{
    CardInitiateRequest, CardInitiateResponse, CardVerifyRequest, CardVerifyResponse,
    MpesaInitiateRequest, MpesaInitiateResponse, PaymentStatusResponse,
};
use super::{ApiClient, ApiError};

impl ApiClient {
    /// Send an STK push prompt to `phone` for the order's total.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot start the payment or the request fails.
    #[instrument(skip(self, phone), fields(order_id = %order_id))]
    pub async fn initiate_mpesa(
        &self,
        order_id: OrderId,
        phone: &PhoneNumber,
    ) -> Result<MpesaInitiateResponse, ApiError> {
        let request = MpesaInitiateRequest {
            order_id,
            phone_number: phone.as_str(),
        };
        self.execute(Call::post("payments/mpesa/initiate").json(&request)?.authenticated())
            .await
    }

    /// Current payment status of an order.
    ///
    /// Returns the decoded status together with the raw payload so callers
    /// can surface fields the client does not model.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the payload has no usable status.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn payment_status(
        &self,
        order_id: OrderId,
    ) -> Result<(PaymentStatusResponse, Value), ApiError> {
        let path = format!("payments/status/{order_id}");
        let raw = self
            .execute_value(&Call::get(path.clone()).authenticated())
            .await?;
        let status = serde_json::from_value(raw.clone()).map_err(|source| ApiError::Decode {
            endpoint: path,
            source,
        })?;
        Ok((status, raw))
    }

    /// Start a hosted card checkout.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot start the payment or the request fails.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn initiate_card(
        &self,
        order_id: OrderId,
        callback_url: Option<&str>,
    ) -> Result<CardInitiateResponse, ApiError> {
        let request = CardInitiateRequest {
            order_id,
            callback_url,
        };
        self.execute(Call::post("payments/card/initiate").json(&request)?.authenticated())
            .await
    }

    /// Confirm a card payment after the customer returns from the gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is unknown or the request fails.
    #[instrument(skip(self))]
    pub async fn verify_card(&self, reference: &str) -> Result<CardVerifyResponse, ApiError> {
        self.execute(
            Call::post("payments/card/verify")
                .json(&CardVerifyRequest { reference })?
                .authenticated(),
        )
        .await
    }
}
