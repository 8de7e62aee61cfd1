//! Payment initiation, verification and status polling.
//!
//! The server talks to M-Pesa and the card gateway and decides whether an
//! order is paid. This service only starts payments, asks for their status
//! and, for M-Pesa, polls until the customer has answered the STK prompt.

mod poller;

pub use poller::{
    PaymentPoller, PaymentStatusSource, PollConfig, PollHandle, PollObservation, PollOutcome,
    PollStopper, StatusReport,
};

use tracing::{info, instrument, warn};
use url::Url;

use soko_core::{OrderId, PaymentMethod, PhoneNumber};

use crate::api::types::{
    CardInitiateResponse, CardVerifyResponse, MpesaInitiateResponse, PaymentStatusResponse,
};
use crate::api::{ApiClient, ApiError};
use crate::error::{StorefrontError, add_breadcrumb};
use crate::services::checkout::CheckoutError;

impl PaymentStatusSource for ApiClient {
    async fn check_status(&self, order_id: OrderId) -> Result<StatusReport, ApiError> {
        let (response, payload) = self.payment_status(order_id).await?;
        Ok(StatusReport {
            status: response.status,
            payload,
        })
    }
}

/// How the customer wants to pay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentChoice {
    /// STK push to this phone.
    Mpesa { phone: PhoneNumber },
    /// Hosted card checkout.
    Card,
}

impl PaymentChoice {
    /// Build a choice for `method`. M-Pesa uses `phone` when given and the
    /// account's phone otherwise.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::PhoneRequired` if M-Pesa has no phone to use,
    /// or `CheckoutError::InvalidPhone` if it is not a Kenyan mobile number.
    pub fn resolve(
        method: PaymentMethod,
        phone: Option<&str>,
        account_phone: Option<&str>,
    ) -> Result<Self, CheckoutError> {
        match method {
            PaymentMethod::Card => Ok(Self::Card),
            PaymentMethod::Mpesa => {
                let raw = phone
                    .or(account_phone)
                    .ok_or(CheckoutError::PhoneRequired)?;
                Ok(Self::Mpesa {
                    phone: PhoneNumber::parse(raw)?,
                })
            }
        }
    }

    #[must_use]
    pub const fn method(&self) -> PaymentMethod {
        match self {
            Self::Mpesa { .. } => PaymentMethod::Mpesa,
            Self::Card => PaymentMethod::Card,
        }
    }
}

/// Result of asking the server to start a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentInitiation {
    /// The STK prompt is on its way to the customer's phone.
    StkPushSent {
        checkout_request_id: String,
        message: Option<String>,
    },
    /// The customer must complete payment on the gateway's page.
    CardRedirect {
        authorization_url: String,
        reference: String,
    },
    /// The payment could not be started; the order can be paid later.
    Failed { message: String },
}

/// Payment operations.
#[derive(Debug, Clone)]
pub struct PaymentService {
    api: ApiClient,
    poller: PaymentPoller,
    poll_config: PollConfig,
    card_callback_url: Option<Url>,
}

impl PaymentService {
    #[must_use]
    pub const fn new(
        api: ApiClient,
        poller: PaymentPoller,
        poll_config: PollConfig,
        card_callback_url: Option<Url>,
    ) -> Self {
        Self {
            api,
            poller,
            poll_config,
            card_callback_url,
        }
    }

    /// Start paying for `order_id`.
    ///
    /// Never fails: an initiation error is turned into
    /// [`PaymentInitiation::Failed`] so the caller can keep the order.
    #[instrument(skip(self, choice), fields(method = %choice.method()))]
    pub async fn initiate(&self, order_id: OrderId, choice: &PaymentChoice) -> PaymentInitiation {
        let result = match choice {
            PaymentChoice::Mpesa { phone } => {
                self.initiate_mpesa(order_id, phone)
                    .await
                    .map(|r| PaymentInitiation::StkPushSent {
                        checkout_request_id: r.checkout_request_id,
                        message: r.customer_message,
                    })
            }
            PaymentChoice::Card => {
                self.initiate_card(order_id)
                    .await
                    .map(|r| PaymentInitiation::CardRedirect {
                        authorization_url: r.authorization_url,
                        reference: r.reference,
                    })
            }
        };

        match result {
            Ok(initiation) => {
                info!(order_id = %order_id, "Payment initiated");
                initiation
            }
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Payment initiation failed");
                let err = StorefrontError::from(e);
                err.report();
                PaymentInitiation::Failed {
                    message: err.user_message(),
                }
            }
        }
    }

    /// Send an STK push for `order_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot start the payment.
    pub async fn initiate_mpesa(
        &self,
        order_id: OrderId,
        phone: &PhoneNumber,
    ) -> Result<MpesaInitiateResponse, ApiError> {
        let id = order_id.to_string();
        add_breadcrumb("payment", "M-Pesa payment started", Some(&[("order_id", id.as_str())]));
        self.api.initiate_mpesa(order_id, phone).await
    }

    /// Start a card checkout, returning the gateway URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot start the payment.
    pub async fn initiate_card(&self, order_id: OrderId) -> Result<CardInitiateResponse, ApiError> {
        let id = order_id.to_string();
        add_breadcrumb("payment", "Card payment started", Some(&[("order_id", id.as_str())]));
        self.api
            .initiate_card(order_id, self.card_callback_url.as_ref().map(Url::as_str))
            .await
    }

    /// Current payment status of an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn status(&self, order_id: OrderId) -> Result<PaymentStatusResponse, ApiError> {
        Ok(self.api.payment_status(order_id).await?.0)
    }

    /// Confirm a card payment by its gateway reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is unknown or the request fails.
    pub async fn verify_card(&self, reference: &str) -> Result<CardVerifyResponse, ApiError> {
        self.api.verify_card(reference).await
    }

    /// Poll the payment status of `order_id` with the configured budget.
    ///
    /// Replaces any session already polling this order.
    pub fn watch<F>(&self, order_id: OrderId, observer: F) -> PollHandle
    where
        F: FnMut(PollObservation) + Send + 'static,
    {
        self.poller
            .start(self.api.clone(), order_id, self.poll_config, observer)
    }

    /// The poller running this service's sessions.
    #[must_use]
    pub const fn poller(&self) -> &PaymentPoller {
        &self.poller
    }
}
