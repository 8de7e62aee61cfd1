//! Checkout wizard: address, payment method, review, then order placement.
//!
//! The wizard only gathers choices and checks them. Prices, delivery fees and
//! stock are settled by the server when the order is created; the summary
//! shown at review is the client's estimate from the cart and the address's
//! delivery zone.

use thiserror::Error;
use tracing::{info, instrument, warn};

use soko_core::{AddressId, Money, PaymentMethod, PhoneNumberError, ProductId};

use super::payments::{PaymentChoice, PaymentInitiation, PaymentService};
use crate::api::types::{
    Address, CreateOrderRequest, DeliveryZone, Order, OrderItemInput, User,
};
use crate::api::{ApiClient, ApiError};
use crate::cart::{Cart, CartChange, CartError, CartItem, CartStore};
use crate::error::add_breadcrumb;

/// Errors that stop the checkout from moving forward.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Nothing to order.
    #[error("Your cart is empty")]
    EmptyCart,

    /// The customer has no saved addresses to choose from.
    #[error("Add a delivery address before checking out")]
    NoAddresses,

    /// No address selected.
    #[error("Select a delivery address")]
    AddressRequired,

    /// The selected address is not one of the customer's.
    #[error("Address {0} is not in your address book")]
    UnknownAddress(AddressId),

    /// No payment method selected.
    #[error("Select a payment method")]
    PaymentMethodRequired,

    /// M-Pesa selected without a phone number.
    #[error("Enter the M-Pesa phone number to charge")]
    PhoneRequired,

    /// The M-Pesa phone number is invalid.
    #[error("Invalid M-Pesa number: {0}")]
    InvalidPhone(#[from] PhoneNumberError),

    /// Placing the order was attempted before the review step.
    #[error("Review your order before placing it")]
    NotReviewed,

    /// Stock changed since the items were added; the cart was updated.
    #[error("Some items in your cart changed. Please review your order again.")]
    CartChanged(Vec<(ProductId, CartChange)>),

    /// Checkout needs a logged-in customer.
    #[error("Please log in to check out")]
    NotLoggedIn,

    /// API request failed.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// Cart could not be read or saved.
    #[error("{0}")]
    Cart(#[from] CartError),
}

/// Wizard steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckoutStep {
    Address,
    PaymentMethod,
    Review,
}

impl CheckoutStep {
    /// 1-based step number.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Address => 1,
            Self::PaymentMethod => 2,
            Self::Review => 3,
        }
    }

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Address => "Delivery address",
            Self::PaymentMethod => "Payment method",
            Self::Review => "Review order",
        }
    }
}

/// What the customer is about to order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSummary {
    pub lines: Vec<CartItem>,
    pub item_count: u32,
    pub subtotal: Money,
    /// Fee of the address's delivery zone; `None` when the zone is unknown
    /// and the server will price delivery.
    pub delivery_fee: Option<Money>,
    pub total: Money,
    pub address: Address,
    pub zone: Option<DeliveryZone>,
    pub payment: PaymentChoice,
    pub notes: Option<String>,
}

/// An order that was created, with the outcome of starting its payment.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    pub payment: PaymentInitiation,
}

/// Three-step checkout state.
#[derive(Debug, Clone)]
pub struct CheckoutWizard {
    step: CheckoutStep,
    addresses: Vec<Address>,
    zones: Vec<DeliveryZone>,
    address_id: Option<AddressId>,
    method: Option<PaymentMethod>,
    phone: Option<String>,
    account_phone: Option<String>,
    notes: Option<String>,
}

impl CheckoutWizard {
    /// Start a checkout with the customer's addresses and the delivery zones.
    ///
    /// The default address, if any, is preselected.
    #[must_use]
    pub fn new(addresses: Vec<Address>, zones: Vec<DeliveryZone>, user: Option<&User>) -> Self {
        let address_id = addresses.iter().find(|a| a.is_default).map(|a| a.id);
        Self {
            step: CheckoutStep::Address,
            addresses,
            zones,
            address_id,
            method: None,
            phone: None,
            account_phone: user.and_then(|u| u.phone.clone()),
            notes: None,
        }
    }

    /// Load addresses and zones for the logged-in customer.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotLoggedIn` without a session, or the API error.
    #[instrument(skip_all)]
    pub async fn load(api: &ApiClient) -> Result<Self, CheckoutError> {
        let Some(user) = api.session().user() else {
            return Err(CheckoutError::NotLoggedIn);
        };
        let (addresses, zones) =
            tokio::try_join!(api.list_addresses(), api.list_delivery_zones())?;
        Ok(Self::new(addresses, zones, Some(&user)))
    }

    #[must_use]
    pub const fn step(&self) -> CheckoutStep {
        self.step
    }

    #[must_use]
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// The selected address.
    #[must_use]
    pub fn address(&self) -> Option<&Address> {
        let id = self.address_id?;
        self.addresses.iter().find(|a| a.id == id)
    }

    #[must_use]
    pub const fn payment_method(&self) -> Option<PaymentMethod> {
        self.method
    }

    /// Choose the delivery address.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::UnknownAddress` for an address not in the list.
    pub fn select_address(&mut self, id: AddressId) -> Result<(), CheckoutError> {
        if !self.addresses.iter().any(|a| a.id == id) {
            return Err(CheckoutError::UnknownAddress(id));
        }
        self.address_id = Some(id);
        Ok(())
    }

    /// Choose how to pay.
    pub const fn select_payment_method(&mut self, method: PaymentMethod) {
        self.method = Some(method);
    }

    /// Phone to charge for M-Pesa; defaults to the account phone when unset.
    pub fn set_phone(&mut self, phone: impl Into<String>) {
        let phone = phone.into();
        self.phone = (!phone.trim().is_empty()).then_some(phone);
    }

    /// Delivery instructions.
    pub fn set_notes(&mut self, notes: impl Into<String>) {
        let notes = notes.into();
        let trimmed = notes.trim();
        self.notes = (!trimmed.is_empty()).then(|| trimmed.to_string());
    }

    /// Move to the next step if the current one is complete.
    ///
    /// # Errors
    ///
    /// Returns the reason the current step is incomplete.
    pub fn next(&mut self) -> Result<CheckoutStep, CheckoutError> {
        self.step = match self.step {
            CheckoutStep::Address => {
                self.selected_address()?;
                CheckoutStep::PaymentMethod
            }
            CheckoutStep::PaymentMethod => {
                self.payment_choice()?;
                CheckoutStep::Review
            }
            CheckoutStep::Review => CheckoutStep::Review,
        };
        add_breadcrumb("checkout", self.step.title(), None);
        Ok(self.step)
    }

    /// Go back one step. Choices are kept.
    pub const fn back(&mut self) -> CheckoutStep {
        self.step = match self.step {
            CheckoutStep::Address | CheckoutStep::PaymentMethod => CheckoutStep::Address,
            CheckoutStep::Review => CheckoutStep::PaymentMethod,
        };
        self.step
    }

    /// The payment choice, validated.
    ///
    /// # Errors
    ///
    /// Returns an error if no method is selected, or M-Pesa is selected
    /// without a valid phone number.
    pub fn payment_choice(&self) -> Result<PaymentChoice, CheckoutError> {
        let method = self.method.ok_or(CheckoutError::PaymentMethodRequired)?;
        PaymentChoice::resolve(method, self.phone.as_deref(), self.account_phone.as_deref())
    }

    /// Everything the review step shows.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart is empty or an earlier step is incomplete.
    pub fn summary(&self, cart: &Cart) -> Result<CheckoutSummary, CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let address = self.selected_address()?.clone();
        let payment = self.payment_choice()?;

        let zone = address
            .delivery_zone_id
            .and_then(|id| self.zones.iter().find(|z| z.id == id))
            .cloned();
        let delivery_fee = zone.as_ref().map(|z| z.fee);
        let subtotal = cart.subtotal();

        Ok(CheckoutSummary {
            lines: cart.lines().to_vec(),
            item_count: cart.item_count(),
            subtotal,
            delivery_fee,
            total: subtotal + delivery_fee.unwrap_or(Money::ZERO),
            address,
            zone,
            payment,
            notes: self.notes.clone(),
        })
    }

    /// Create the order, empty the cart and start payment.
    ///
    /// Stock is re-checked first; if the cart had to change the customer is
    /// sent back to review it. A payment that fails to start does not undo
    /// the order: it is reported in [`PlacedOrder::payment`] and can be
    /// retried from the order.
    ///
    /// # Errors
    ///
    /// Returns an error if the wizard is not at review, the cart is empty or
    /// changed, or the server rejects the order.
    #[instrument(skip_all, fields(step = ?self.step))]
    pub async fn place_order(
        &self,
        cart: &mut CartStore,
        api: &ApiClient,
        payments: &PaymentService,
    ) -> Result<PlacedOrder, CheckoutError> {
        if self.step != CheckoutStep::Review {
            return Err(CheckoutError::NotReviewed);
        }
        if cart.cart().is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let changes = cart.refresh_stock(api).await?;
        if !changes.is_empty() {
            warn!(changed = changes.len(), "Cart changed before order placement");
            return Err(CheckoutError::CartChanged(changes));
        }

        let summary = self.summary(cart.cart())?;
        let request = CreateOrderRequest {
            items: summary
                .lines
                .iter()
                .map(|line| OrderItemInput {
                    product_id: line.product_id,
                    quantity: line.quantity,
                })
                .collect(),
            address_id: summary.address.id,
            payment_method: summary.payment.method(),
            phone_number: match &summary.payment {
                PaymentChoice::Mpesa { phone } => Some(phone.as_str().to_string()),
                PaymentChoice::Card => None,
            },
            notes: summary.notes.clone(),
        };

        let order = api.create_order(&request).await?;
        info!(order_id = %order.id, total = %order.total, "Order placed");
        let reference = order.reference();
        add_breadcrumb("checkout", "Order placed", Some(&[("order", reference.as_str())]));

        if let Err(e) = cart.clear() {
            warn!(error = %e, "Order placed but cart could not be cleared");
        }

        let payment = payments.initiate(order.id, &summary.payment).await;
        Ok(PlacedOrder { order, payment })
    }

    fn selected_address(&self) -> Result<&Address, CheckoutError> {
        if self.addresses.is_empty() {
            return Err(CheckoutError::NoAddresses);
        }
        self.address().ok_or(CheckoutError::AddressRequired)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::types::Product;
    use soko_core::{DeliveryZoneId, Email, UserId};

    fn address(id: i64, default: bool, zone: Option<i64>) -> Address {
        Address {
            id: AddressId::new(id),
            label: Some("Home".to_string()),
            recipient_name: "Otieno Omondi".to_string(),
            phone: "0712345678".to_string(),
            county: "Kisumu".to_string(),
            town: "Kisumu".to_string(),
            street: "Oginga Odinga St".to_string(),
            building: None,
            delivery_zone_id: zone.map(DeliveryZoneId::new),
            is_default: default,
        }
    }

    fn zones() -> Vec<DeliveryZone> {
        vec![DeliveryZone {
            id: DeliveryZoneId::new(3),
            name: "Western".to_string(),
            fee: Money::from_shillings(450),
            estimated_days: Some("2-3 days".to_string()),
        }]
    }

    fn user(phone: Option<&str>) -> User {
        User {
            id: UserId::new(1),
            name: "Otieno Omondi".to_string(),
            email: Email::parse("otieno@example.com").unwrap(),
            phone: phone.map(str::to_string),
            role: None,
        }
    }

    fn cart() -> Cart {
        let mut cart = Cart::new();
        let product = Product {
            id: ProductId::new(11),
            name: "Hisense 43\" TV".to_string(),
            description: None,
            price: Money::from_shillings(32_000),
            original_price: None,
            stock_quantity: 4,
            category_id: None,
            category_name: None,
            brand: None,
            image_url: None,
        };
        cart.add(&product, 2).unwrap();
        cart
    }

    #[test]
    fn test_default_address_preselected() {
        let wizard = CheckoutWizard::new(
            vec![address(1, false, None), address(2, true, Some(3))],
            zones(),
            None,
        );
        assert_eq!(wizard.address().unwrap().id, AddressId::new(2));
        assert_eq!(wizard.step(), CheckoutStep::Address);
    }

    #[test]
    fn test_address_step_guard() {
        let mut wizard = CheckoutWizard::new(vec![address(1, false, None)], zones(), None);
        assert!(matches!(wizard.next(), Err(CheckoutError::AddressRequired)));
        assert!(matches!(
            wizard.select_address(AddressId::new(99)),
            Err(CheckoutError::UnknownAddress(_))
        ));

        wizard.select_address(AddressId::new(1)).unwrap();
        assert_eq!(wizard.next().unwrap(), CheckoutStep::PaymentMethod);

        let mut empty = CheckoutWizard::new(Vec::new(), zones(), None);
        assert!(matches!(empty.next(), Err(CheckoutError::NoAddresses)));
    }

    #[test]
    fn test_payment_step_guard() {
        let mut wizard = CheckoutWizard::new(vec![address(1, true, None)], zones(), None);
        wizard.next().unwrap();

        assert!(matches!(
            wizard.next(),
            Err(CheckoutError::PaymentMethodRequired)
        ));

        wizard.select_payment_method(PaymentMethod::Mpesa);
        assert!(matches!(wizard.next(), Err(CheckoutError::PhoneRequired)));

        wizard.set_phone("not a phone");
        assert!(matches!(wizard.next(), Err(CheckoutError::InvalidPhone(_))));

        wizard.set_phone("+254 712 345 678");
        assert_eq!(wizard.next().unwrap(), CheckoutStep::Review);
    }

    #[test]
    fn test_mpesa_defaults_to_account_phone() {
        let account = user(Some("0799 888 777"));
        let mut wizard =
            CheckoutWizard::new(vec![address(1, true, None)], zones(), Some(&account));
        wizard.select_payment_method(PaymentMethod::Mpesa);

        match wizard.payment_choice().unwrap() {
            PaymentChoice::Mpesa { phone } => assert_eq!(phone.as_str(), "254799888777"),
            PaymentChoice::Card => panic!("expected M-Pesa"),
        }
    }

    #[test]
    fn test_back_keeps_choices() {
        let mut wizard = CheckoutWizard::new(vec![address(1, true, None)], zones(), None);
        wizard.next().unwrap();
        wizard.select_payment_method(PaymentMethod::Card);
        wizard.next().unwrap();

        assert_eq!(wizard.back(), CheckoutStep::PaymentMethod);
        assert_eq!(wizard.back(), CheckoutStep::Address);
        assert_eq!(wizard.back(), CheckoutStep::Address);
        assert_eq!(wizard.payment_method(), Some(PaymentMethod::Card));
    }

    #[test]
    fn test_summary_with_zone_fee() {
        let mut wizard = CheckoutWizard::new(vec![address(1, true, Some(3))], zones(), None);
        wizard.select_payment_method(PaymentMethod::Card);
        wizard.set_notes("  Call on arrival ");

        let summary = wizard.summary(&cart()).unwrap();
        assert_eq!(summary.item_count, 2);
        assert_eq!(summary.subtotal, Money::from_shillings(64_000));
        assert_eq!(summary.delivery_fee, Some(Money::from_shillings(450)));
        assert_eq!(summary.total, Money::from_shillings(64_450));
        assert_eq!(summary.notes.as_deref(), Some("Call on arrival"));
    }

    #[test]
    fn test_summary_without_zone() {
        let mut wizard = CheckoutWizard::new(vec![address(1, true, None)], zones(), None);
        wizard.select_payment_method(PaymentMethod::Card);

        let summary = wizard.summary(&cart()).unwrap();
        assert_eq!(summary.delivery_fee, None);
        assert_eq!(summary.total, summary.subtotal);

        assert!(matches!(
            wizard.summary(&Cart::new()),
            Err(CheckoutError::EmptyCart)
        ));
    }
}
