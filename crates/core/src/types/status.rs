//! Status enums mirrored from the marketplace API.
//!
//! The server owns every state transition; the client only reads these values
//! and decides how to present them (and when to stop polling).

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a status string is not recognised.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownStatus {
    kind: &'static str,
    value: String,
}

/// Order fulfilment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Fulfilment stages in the order a parcel moves through them.
    pub const PROGRESSION: [Self; 5] = [
        Self::Pending,
        Self::Confirmed,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
    ];

    /// Whether the customer may still cancel the order.
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    /// Position in [`Self::PROGRESSION`], or `None` for cancelled orders.
    #[must_use]
    pub fn stage(self) -> Option<usize> {
        Self::PROGRESSION.iter().position(|s| *s == self)
    }

    /// Label shown to customers.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Confirmed => "Confirmed",
            Self::Processing => "Processing",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Payment status for an order.
///
/// `Timeout` is never sent by the server; the payment poller reports it when
/// the attempt budget runs out without a terminal answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl PaymentStatus {
    /// Whether no further transition is expected from the server.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the customer can be asked to pay (again).
    #[must_use]
    pub const fn is_payable(self) -> bool {
        !matches!(self, Self::Completed)
    }

    /// Label shown to customers.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Awaiting payment",
            Self::Completed => "Paid",
            Self::Failed => "Payment failed",
            Self::Cancelled => "Payment cancelled",
            Self::Timeout => "Payment not confirmed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the customer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// M-Pesa STK push to the customer's phone.
    Mpesa,
    /// Card payment through the gateway's hosted page.
    Card,
}

impl PaymentMethod {
    /// Wire value used by the API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mpesa => "mpesa",
            Self::Card => "card",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mpesa => f.write_str("M-Pesa"),
            Self::Card => f.write_str("Card"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mpesa" | "m-pesa" => Ok(Self::Mpesa),
            "card" => Ok(Self::Card),
            other => Err(UnknownStatus {
                kind: "payment method",
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_payment_statuses() {
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::Timeout.is_terminal());
    }

    #[test]
    fn test_payment_status_wire_format() {
        let status: PaymentStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(status, PaymentStatus::Completed);
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Timeout).unwrap(),
            "\"timeout\""
        );
    }

    #[test]
    fn test_order_cancellable() {
        assert!(OrderStatus::Pending.is_cancellable());
        assert!(OrderStatus::Confirmed.is_cancellable());
        assert!(!OrderStatus::Shipped.is_cancellable());
        assert!(!OrderStatus::Cancelled.is_cancellable());
    }

    #[test]
    fn test_order_stage() {
        assert_eq!(OrderStatus::Pending.stage(), Some(0));
        assert_eq!(OrderStatus::Delivered.stage(), Some(4));
        assert_eq!(OrderStatus::Cancelled.stage(), None);
    }

    #[test]
    fn test_payment_method_from_str() {
        assert_eq!("M-Pesa".parse::<PaymentMethod>().unwrap(), PaymentMethod::Mpesa);
        assert_eq!("card".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert!("cash".parse::<PaymentMethod>().is_err());
    }
}
