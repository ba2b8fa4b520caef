//! Status enums for orders and payments.
//!
//! Wire values match the backend exactly: payment methods are `qr`,
//! `freedom` (the card gateway) and `cash`; order statuses are `waiting`,
//! `en_route` and `delivered`.

use serde::{Deserialize, Serialize};

/// Delivery status of an order.
///
/// New orders are always created as [`OrderStatus::Waiting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted, waiting for a courier.
    #[default]
    Waiting,
    /// Picked up and on the way.
    EnRoute,
    /// Handed over to the customer.
    Delivered,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::EnRoute => write!(f, "en_route"),
            Self::Delivered => write!(f, "delivered"),
        }
    }
}

/// Payment method chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// QR transfer, confirmed offline.
    Qr,
    /// Card payment through the external gateway redirect.
    #[serde(rename = "freedom")]
    Gateway,
    /// Cash on delivery.
    Cash,
}

impl PaymentMethod {
    /// Returns `true` for methods that require an external payment session
    /// and asynchronous status confirmation.
    #[must_use]
    pub const fn is_gateway(self) -> bool {
        matches!(self, Self::Gateway)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Qr => write!(f, "qr"),
            Self::Gateway => write!(f, "freedom"),
            Self::Cash => write!(f, "cash"),
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qr" => Ok(Self::Qr),
            "freedom" | "card" => Ok(Self::Gateway),
            "cash" => Ok(Self::Cash),
            _ => Err(format!("invalid payment method: {s}")),
        }
    }
}
