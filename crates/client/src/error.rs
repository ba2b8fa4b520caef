//! Checkout error types.
//!
//! Every failure inside a checkout attempt ends up as a [`CheckoutError`].
//! Its [`CheckoutError::user_notice`] is the one message shown to the user;
//! transport details are logged, never displayed.

use deliverly_core::Money;
use thiserror::Error;

use crate::api::ApiError;
use crate::promotions::PromoIneligible;

/// Local precondition failures detected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a delivery address")]
    MissingAddress,

    #[error("Please choose a payment method")]
    MissingPaymentMethod,

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("Please enter both pickup and delivery addresses")]
    MissingCourierAddresses,

    #[error("Delivery price {price} is below the minimum of {floor}")]
    PriceBelowFloor { price: Money, floor: Money },

    #[error("{0}")]
    PromoNotApplicable(PromoIneligible),
}

/// Errors that end a checkout attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// Local input is incomplete or invalid.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The backend could not be reached or answered unreadably.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend rejected the request.
    #[error("Server rejected request: {status} - {detail}")]
    ServerRejection { status: u16, detail: String },

    /// The bearer credential is missing or no longer accepted.
    #[error("Unauthorized")]
    Unauthorized,

    /// The gateway never confirmed the payment.
    #[error("Payment was not confirmed in time")]
    PaymentTimedOut,

    /// A submission for this checkout is already running.
    #[error("Checkout already in progress")]
    AlreadyInFlight,

    /// This checkout already completed.
    #[error("Checkout already settled")]
    AlreadySettled,
}

impl CheckoutError {
    /// The single message to show the user for this error.
    #[must_use]
    pub fn user_notice(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::Network(_) => "Network error, please try again".to_string(),
            Self::ServerRejection { detail, .. } if !detail.is_empty() => detail.clone(),
            Self::ServerRejection { status, .. } => {
                format!("The server could not process the order (error {status})")
            }
            Self::Unauthorized => "Please sign in again".to_string(),
            Self::PaymentTimedOut => {
                "Payment was not confirmed. Your order is saved and can be paid later".to_string()
            }
            Self::AlreadyInFlight => "Your order is already being placed".to_string(),
            Self::AlreadySettled => "This order has already been placed".to_string(),
        }
    }

    /// Returns `true` if the user can fix the input and retry.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<ApiError> for CheckoutError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Rejected { status, detail } => Self::ServerRejection { status, detail },
            ApiError::Unauthorized => Self::Unauthorized,
            ApiError::Http(e) => Self::Network(e.to_string()),
            ApiError::Parse(e) | ApiError::InvalidUrl(e) => Self::Network(e),
        }
    }
}

impl From<PromoIneligible> for ValidationError {
    fn from(reason: PromoIneligible) -> Self {
        Self::PromoNotApplicable(reason)
    }
}
