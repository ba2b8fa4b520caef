//! Checkout input and local validation.

use deliverly_core::{Money, PaymentMethod};
use serde::{Deserialize, Serialize};

use crate::cart::Cart;
use crate::error::ValidationError;
use crate::pricing::check_courier_price;

/// Structured delivery address entered at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub street: String,
    #[serde(default)]
    pub house: String,
    #[serde(default)]
    pub flat: String,
    #[serde(default)]
    pub comment: Option<String>,
}

impl DeliveryAddress {
    /// Returns `true` when no street was entered.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.street.trim().is_empty()
    }

    /// Merge the address fields into the single string the backend stores.
    #[must_use]
    pub fn formatted(&self) -> String {
        let mut address = format!(
            "{}, д. {}, кв. {}",
            self.street.trim(),
            self.house.trim(),
            self.flat.trim()
        );
        if let Some(comment) = self.comment.as_deref().map(str::trim)
            && !comment.is_empty()
        {
            address.push_str(", ");
            address.push_str(comment);
        }
        address
    }
}

/// A storefront order for the current cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOrderRequest {
    pub address: DeliveryAddress,
    pub payment_method: Option<PaymentMethod>,
    /// Promo code as typed by the user; blank means none.
    pub promo_code: String,
}

/// A point-to-point courier order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourierOrderRequest {
    pub from: String,
    pub to: String,
    /// User-entered delivery price.
    pub price: Money,
    pub payment_method: Option<PaymentMethod>,
    pub comment: String,
}

/// What a checkout attempt submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRequest {
    Store(StoreOrderRequest),
    Courier(CourierOrderRequest),
}

impl OrderRequest {
    #[must_use]
    pub const fn payment_method(&self) -> Option<PaymentMethod> {
        match self {
            Self::Store(request) => request.payment_method,
            Self::Courier(request) => request.payment_method,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Store(_) => "store",
            Self::Courier(_) => "courier",
        }
    }
}

/// Check storefront preconditions against the cart.
///
/// Returns the chosen payment method.
///
/// # Errors
///
/// Returns the first failed precondition: address, payment method, then
/// cart contents.
pub fn validate_store(
    request: &StoreOrderRequest,
    cart: &Cart,
) -> Result<PaymentMethod, ValidationError> {
    if request.address.is_blank() {
        return Err(ValidationError::MissingAddress);
    }
    let payment_method = request
        .payment_method
        .ok_or(ValidationError::MissingPaymentMethod)?;
    if cart.is_empty() {
        return Err(ValidationError::EmptyCart);
    }
    Ok(payment_method)
}

/// Check courier preconditions.
///
/// Returns the chosen payment method.
///
/// # Errors
///
/// Returns the first failed precondition: addresses, payment method, then
/// the price floor.
pub fn validate_courier(
    request: &CourierOrderRequest,
    floor: Money,
) -> Result<PaymentMethod, ValidationError> {
    if request.from.trim().is_empty() || request.to.trim().is_empty() {
        return Err(ValidationError::MissingCourierAddresses);
    }
    let payment_method = request
        .payment_method
        .ok_or(ValidationError::MissingPaymentMethod)?;
    check_courier_price(request.price, floor)?;
    Ok(payment_method)
}
