//! Order total calculation.

use deliverly_core::Money;
use serde::Serialize;

use crate::error::ValidationError;

/// Price breakdown shown before submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    /// Sum of line items.
    pub subtotal: Money,
    pub delivery_fee: Money,
    /// `subtotal + delivery_fee`.
    pub total: Money,
    pub discount: Money,
    /// `total - discount`, never below zero.
    pub payable: Money,
}

/// Combine subtotal, delivery fee and discount into the payable amount.
#[must_use]
pub const fn compute_totals(subtotal: Money, delivery_fee: Money, discount: Money) -> OrderTotals {
    let total = subtotal.saturating_add(delivery_fee);
    OrderTotals {
        subtotal,
        delivery_fee,
        total,
        discount,
        payable: total.saturating_sub(discount),
    }
}

/// Check a user-entered courier price against the configured floor.
///
/// # Errors
///
/// Returns `ValidationError::PriceBelowFloor` when `price < floor`.
pub fn check_courier_price(price: Money, floor: Money) -> Result<Money, ValidationError> {
    if price < floor {
        return Err(ValidationError::PriceBelowFloor { price, floor });
    }
    Ok(price)
}
