//! Promo code evaluation.
//!
//! [`evaluate`] decides whether a code entered at checkout applies to the
//! current cart and how much it takes off. An unknown or ineligible code is
//! not an error: the evaluation is simply not applicable and carries a
//! [`PromoIneligible`] reason for display.

mod catalog;

pub use catalog::PromoCatalog;

use chrono::{DateTime, Utc};
use deliverly_core::{Money, PromoCodeId, UserId};
use serde::Serialize;
use thiserror::Error;

pub use crate::api::PromoCode;
use crate::cart::Cart;

/// Why an entered promo code does not apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PromoIneligible {
    #[error("Promo code not found")]
    UnknownCode,

    #[error("Order total must be at least {min_order_sum} for this promo code")]
    BelowMinimum { min_order_sum: Money },

    #[error("Promo code does not apply to any product in the cart")]
    NoEligibleProducts,

    #[error("Promo code has expired")]
    Expired,

    #[error("Promo code is not active yet")]
    NotYetActive,

    #[error("Promo code usage limit reached")]
    UsageLimitReached,
}

/// Result of evaluating a candidate code against the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromoEvaluation {
    pub applicable: bool,
    /// Discount to apply. Zero unless applicable.
    pub discount: Money,
    /// Matched catalog entry, if the code is known.
    pub promo_id: Option<PromoCodeId>,
    /// The current user already consumed this code.
    pub already_consumed: bool,
    /// Set when a code was entered but does not apply.
    pub reason: Option<PromoIneligible>,
}

impl PromoEvaluation {
    /// No code entered.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            applicable: false,
            discount: Money::ZERO,
            promo_id: None,
            already_consumed: false,
            reason: None,
        }
    }

    const fn rejected(promo_id: Option<PromoCodeId>, reason: PromoIneligible) -> Self {
        Self {
            applicable: false,
            discount: Money::ZERO,
            promo_id,
            already_consumed: false,
            reason: Some(reason),
        }
    }

    /// Promo reference to attach to the order.
    #[must_use]
    pub const fn applied_promo(&self) -> Option<PromoCodeId> {
        if self.applicable { self.promo_id } else { None }
    }

    /// Whether the workflow should record the current user as a consumer.
    #[must_use]
    pub const fn needs_consumption(&self) -> bool {
        self.applicable && !self.already_consumed && self.promo_id.is_some()
    }
}

/// Evaluate a candidate code at the current time.
#[must_use]
pub fn evaluate(
    code: &str,
    cart: &Cart,
    delivery_fee: Money,
    user: UserId,
    catalog: &[PromoCode],
) -> PromoEvaluation {
    evaluate_at(code, cart, delivery_fee, user, catalog, Utc::now())
}

/// Evaluate a candidate code as of `now`.
///
/// Matching is case-insensitive on the trimmed candidate. A matched code
/// must be inside its validity window, below its usage limit, reach its
/// minimum order sum and, when restricted to products, share at least one
/// product with the cart. The discount is capped at `subtotal + delivery_fee`.
#[must_use]
pub fn evaluate_at(
    code: &str,
    cart: &Cart,
    delivery_fee: Money,
    user: UserId,
    catalog: &[PromoCode],
    now: DateTime<Utc>,
) -> PromoEvaluation {
    let candidate = code.trim();
    if candidate.is_empty() {
        return PromoEvaluation::none();
    }

    let candidate = candidate.to_lowercase();
    let Some(promo) = catalog
        .iter()
        .find(|p| p.code.trim().to_lowercase() == candidate)
    else {
        return PromoEvaluation::rejected(None, PromoIneligible::UnknownCode);
    };

    if let Some(reason) = window_violation(promo, now) {
        return PromoEvaluation::rejected(Some(promo.id), reason);
    }

    let subtotal = cart.total();
    if subtotal < promo.min_order_sum {
        return PromoEvaluation::rejected(
            Some(promo.id),
            PromoIneligible::BelowMinimum {
                min_order_sum: promo.min_order_sum,
            },
        );
    }

    if !promo.on_products.is_empty() && !cart.contains_any(&promo.on_products) {
        return PromoEvaluation::rejected(Some(promo.id), PromoIneligible::NoEligibleProducts);
    }

    let cap = subtotal.saturating_add(delivery_fee);
    PromoEvaluation {
        applicable: true,
        discount: promo.discount_amount.min(cap),
        promo_id: Some(promo.id),
        already_consumed: promo.users_used.contains(&user),
        reason: None,
    }
}

fn window_violation(promo: &PromoCode, now: DateTime<Utc>) -> Option<PromoIneligible> {
    if promo.valid_from.is_some_and(|from| now < from) {
        return Some(PromoIneligible::NotYetActive);
    }
    if promo.valid_until.is_some_and(|until| now > until) {
        return Some(PromoIneligible::Expired);
    }
    if let (Some(limit), Some(used)) = (promo.usage_limit, promo.used_count)
        && used >= limit
    {
        return Some(PromoIneligible::UsageLimitReached);
    }
    None
}
