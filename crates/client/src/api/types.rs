//! Request and response schemas for the backend REST API.

use chrono::{DateTime, Utc};
use deliverly_core::{
    CourierOrderId, Money, OrderId, OrderStatus, PaymentMethod, ProductId, PromoCodeId, UserId,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// Users
// =============================================================================

/// The authenticated user (`GET /auth/users/me/`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

// =============================================================================
// Promo codes
// =============================================================================

/// A promo code from the backend catalog (`GET /promocodes/`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: PromoCodeId,
    pub code: String,
    pub discount_amount: Money,
    #[serde(default)]
    pub min_order_sum: Money,
    /// Products the code is restricted to. Empty means any product.
    #[serde(default)]
    pub on_products: Vec<ProductId>,
    /// Users that already consumed the code.
    #[serde(default)]
    pub users_used: Vec<UserId>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub used_count: Option<u32>,
}

/// Body of `PATCH /promocodes/{id}/`.
#[derive(Debug, Clone, Serialize)]
pub struct PromoUsageUpdate {
    pub users_used: Vec<UserId>,
}

// =============================================================================
// Orders
// =============================================================================

/// Body of `POST /orders/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    pub delivery_address: String,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub items: Vec<OrderLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promocode_used: Option<PromoCodeId>,
    pub total_price: Money,
    pub user: UserId,
}

/// A product reference in an order. Prices are resolved server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product: ProductId,
    pub quantity: u32,
}

/// Body of `POST /orders_client/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCourierOrder {
    pub delivery_address_a: String,
    pub delivery_address_b: String,
    pub delivery_price: Money,
    pub payment_method: PaymentMethod,
    pub comment: String,
    pub user: UserId,
}

/// Response of a create endpoint: only the assigned id is used.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct Created<Id> {
    pub id: Id,
}

/// Body of `PATCH /orders/{id}/` and `PATCH /orders_client/{id}/`.
#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct MarkPaid {
    pub paid: bool,
}

// =============================================================================
// Payments
// =============================================================================

/// A created order of either kind.
///
/// Storefront and courier orders use parallel endpoint families for payment
/// sessions, status polling and updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderRef {
    Store(OrderId),
    Courier(CourierOrderId),
}

impl OrderRef {
    /// Raw order id used in request bodies and query strings.
    #[must_use]
    pub const fn order_id(self) -> i64 {
        match self {
            Self::Store(id) => id.as_i64(),
            Self::Courier(id) => id.as_i64(),
        }
    }

    pub(crate) const fn create_session_path(self) -> &'static str {
        match self {
            Self::Store(_) => "payments/store/create/",
            Self::Courier(_) => "payments/client/create/",
        }
    }

    /// Key the create endpoint expects the order id under.
    pub(crate) const fn create_session_key(self) -> &'static str {
        match self {
            Self::Store(_) => "order_id",
            Self::Courier(_) => "client_order_id",
        }
    }

    pub(crate) const fn status_path(self) -> &'static str {
        match self {
            Self::Store(_) => "payments/store/status/",
            Self::Courier(_) => "payments/client/status/",
        }
    }

    pub(crate) fn order_path(self) -> String {
        match self {
            Self::Store(id) => format!("orders/{id}/"),
            Self::Courier(id) => format!("orders_client/{id}/"),
        }
    }
}

impl std::fmt::Display for OrderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(id) => write!(f, "order {id}"),
            Self::Courier(id) => write!(f, "courier order {id}"),
        }
    }
}

/// Response of a payment-session create endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentSessionCreated {
    /// Gateway page the user completes the payment on.
    pub payment_url: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Response of a payment status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PaymentStatus {
    #[serde(default)]
    pub pg_status: Option<String>,
    #[serde(default)]
    pub pg_payment_status: Option<String>,
}

impl PaymentStatus {
    /// Returns `true` once the gateway reports the payment as completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.pg_payment_status.as_deref() == Some("success")
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// Body of `POST /users/{id}/notifications/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewNotification {
    pub user: UserId,
    pub subject: String,
    pub message: String,
    pub is_read: bool,
}

impl NewNotification {
    /// Order confirmation sent after a storefront order is accepted.
    #[must_use]
    pub fn order_created(user: UserId, order_id: OrderId) -> Self {
        Self {
            user,
            subject: "Заказ создан".to_string(),
            message: format!("Ваш заказ №{order_id} создан"),
            is_read: false,
        }
    }
}
