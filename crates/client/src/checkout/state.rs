//! Checkout state machine states.

use crate::api::OrderRef;
use crate::error::CheckoutError;
use crate::settlement::PaymentSession;

/// Where a checkout attempt currently is.
///
/// ```text
/// Idle -> Validating -> Creating -> Finalizing ------> Settled
///                                \-> AwaitingPayment -/
/// ```
///
/// `Failed` is reachable from every non-terminal state and allows a retry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CheckoutState {
    #[default]
    Idle,
    Validating,
    Creating,
    /// Order accepted, cash or QR path wrapping up.
    Finalizing { order: OrderRef },
    /// Order accepted, waiting for the gateway to confirm payment.
    AwaitingPayment { session: PaymentSession },
    Settled { order: OrderRef },
    Failed {
        error: CheckoutError,
        /// Set when the order was created before the failure.
        order: Option<OrderRef>,
    },
}

impl CheckoutState {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Creating => "creating",
            Self::Finalizing { .. } => "finalizing",
            Self::AwaitingPayment { .. } => "awaiting_payment",
            Self::Settled { .. } => "settled",
            Self::Failed { .. } => "failed",
        }
    }

    /// Returns `true` while a submission is being processed.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Validating
                | Self::Creating
                | Self::Finalizing { .. }
                | Self::AwaitingPayment { .. }
        )
    }

    /// Returns `true` if a new submission may start from this state.
    #[must_use]
    pub const fn accepts_submit(&self) -> bool {
        matches!(self, Self::Idle | Self::Failed { .. })
    }

    /// Gateway page to show, if a payment is pending.
    #[must_use]
    pub fn payment_url(&self) -> Option<&str> {
        match self {
            Self::AwaitingPayment { session } => Some(&session.payment_url),
            _ => None,
        }
    }

    /// The error that ended the attempt, if it failed.
    #[must_use]
    pub const fn error(&self) -> Option<&CheckoutError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a successful `submit` call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Cash or QR order placed; the cart has been cleared.
    Settled(OrderRef),
    /// Gateway order placed; the user must complete payment at the URL.
    AwaitingPayment(PaymentSession),
}
