//! Order submission workflow.
//!
//! A [`Checkout`] drives one checkout attempt through the state machine in
//! [`CheckoutState`]:
//!
//! 1. local validation (no network call when it fails)
//! 2. current user and promo resolution
//! 3. exactly one order-creation request
//! 4. cash/QR: optional notification, cart cleared, settled
//! 5. gateway: payment session created, then handed to the
//!    [`SettlementMonitor`] which settles or cancels it
//!
//! Observers follow progress through [`Checkout::subscribe`]. Every request
//! carries the attempt id as `X-Request-Id`.
//!
//! # Example
//!
//! ```rust,ignore
//! let checkout = Checkout::new(&client, catalog, cart.clone(), CheckoutSettings::from_config(&config));
//! match checkout.submit(OrderRequest::Store(request)).await {
//!     Ok(SubmitOutcome::AwaitingPayment(session)) => open_browser(&session.payment_url),
//!     Ok(SubmitOutcome::Settled(order)) => show_success(order),
//!     Err(e) => show_notice(&e.user_notice()),
//! }
//! ```

mod request;
mod state;

pub use request::{
    CourierOrderRequest, DeliveryAddress, OrderRequest, StoreOrderRequest, validate_courier,
    validate_store,
};
pub use state::{CheckoutState, SubmitOutcome};

use std::sync::Arc;

use deliverly_core::{Money, OrderId, OrderStatus, UserId};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::api::{
    ApiError, BackendClient, NewCourierOrder, NewNotification, NewOrder, OrderRef, PromoCode,
};
use crate::cart::{Cart, SharedCart};
use crate::config::ClientConfig;
use crate::error::{CheckoutError, ValidationError};
use crate::pricing::{OrderTotals, compute_totals};
use crate::promotions::{PromoCatalog, PromoEvaluation, evaluate};
use crate::settlement::{MonitorSettings, PaymentSession, SettlementMonitor, SettlementOutcome};

/// Pricing and behavior settings for checkout attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutSettings {
    pub delivery_fee: Money,
    pub courier_min_price: Money,
    pub notifications_enabled: bool,
    pub monitor: MonitorSettings,
}

impl CheckoutSettings {
    #[must_use]
    pub const fn from_config(config: &ClientConfig) -> Self {
        Self {
            delivery_fee: config.delivery_fee,
            courier_min_price: config.courier_min_price,
            notifications_enabled: config.notifications_enabled,
            monitor: MonitorSettings::from_config(config),
        }
    }
}

/// Price preview for the current cart and an entered promo code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub totals: OrderTotals,
    pub promo: PromoEvaluation,
}

/// Failure inside a submission, with the order if one was created.
struct Failure {
    error: CheckoutError,
    order: Option<OrderRef>,
}

impl Failure {
    fn after_order(error: impl Into<CheckoutError>, order: OrderRef) -> Self {
        Self {
            error: error.into(),
            order: Some(order),
        }
    }
}

impl From<CheckoutError> for Failure {
    fn from(error: CheckoutError) -> Self {
        Self { error, order: None }
    }
}

impl From<ApiError> for Failure {
    fn from(error: ApiError) -> Self {
        CheckoutError::from(error).into()
    }
}

impl From<ValidationError> for Failure {
    fn from(error: ValidationError) -> Self {
        CheckoutError::from(error).into()
    }
}

/// Resolves a submission whose future was dropped before it finished.
///
/// An abandoned `Validating` or `Creating` attempt becomes `Failed` so the
/// user can retry. An abandoned `Finalizing` store order was already
/// accepted, so it settles and the cart is cleared.
struct SubmitGuard {
    state: Arc<watch::Sender<CheckoutState>>,
    attempt_id: Uuid,
    /// Set once the backend accepted the order.
    order: Option<OrderRef>,
    /// Cart to clear when an accepted order settles.
    cart: Option<SharedCart>,
}

impl Drop for SubmitGuard {
    fn drop(&mut self) {
        let mut settled = false;
        let changed = self.state.send_if_modified(|state| match state {
            CheckoutState::Validating | CheckoutState::Creating => {
                *state = CheckoutState::Failed {
                    error: CheckoutError::Network("submission cancelled".to_string()),
                    order: self.order,
                };
                true
            }
            CheckoutState::Finalizing { order } => {
                let order = *order;
                *state = CheckoutState::Settled { order };
                settled = true;
                true
            }
            _ => false,
        });
        if !changed {
            return;
        }
        if settled && let Some(cart) = &self.cart {
            cart.clear();
        }
        warn!(
            attempt = %self.attempt_id,
            order = ?self.order,
            "Submission abandoned before completion"
        );
    }
}

// =============================================================================
// Checkout
// =============================================================================

/// One checkout attempt.
///
/// Dropping the checkout stops any payment poller it started.
pub struct Checkout {
    attempt_id: Uuid,
    client: BackendClient,
    promos: PromoCatalog,
    cart: SharedCart,
    settings: CheckoutSettings,
    state: Arc<watch::Sender<CheckoutState>>,
    monitor: SettlementMonitor,
}

impl std::fmt::Debug for Checkout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkout")
            .field("attempt_id", &self.attempt_id)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Checkout {
    /// Open a checkout attempt over the shared session cart.
    #[must_use]
    pub fn new(
        client: &BackendClient,
        promos: PromoCatalog,
        cart: SharedCart,
        settings: CheckoutSettings,
    ) -> Self {
        let attempt_id = Uuid::new_v4();
        let client = client.with_request_id(attempt_id);
        let (state, _) = watch::channel(CheckoutState::Idle);
        let monitor = SettlementMonitor::new(client.clone(), settings.monitor);
        debug!(attempt = %attempt_id, "Checkout opened");

        Self {
            attempt_id,
            client,
            promos,
            cart,
            settings,
            state: Arc::new(state),
            monitor,
        }
    }

    /// Id sent as `X-Request-Id` with every request of this attempt.
    #[must_use]
    pub const fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CheckoutState {
        self.state.borrow().clone()
    }

    /// Receive every state change from now on.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CheckoutState> {
        self.state.subscribe()
    }

    #[must_use]
    pub const fn cart(&self) -> &SharedCart {
        &self.cart
    }

    /// Returns `true` while a payment poller is running.
    ///
    /// A checkout that is `AwaitingPayment` with no poller had its status
    /// checks fail; only [`Checkout::cancel_payment`] moves it on.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.monitor.is_active()
    }

    /// Price the current cart with an optional promo code.
    ///
    /// A blank code needs no network call.
    ///
    /// # Errors
    ///
    /// Returns error if the user or promo catalog cannot be fetched.
    #[instrument(skip(self), fields(attempt = %self.attempt_id))]
    pub async fn quote(&self, promo_code: &str) -> Result<Quote, CheckoutError> {
        let cart = self.cart.snapshot();
        let promo = if promo_code.trim().is_empty() {
            PromoEvaluation::none()
        } else {
            let user = self.client.current_user().await?;
            self.evaluate_promo(promo_code, &cart, user.id).await?.0
        };

        Ok(Quote {
            totals: compute_totals(cart.total(), self.settings.delivery_fee, promo.discount),
            promo,
        })
    }

    /// Submit an order.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInFlight` or `AlreadySettled` without side effects if
    /// this attempt is busy or done. Any other error has moved the checkout to
    /// [`CheckoutState::Failed`]; the cart is kept and the user may retry.
    #[instrument(skip(self, request), fields(attempt = %self.attempt_id, kind = request.kind()))]
    pub async fn submit(&self, request: OrderRequest) -> Result<SubmitOutcome, CheckoutError> {
        self.begin()?;
        let mut guard = SubmitGuard {
            state: Arc::clone(&self.state),
            attempt_id: self.attempt_id,
            order: None,
            cart: None,
        };

        let result = match &request {
            OrderRequest::Store(request) => {
                guard.cart = Some(self.cart.clone());
                self.submit_store(request, &mut guard).await
            }
            OrderRequest::Courier(request) => self.submit_courier(request, &mut guard).await,
        };

        result.map_err(|failure| {
            self.fail(failure.error.clone(), failure.order);
            failure.error
        })
    }

    /// Close the payment view.
    ///
    /// Stops polling without finalizing: the order stays created and unpaid
    /// and the cart is kept. The checkout returns to `Idle`.
    ///
    /// Returns `false` if no payment was pending or the gateway already
    /// confirmed it.
    pub fn cancel_payment(&self) -> bool {
        // Holding the state lock orders this against `open_payment`
        let reset = self.state.send_if_modified(|state| {
            if !matches!(state, CheckoutState::AwaitingPayment { .. }) {
                return false;
            }
            if !self.monitor.cancel() && self.monitor.is_active() {
                // Poller claimed the session and is finalizing
                return false;
            }
            *state = CheckoutState::Idle;
            true
        });
        if reset {
            info!(attempt = %self.attempt_id, state = "idle", "Payment cancelled by user");
        }
        reset
    }

    // =========================================================================
    // Submission steps
    // =========================================================================

    /// Atomically move from `Idle`/`Failed` to `Validating`.
    fn begin(&self) -> Result<(), CheckoutError> {
        let mut rejection = None;
        self.state.send_if_modified(|state| {
            if state.accepts_submit() {
                *state = CheckoutState::Validating;
                true
            } else {
                rejection = Some(if matches!(state, CheckoutState::Settled { .. }) {
                    CheckoutError::AlreadySettled
                } else {
                    CheckoutError::AlreadyInFlight
                });
                false
            }
        });

        if let Some(err) = rejection {
            warn!(attempt = %self.attempt_id, error = %err, "Submit ignored");
            return Err(err);
        }
        info!(attempt = %self.attempt_id, state = "validating", "Checkout state changed");
        Ok(())
    }

    async fn submit_store(
        &self,
        request: &StoreOrderRequest,
        guard: &mut SubmitGuard,
    ) -> Result<SubmitOutcome, Failure> {
        let cart = self.cart.snapshot();
        let payment_method = validate_store(request, &cart)?;

        let user = self.client.current_user().await?;
        let (promo, catalog) = self
            .evaluate_promo(&request.promo_code, &cart, user.id)
            .await?;
        if let Some(reason) = promo.reason.clone() {
            return Err(ValidationError::PromoNotApplicable(reason).into());
        }

        let totals = compute_totals(cart.total(), self.settings.delivery_fee, promo.discount);
        let order = NewOrder {
            delivery_address: request.address.formatted(),
            payment_method,
            status: OrderStatus::Waiting,
            items: cart.order_lines(),
            promocode_used: promo.applied_promo(),
            total_price: totals.payable,
            user: user.id,
        };

        self.transition(CheckoutState::Creating);
        let order_id = self.client.create_order(&order).await.map_err(|e| {
            error!(attempt = %self.attempt_id, error = %e, "Order rejected");
            e
        })?;
        let order_ref = OrderRef::Store(order_id);
        guard.order = Some(order_ref);
        info!(
            attempt = %self.attempt_id,
            order = %order_id,
            payable = %totals.payable,
            discount = %totals.discount,
            "Order created"
        );

        if promo.needs_consumption()
            && let Some(catalog) = catalog
        {
            self.consume_promo(&promo, &catalog, user.id).await;
        }

        if payment_method.is_gateway() {
            return self
                .open_payment(order_ref, Some(self.cart.clone()))
                .await;
        }

        self.transition(CheckoutState::Finalizing { order: order_ref });
        if self.settings.notifications_enabled {
            self.notify_order_created(user.id, order_id).await;
        }
        self.cart.clear();
        self.transition(CheckoutState::Settled { order: order_ref });
        Ok(SubmitOutcome::Settled(order_ref))
    }

    async fn submit_courier(
        &self,
        request: &CourierOrderRequest,
        guard: &mut SubmitGuard,
    ) -> Result<SubmitOutcome, Failure> {
        let payment_method = validate_courier(request, self.settings.courier_min_price)?;

        let user = self.client.current_user().await?;
        let order = NewCourierOrder {
            delivery_address_a: request.from.trim().to_string(),
            delivery_address_b: request.to.trim().to_string(),
            delivery_price: request.price,
            payment_method,
            comment: request.comment.trim().to_string(),
            user: user.id,
        };

        self.transition(CheckoutState::Creating);
        let order_id = self.client.create_courier_order(&order).await.map_err(|e| {
            error!(attempt = %self.attempt_id, error = %e, "Courier order rejected");
            e
        })?;
        let order_ref = OrderRef::Courier(order_id);
        guard.order = Some(order_ref);
        info!(
            attempt = %self.attempt_id,
            order = %order_id,
            price = %request.price,
            "Courier order created"
        );

        if payment_method.is_gateway() {
            return self.open_payment(order_ref, None).await;
        }

        self.transition(CheckoutState::Finalizing { order: order_ref });
        self.transition(CheckoutState::Settled { order: order_ref });
        Ok(SubmitOutcome::Settled(order_ref))
    }

    /// Create the gateway session and hand it to the settlement monitor.
    async fn open_payment(
        &self,
        order: OrderRef,
        cart: Option<SharedCart>,
    ) -> Result<SubmitOutcome, Failure> {
        let created = self.client.create_payment_session(order).await.map_err(|e| {
            // The order stays on the backend unpaid; nothing compensates it
            error!(
                attempt = %self.attempt_id,
                order = %order,
                error = %e,
                "Payment session creation failed"
            );
            Failure::after_order(e, order)
        })?;

        let session = PaymentSession::new(order, created);
        let state = Arc::clone(&self.state);
        let attempt_id = self.attempt_id;
        let on_finish = move |outcome: SettlementOutcome| {
            let next = match outcome {
                SettlementOutcome::Settled => CheckoutState::Settled { order },
                SettlementOutcome::TimedOut => CheckoutState::Failed {
                    error: CheckoutError::PaymentTimedOut,
                    order: Some(order),
                },
                SettlementOutcome::PollFailed | SettlementOutcome::Cancelled => return,
            };
            let name = next.name();
            let changed = state.send_if_modified(|current| {
                let pending = matches!(
                    current,
                    CheckoutState::AwaitingPayment { session } if session.target == order
                );
                if pending {
                    *current = next;
                }
                pending
            });
            if changed {
                info!(attempt = %attempt_id, state = name, "Checkout state changed");
            }
        };

        // Publish and start under one state lock so `cancel_payment` sees both or neither
        info!(attempt = %self.attempt_id, state = "awaiting_payment", "Checkout state changed");
        self.state.send_modify(|current| {
            *current = CheckoutState::AwaitingPayment {
                session: session.clone(),
            };
            self.monitor.start(&session, cart, on_finish);
        });

        Ok(SubmitOutcome::AwaitingPayment(session))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn transition(&self, next: CheckoutState) {
        info!(attempt = %self.attempt_id, state = next.name(), "Checkout state changed");
        self.state.send_replace(next);
    }

    fn fail(&self, error: CheckoutError, order: Option<OrderRef>) {
        match &error {
            CheckoutError::Validation(e) => {
                info!(attempt = %self.attempt_id, reason = %e, "Checkout validation failed");
            }
            other => {
                warn!(attempt = %self.attempt_id, error = %other, "Checkout failed");
            }
        }
        self.transition(CheckoutState::Failed { error, order });
    }

    /// Evaluate the entered code. The catalog is only fetched when a code
    /// was entered.
    async fn evaluate_promo(
        &self,
        code: &str,
        cart: &Cart,
        user: UserId,
    ) -> Result<(PromoEvaluation, Option<Arc<Vec<PromoCode>>>), ApiError> {
        if code.trim().is_empty() {
            return Ok((PromoEvaluation::none(), None));
        }
        let catalog = self.promos.codes().await?;
        let evaluation = evaluate(code, cart, self.settings.delivery_fee, user, &catalog);
        debug!(
            applicable = evaluation.applicable,
            discount = %evaluation.discount,
            "Promo code evaluated"
        );
        Ok((evaluation, Some(catalog)))
    }

    /// Record the user as a consumer of the applied promo. Best effort.
    async fn consume_promo(&self, promo: &PromoEvaluation, catalog: &[PromoCode], user: UserId) {
        let Some(promo_id) = promo.promo_id else {
            return;
        };
        let mut users_used = catalog
            .iter()
            .find(|p| p.id == promo_id)
            .map(|p| p.users_used.clone())
            .unwrap_or_default();
        if users_used.contains(&user) {
            return;
        }
        users_used.push(user);

        match self.client.record_promo_usage(promo_id, users_used).await {
            Ok(()) => {
                self.promos.invalidate().await;
                debug!(promo = %promo_id, "Promo usage recorded");
            }
            Err(e) => {
                warn!(attempt = %self.attempt_id, promo = %promo_id, error = %e, "Failed to record promo usage");
            }
        }
    }

    /// Send the order confirmation notification. Best effort.
    async fn notify_order_created(&self, user: UserId, order_id: OrderId) {
        let notification = NewNotification::order_created(user, order_id);
        if let Err(e) = self.client.create_notification(&notification).await {
            warn!(attempt = %self.attempt_id, order = %order_id, error = %e, "Failed to send order notification");
        }
    }
}
