//! Payment settlement monitor.
//!
//! Once a gateway payment session exists, a background task polls the
//! payment status endpoint on a fixed interval until one of:
//!
//! - the gateway reports success: the order is marked paid, the cart is
//!   cleared and the session is [`SettlementOutcome::Settled`]
//! - the user closes the payment view: [`MonitorHandle::cancel`]
//! - a status request fails: polling stops, nothing is retried
//! - the payment timeout elapses
//!
//! Finalization is guarded by a single atomic claim shared by the poller and
//! the cancel path, so a session is either settled or cancelled, never both,
//! and a duplicate success tick cannot finalize twice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::api::{BackendClient, OrderRef, PaymentSessionCreated};
use crate::cart::SharedCart;
use crate::config::ClientConfig;

/// Terminal result of a monitored payment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// Gateway confirmed the payment and the order was finalized.
    Settled,
    /// The user closed the payment view.
    Cancelled,
    /// A status request failed; the payment is left unconfirmed.
    PollFailed,
    /// The gateway did not confirm the payment in time.
    TimedOut,
}

/// An open gateway payment session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub target: OrderRef,
    /// Gateway page the user completes the payment on.
    pub payment_url: String,
    pub session_id: Option<String>,
}

impl PaymentSession {
    #[must_use]
    pub fn new(target: OrderRef, created: PaymentSessionCreated) -> Self {
        Self {
            target,
            payment_url: created.payment_url,
            session_id: created.session_id,
        }
    }
}

/// Shortest interval the poller ticks at.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polling cadence and upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl MonitorSettings {
    #[must_use]
    pub const fn from_config(config: &ClientConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            timeout: config.payment_timeout,
        }
    }

    /// Tick period, never below [`MIN_POLL_INTERVAL`].
    #[must_use]
    pub fn period(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }
}

// =============================================================================
// MonitorHandle
// =============================================================================

/// Handle to a running settlement poller.
///
/// Dropping the handle cancels the session unless the poller has already
/// claimed it, in which case the poller is left to finish finalizing.
#[derive(Debug)]
pub struct MonitorHandle {
    target: OrderRef,
    claimed: Arc<AtomicBool>,
    cancel_tx: watch::Sender<bool>,
    task: Option<JoinHandle<SettlementOutcome>>,
}

impl MonitorHandle {
    /// Order the session belongs to.
    #[must_use]
    pub const fn target(&self) -> OrderRef {
        self.target
    }

    /// Stop polling without finalizing.
    ///
    /// Returns `false` if the session already reached another outcome.
    pub fn cancel(&self) -> bool {
        if claim(&self.claimed) {
            // Receiver is gone only if the task already exited
            let _ = self.cancel_tx.send(true);
            info!(order = %self.target, "Payment session cancelled");
            true
        } else {
            false
        }
    }

    /// Returns `true` once the poller task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the poller to exit and return its outcome.
    pub async fn wait(mut self) -> SettlementOutcome {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(SettlementOutcome::Cancelled),
            None => SettlementOutcome::Cancelled,
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if self.cancel()
            && let Some(task) = &self.task
        {
            task.abort();
        }
    }
}

fn claim(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// Start polling a payment session.
///
/// `cart` is cleared when the payment settles. `on_finish` is called once
/// with the outcome the poller reached on its own (settled, poll failure or
/// timeout); it is not called when the session is cancelled through the
/// handle.
pub fn spawn_monitor<F>(
    client: BackendClient,
    session: &PaymentSession,
    cart: Option<SharedCart>,
    settings: MonitorSettings,
    on_finish: F,
) -> MonitorHandle
where
    F: FnOnce(SettlementOutcome) + Send + 'static,
{
    let claimed = Arc::new(AtomicBool::new(false));
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let target = session.target;

    let poller = Poller {
        client,
        target,
        cart,
        settings,
        claimed: Arc::clone(&claimed),
        cancel_rx,
    };
    let span = info_span!("settlement", order = %target);
    let task = tokio::spawn(
        async move {
            let outcome = poller.run().await;
            if outcome != SettlementOutcome::Cancelled {
                on_finish(outcome);
            }
            outcome
        }
        .instrument(span),
    );

    info!(
        order = %target,
        interval_ms = u64::try_from(settings.period().as_millis()).unwrap_or(u64::MAX),
        "Payment monitor started"
    );

    MonitorHandle {
        target,
        claimed,
        cancel_tx,
        task: Some(task),
    }
}

struct Poller {
    client: BackendClient,
    target: OrderRef,
    cart: Option<SharedCart>,
    settings: MonitorSettings,
    claimed: Arc<AtomicBool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Poller {
    async fn run(mut self) -> SettlementOutcome {
        let start = Instant::now();
        let period = self.settings.period();
        let mut ticker = tokio::time::interval_at(start + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = tokio::time::sleep_until(start + self.settings.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                () = cancelled(&mut self.cancel_rx) => return SettlementOutcome::Cancelled,
                () = &mut deadline => {
                    return self.finish(SettlementOutcome::TimedOut, || {
                        warn!("Payment not confirmed before timeout, polling stopped");
                    });
                }
                _ = ticker.tick() => {}
            }

            let status = tokio::select! {
                biased;
                () = cancelled(&mut self.cancel_rx) => return SettlementOutcome::Cancelled,
                result = self.client.payment_status(self.target) => result,
            };

            match status {
                Ok(status) if status.is_success() => return self.settle().await,
                Ok(status) => {
                    debug!(
                        pg_status = status.pg_status.as_deref().unwrap_or(""),
                        pg_payment_status = status.pg_payment_status.as_deref().unwrap_or(""),
                        "Payment not completed yet"
                    );
                }
                Err(e) => {
                    return self.finish(SettlementOutcome::PollFailed, || {
                        warn!(error = %e, "Payment status check failed, polling stopped");
                    });
                }
            }
        }
    }

    /// Claim the session for `outcome`, or report it cancelled if the
    /// cancel path got there first.
    fn finish(&self, outcome: SettlementOutcome, log: impl FnOnce()) -> SettlementOutcome {
        if claim(&self.claimed) {
            log();
            outcome
        } else {
            SettlementOutcome::Cancelled
        }
    }

    async fn settle(&self) -> SettlementOutcome {
        if !claim(&self.claimed) {
            return SettlementOutcome::Cancelled;
        }

        // The gateway has the money; a failed flag update is reconciled
        // server-side and must not keep the cart around.
        if let Err(e) = self.client.mark_paid(self.target).await {
            warn!(error = %e, "Failed to mark order as paid");
        }

        if let Some(cart) = &self.cart {
            cart.clear();
        }

        info!("Payment settled");
        SettlementOutcome::Settled
    }
}

/// Resolves when cancellation is requested or the handle is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|cancelled| *cancelled).await;
}

// =============================================================================
// SettlementMonitor
// =============================================================================

/// Owner of the single active payment poller.
///
/// Starting a new session stops the previous one first, so two pollers can
/// never race to finalize.
#[derive(Debug)]
pub struct SettlementMonitor {
    client: BackendClient,
    settings: MonitorSettings,
    active: Mutex<Option<MonitorHandle>>,
}

impl SettlementMonitor {
    #[must_use]
    pub const fn new(client: BackendClient, settings: MonitorSettings) -> Self {
        Self {
            client,
            settings,
            active: Mutex::new(None),
        }
    }

    /// Start monitoring `session`, cancelling any session still active.
    pub fn start<F>(&self, session: &PaymentSession, cart: Option<SharedCart>, on_finish: F)
    where
        F: FnOnce(SettlementOutcome) + Send + 'static,
    {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            debug!(order = %previous.target(), "Stopping previous payment monitor");
            drop(previous);
        }
        *active = Some(spawn_monitor(
            self.client.clone(),
            session,
            cart,
            self.settings,
            on_finish,
        ));
    }

    /// Cancel the active session.
    ///
    /// Returns `false` if there was none or it already finished.
    pub fn cancel(&self) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(MonitorHandle::cancel) {
            active.take();
            true
        } else {
            false
        }
    }

    /// Returns `true` while a poller is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
