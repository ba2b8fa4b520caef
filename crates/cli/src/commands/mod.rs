//! Command implementations.

pub mod checkout;
pub mod courier;
pub mod promo;

use std::time::Duration;

use deliverly_client::api::BackendClient;
use deliverly_client::promotions::PromoCatalog;
use deliverly_client::{
    Checkout, CheckoutSettings, CheckoutState, ClientConfig, SharedCart, SubmitOutcome,
};
use tracing::{info, warn};

/// How often a pending payment is checked for a stopped poller.
const POLLER_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Open a checkout attempt over `cart`.
fn open_checkout(
    config: &ClientConfig,
    cart: SharedCart,
) -> Result<Checkout, Box<dyn std::error::Error>> {
    let client = BackendClient::new(config)?;
    let promos = PromoCatalog::new(client.clone(), config.promo_cache_ttl);
    Ok(Checkout::new(
        &client,
        promos,
        cart,
        CheckoutSettings::from_config(config),
    ))
}

/// Report a submission and, for gateway payments, wait until it settles.
///
/// Ctrl+C closes the payment and leaves the order unpaid.
async fn finish(
    checkout: &Checkout,
    outcome: SubmitOutcome,
) -> Result<(), Box<dyn std::error::Error>> {
    match outcome {
        SubmitOutcome::Settled(order) => {
            info!(%order, "Order placed");
            return Ok(());
        }
        SubmitOutcome::AwaitingPayment(session) => {
            info!(
                order = %session.target,
                url = %session.payment_url,
                "Complete the payment at the URL; press Ctrl+C to cancel"
            );
        }
    }

    let mut states = checkout.subscribe();
    let mut poller_check = tokio::time::interval(POLLER_CHECK_INTERVAL);

    loop {
        let state = states.borrow_and_update().clone();
        match state {
            CheckoutState::Settled { order } => {
                info!(%order, "Payment confirmed, order placed");
                return Ok(());
            }
            CheckoutState::Failed { error, .. } => return Err(error.user_notice().into()),
            CheckoutState::Idle => return Err("Payment cancelled".into()),
            _ => {}
        }

        tokio::select! {
            changed = states.changed() => changed?,
            _ = poller_check.tick() => {
                if !checkout.is_polling()
                    && matches!(checkout.state(), CheckoutState::AwaitingPayment { .. })
                {
                    checkout.cancel_payment();
                    return Err("Payment status could not be checked; the order was left unpaid".into());
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                if checkout.cancel_payment() {
                    warn!("Payment cancelled; the order was left unpaid");
                    return Err("Payment cancelled".into());
                }
            }
        }
    }
}
