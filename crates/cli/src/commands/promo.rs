//! Promo code quotes.

use std::path::Path;

use deliverly_client::{ClientConfig, SharedCart};
use tracing::{info, warn};

use crate::cart_file;

/// Evaluate `code` against the cart in `cart_path` and log the breakdown.
///
/// # Errors
///
/// Returns an error if the cart file cannot be loaded or the promo catalog
/// cannot be fetched.
pub async fn quote(
    config: &ClientConfig,
    cart_path: &Path,
    code: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let cart = cart_file::load(cart_path).await?;
    let checkout = super::open_checkout(config, SharedCart::from_cart(cart))?;

    let quote = checkout.quote(code).await.map_err(|e| e.user_notice())?;

    if let Some(reason) = &quote.promo.reason {
        warn!(code, %reason, "Promo code does not apply");
    } else if quote.promo.applicable {
        info!(
            code,
            discount = %quote.promo.discount,
            already_used = quote.promo.already_consumed,
            "Promo code applies"
        );
    }

    let totals = quote.totals;
    info!(
        subtotal = %totals.subtotal,
        delivery_fee = %totals.delivery_fee,
        total = %totals.total,
        discount = %totals.discount,
        payable = %totals.payable,
        "Order totals"
    );
    Ok(())
}
