//! Storefront orders.

use std::path::Path;

use deliverly_client::checkout::{DeliveryAddress, StoreOrderRequest};
use deliverly_client::{ClientConfig, OrderRequest, SharedCart};
use deliverly_core::PaymentMethod;
use tracing::info;

use crate::cart_file;

/// Submit the cart in `cart_path` as a storefront order.
///
/// # Errors
///
/// Returns the user-facing notice if validation, submission or payment
/// fails.
pub async fn place_order(
    config: &ClientConfig,
    cart_path: &Path,
    address: DeliveryAddress,
    payment_method: PaymentMethod,
    promo_code: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let cart = cart_file::load(cart_path).await?;
    let checkout = super::open_checkout(config, SharedCart::from_cart(cart))?;

    let quote = checkout
        .quote(&promo_code)
        .await
        .map_err(|e| e.user_notice())?;
    info!(
        payable = %quote.totals.payable,
        discount = %quote.totals.discount,
        %payment_method,
        "Submitting order"
    );

    let outcome = checkout
        .submit(OrderRequest::Store(StoreOrderRequest {
            address,
            payment_method: Some(payment_method),
            promo_code,
        }))
        .await
        .map_err(|e| e.user_notice())?;

    super::finish(&checkout, outcome).await
}
