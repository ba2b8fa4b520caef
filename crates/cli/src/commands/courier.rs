//! Courier orders.

use deliverly_client::checkout::CourierOrderRequest;
use deliverly_client::{ClientConfig, OrderRequest, SharedCart};
use tracing::info;

/// Submit a point-to-point courier order.
///
/// # Errors
///
/// Returns the user-facing notice if validation, submission or payment
/// fails.
pub async fn place_order(
    config: &ClientConfig,
    request: CourierOrderRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let checkout = super::open_checkout(config, SharedCart::new())?;

    info!(
        from = %request.from,
        to = %request.to,
        price = %request.price,
        "Submitting courier order"
    );

    let outcome = checkout
        .submit(OrderRequest::Courier(request))
        .await
        .map_err(|e| e.user_notice())?;

    super::finish(&checkout, outcome).await
}
