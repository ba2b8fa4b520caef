//! Integration test harness for Deliverly.
//!
//! Each test starts a [`TestBackend`], mounts the endpoints the scenario
//! needs and drives a [`Checkout`] against it.
//!
//! ```rust,ignore
//! let backend = TestBackend::start().await;
//! backend.mount_user(8).await;
//! let cart = cart_of(&[(3, 250, 2)]);
//! let checkout = backend.checkout(cart.clone());
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::time::Duration;

use deliverly_client::api::BackendClient;
use deliverly_client::cart::CartProduct;
use deliverly_client::checkout::{CheckoutSettings, DeliveryAddress, StoreOrderRequest};
use deliverly_client::promotions::PromoCatalog;
use deliverly_client::{Checkout, CheckoutState, ClientConfig, OrderRequest, SharedCart};
use deliverly_core::{Money, PaymentMethod, ProductId, StoreId};
use secrecy::SecretString;
use serde_json::json;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Delivery fee used by every scenario.
pub const DELIVERY_FEE: Money = Money::new(200);

/// Poll interval short enough to run several ticks per test.
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Upper bound for waiting on an asynchronous state change.
pub const STATE_WAIT: Duration = Duration::from_secs(5);

/// Mock backend plus the settings checkouts are built with.
pub struct TestBackend {
    pub server: MockServer,
    pub settings: CheckoutSettings,
}

impl TestBackend {
    /// Start a mock backend.
    ///
    /// # Panics
    ///
    /// Panics if the mock server URI is not a valid URL.
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let mut settings = CheckoutSettings::from_config(&config_for(&server));
        settings.delivery_fee = DELIVERY_FEE;
        settings.notifications_enabled = false;
        settings.monitor.poll_interval = POLL_INTERVAL;
        Self { server, settings }
    }

    /// Open a checkout attempt over `cart`.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn checkout(&self, cart: SharedCart) -> Checkout {
        let client = BackendClient::new(&config_for(&self.server)).unwrap();
        let promos = PromoCatalog::new(client.clone(), Duration::from_secs(60));
        Checkout::new(&client, promos, cart, self.settings)
    }

    /// Serve `GET /auth/users/me/` for user `id`.
    pub async fn mount_user(&self, id: i64) {
        Mock::given(method("GET"))
            .and(path("/auth/users/me/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": id})))
            .mount(&self.server)
            .await;
    }

    /// Number of requests the backend received for `request_path`.
    ///
    /// # Panics
    ///
    /// Panics if request recording is disabled.
    #[allow(clippy::unwrap_used)]
    pub async fn hits(&self, http_method: &str, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == http_method && r.url.path() == request_path)
            .count()
    }
}

#[allow(clippy::unwrap_used)]
fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig::new(
        url::Url::parse(&server.uri()).unwrap(),
        SecretString::from("integration-test-token".to_string()),
    )
}

/// Build a cart from `(product_id, price, quantity)` lines in store 1.
#[must_use]
pub fn cart_of(lines: &[(i64, u64, u32)]) -> SharedCart {
    let cart = SharedCart::new();
    for &(product_id, price, quantity) in lines {
        let product = CartProduct {
            product_id: ProductId::new(product_id),
            store_id: StoreId::new(1),
            category_id: None,
            name: format!("Product {product_id}"),
            description: None,
            image: None,
            price: Money::new(price),
        };
        for _ in 0..quantity {
            cart.add_item(product.clone());
        }
    }
    cart
}

/// Storefront order to a fixed address.
#[must_use]
pub fn store_order(payment_method: PaymentMethod, promo_code: &str) -> OrderRequest {
    OrderRequest::Store(StoreOrderRequest {
        address: DeliveryAddress {
            street: "Chui 120".to_string(),
            house: "4".to_string(),
            flat: "12".to_string(),
            comment: None,
        },
        payment_method: Some(payment_method),
        promo_code: promo_code.to_string(),
    })
}

/// Wait until the checkout reaches a state matching `accept`.
///
/// # Panics
///
/// Panics if the state is not reached within [`STATE_WAIT`].
#[allow(clippy::unwrap_used)]
pub async fn wait_for_state(
    checkout: &Checkout,
    accept: impl FnMut(&CheckoutState) -> bool,
) -> CheckoutState {
    let mut states: watch::Receiver<CheckoutState> = checkout.subscribe();
    let state = tokio::time::timeout(STATE_WAIT, states.wait_for(accept))
        .await
        .unwrap()
        .unwrap();
    state.clone()
}
