//! End-to-end checkout scenarios against a mock backend.
//!
//! Covers totals with and without promo codes, local validation, the cash
//! and gateway paths for storefront and courier orders, and the payment
//! monitor's settle, cancel and timeout endings.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use deliverly_client::api::OrderRef;
use deliverly_client::checkout::{CourierOrderRequest, DeliveryAddress, StoreOrderRequest};
use deliverly_client::{CheckoutError, CheckoutState, OrderRequest, SubmitOutcome, ValidationError};
use deliverly_core::{CourierOrderId, Money, OrderId, PaymentMethod};
use deliverly_integration_tests::{
    POLL_INTERVAL, STATE_WAIT, TestBackend, cart_of, store_order, wait_for_state,
};
use serde_json::json;
use wiremock::matchers::{any, body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

const STATUS_PATH: &str = "/payments/store/status/";

async fn mount_order(backend: &TestBackend, order_id: i64) {
    Mock::given(method("POST"))
        .and(path("/orders/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": order_id})))
        .expect(1)
        .mount(&backend.server)
        .await;
}

async fn mount_payment_session(backend: &TestBackend, order_id: i64) {
    Mock::given(method("POST"))
        .and(path("/payments/store/create/"))
        .and(body_json(json!({"order_id": order_id})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "payment_url": format!("https://pay.example/{order_id}"),
            "session_id": "sess-1"
        })))
        .expect(1)
        .mount(&backend.server)
        .await;
}

async fn mount_pending_status(backend: &TestBackend) {
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"pg_status": "ok", "pg_payment_status": "pending"})),
        )
        .mount(&backend.server)
        .await;
}

async fn mount_promo(backend: &TestBackend, discount: u64, min_order_sum: u64) {
    Mock::given(method("GET"))
        .and(path("/promocodes/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 1,
            "code": "SAVE",
            "discount_amount": discount,
            "min_order_sum": min_order_sum,
            "on_products": [],
            "users_used": []
        }])))
        .mount(&backend.server)
        .await;
}

// =============================================================================
// Totals
// =============================================================================

#[tokio::test]
async fn test_plain_order_totals_and_submission() {
    let backend = TestBackend::start().await;
    backend.mount_user(8).await;
    Mock::given(method("POST"))
        .and(path("/orders/"))
        .and(body_partial_json(json!({
            "total_price": 400,
            "items": [{"product": 1, "quantity": 2}]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 10})))
        .expect(1)
        .mount(&backend.server)
        .await;

    let cart = cart_of(&[(1, 100, 2)]);
    let checkout = backend.checkout(cart.clone());

    let quote = checkout.quote("").await.unwrap();
    assert_eq!(quote.totals.subtotal, Money::new(200));
    assert_eq!(quote.totals.total, Money::new(400));
    assert_eq!(quote.totals.discount, Money::ZERO);
    assert_eq!(quote.totals.payable, Money::new(400));

    let outcome = checkout
        .submit(store_order(PaymentMethod::Cash, ""))
        .await
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::Settled(OrderRef::Store(OrderId::new(10))));
    assert!(cart.is_empty());
}

#[tokio::test]
async fn test_promo_discount_applied_and_consumed() {
    let backend = TestBackend::start().await;
    backend.mount_user(8).await;
    mount_promo(&backend, 150, 400).await;
    Mock::given(method("POST"))
        .and(path("/orders/"))
        .and(body_partial_json(json!({"total_price": 550, "promocode_used": 1})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 11})))
        .expect(1)
        .mount(&backend.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/promocodes/1/"))
        .and(body_json(json!({"users_used": [8]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&backend.server)
        .await;

    let checkout = backend.checkout(cart_of(&[(1, 250, 2)]));

    let quote = checkout.quote("save").await.unwrap();
    assert!(quote.promo.applicable);
    assert_eq!(quote.totals.discount, Money::new(150));
    assert_eq!(quote.totals.payable, Money::new(550));

    let outcome = checkout.submit(store_order(PaymentMethod::Qr, "SAVE")).await;
    assert!(matches!(outcome, Ok(SubmitOutcome::Settled(_))));
}

#[tokio::test]
async fn test_discount_capped_at_order_total() {
    let backend = TestBackend::start().await;
    backend.mount_user(8).await;
    mount_promo(&backend, 1000, 0).await;

    let checkout = backend.checkout(cart_of(&[(1, 100, 1)]));
    let quote = checkout.quote("SAVE").await.unwrap();

    assert!(quote.promo.applicable);
    assert_eq!(quote.totals.total, Money::new(300));
    assert_eq!(quote.totals.discount, Money::new(300));
    assert_eq!(quote.totals.payable, Money::ZERO);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_empty_address_fails_without_network() {
    let backend = TestBackend::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&backend.server)
        .await;

    let cart = cart_of(&[(1, 100, 1)]);
    let checkout = backend.checkout(cart.clone());
    let err = checkout
        .submit(OrderRequest::Store(StoreOrderRequest {
            address: DeliveryAddress::default(),
            payment_method: Some(PaymentMethod::Gateway),
            promo_code: String::new(),
        }))
        .await
        .unwrap_err();

    assert_eq!(err, CheckoutError::Validation(ValidationError::MissingAddress));
    assert!(matches!(
        checkout.state(),
        CheckoutState::Failed {
            error: CheckoutError::Validation(_),
            order: None
        }
    ));
    assert_eq!(cart.len(), 1);
}

// =============================================================================
// Gateway payments
// =============================================================================

#[tokio::test]
async fn test_gateway_payment_settles_once() {
    let backend = TestBackend::start().await;
    backend.mount_user(8).await;
    mount_order(&backend, 50).await;
    mount_payment_session(&backend, 50).await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .and(query_param("order_id", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pg_payment_status": "pending"})))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&backend.server)
        .await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pg_payment_status": "success"})))
        .mount(&backend.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/orders/50/"))
        .and(body_json(json!({"paid": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&backend.server)
        .await;

    let cart = cart_of(&[(1, 300, 1)]);
    let checkout = backend.checkout(cart.clone());

    let outcome = checkout
        .submit(store_order(PaymentMethod::Gateway, ""))
        .await
        .unwrap();
    let SubmitOutcome::AwaitingPayment(session) = outcome else {
        panic!("expected a payment session, got {outcome:?}");
    };
    assert_eq!(session.payment_url, "https://pay.example/50");
    assert_eq!(
        checkout.state().payment_url(),
        Some("https://pay.example/50")
    );
    assert_eq!(cart.len(), 1);

    let settled = wait_for_state(&checkout, |s| matches!(s, CheckoutState::Settled { .. })).await;
    assert_eq!(
        settled,
        CheckoutState::Settled {
            order: OrderRef::Store(OrderId::new(50))
        }
    );
    assert!(cart.is_empty());
    assert_eq!(backend.hits("GET", STATUS_PATH).await, 3);

    tokio::time::sleep(POLL_INTERVAL * 4).await;
    assert_eq!(backend.hits("GET", STATUS_PATH).await, 3);
    assert!(!checkout.is_polling());
}

#[tokio::test]
async fn test_closing_payment_view_leaves_order_unpaid() {
    let backend = TestBackend::start().await;
    backend.mount_user(8).await;
    mount_order(&backend, 51).await;
    mount_payment_session(&backend, 51).await;
    mount_pending_status(&backend).await;

    let cart = cart_of(&[(1, 300, 1)]);
    let checkout = backend.checkout(cart.clone());
    checkout
        .submit(store_order(PaymentMethod::Gateway, ""))
        .await
        .unwrap();

    tokio::time::sleep(POLL_INTERVAL * 3).await;
    assert!(checkout.cancel_payment());
    assert_eq!(checkout.state(), CheckoutState::Idle);

    tokio::time::sleep(POLL_INTERVAL * 2).await;
    let polls = backend.hits("GET", STATUS_PATH).await;
    tokio::time::sleep(POLL_INTERVAL * 4).await;

    assert_eq!(backend.hits("GET", STATUS_PATH).await, polls);
    assert_eq!(backend.hits("PATCH", "/orders/51/").await, 0);
    assert_eq!(cart.len(), 1);
    assert!(!checkout.cancel_payment());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_racing_payment_start_stops_poller() {
    let backend = TestBackend::start().await;
    backend.mount_user(8).await;
    mount_order(&backend, 64).await;
    mount_payment_session(&backend, 64).await;
    mount_pending_status(&backend).await;

    let cart = cart_of(&[(1, 300, 1)]);
    let checkout = Arc::new(backend.checkout(cart.clone()));
    let canceller = {
        let checkout = Arc::clone(&checkout);
        tokio::spawn(async move {
            while !checkout.cancel_payment() {
                tokio::task::yield_now().await;
            }
        })
    };

    let outcome = checkout
        .submit(store_order(PaymentMethod::Gateway, ""))
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::AwaitingPayment(_)));

    tokio::time::timeout(STATE_WAIT, canceller)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkout.state(), CheckoutState::Idle);
    assert!(!checkout.is_polling());

    tokio::time::sleep(POLL_INTERVAL * 2).await;
    let polls = backend.hits("GET", STATUS_PATH).await;
    tokio::time::sleep(POLL_INTERVAL * 4).await;
    assert_eq!(backend.hits("GET", STATUS_PATH).await, polls);
    assert_eq!(cart.len(), 1);
}

#[tokio::test]
async fn test_payment_timeout_keeps_cart() {
    let mut backend = TestBackend::start().await;
    backend.settings.monitor.timeout = Duration::from_millis(150);
    backend.mount_user(8).await;
    mount_order(&backend, 52).await;
    mount_payment_session(&backend, 52).await;
    mount_pending_status(&backend).await;

    let cart = cart_of(&[(1, 300, 1)]);
    let checkout = backend.checkout(cart.clone());
    checkout
        .submit(store_order(PaymentMethod::Gateway, ""))
        .await
        .unwrap();

    let failed = wait_for_state(&checkout, |s| matches!(s, CheckoutState::Failed { .. })).await;
    assert_eq!(
        failed,
        CheckoutState::Failed {
            error: CheckoutError::PaymentTimedOut,
            order: Some(OrderRef::Store(OrderId::new(52)))
        }
    );
    assert_eq!(cart.len(), 1);
    assert_eq!(backend.hits("PATCH", "/orders/52/").await, 0);
}

#[tokio::test]
async fn test_submit_while_awaiting_payment_is_rejected() {
    let backend = TestBackend::start().await;
    backend.mount_user(8).await;
    mount_order(&backend, 53).await;
    mount_payment_session(&backend, 53).await;
    mount_pending_status(&backend).await;

    let checkout = backend.checkout(cart_of(&[(1, 300, 1)]));
    checkout
        .submit(store_order(PaymentMethod::Gateway, ""))
        .await
        .unwrap();

    let again = checkout.submit(store_order(PaymentMethod::Gateway, "")).await;
    assert_eq!(again, Err(CheckoutError::AlreadyInFlight));
    assert!(matches!(checkout.state(), CheckoutState::AwaitingPayment { .. }));
    assert!(checkout.cancel_payment());
}

#[tokio::test]
async fn test_payment_session_failure_reports_created_order() {
    let backend = TestBackend::start().await;
    backend.mount_user(8).await;
    mount_order(&backend, 54).await;
    Mock::given(method("POST"))
        .and(path("/payments/store/create/"))
        .respond_with(
            ResponseTemplate::new(502).set_body_json(json!({"detail": "Gateway unavailable"})),
        )
        .mount(&backend.server)
        .await;

    let cart = cart_of(&[(1, 300, 1)]);
    let checkout = backend.checkout(cart.clone());
    let err = checkout
        .submit(store_order(PaymentMethod::Gateway, ""))
        .await
        .unwrap_err();

    assert_eq!(err.user_notice(), "Gateway unavailable");
    assert_eq!(
        checkout.state(),
        CheckoutState::Failed {
            error: err,
            order: Some(OrderRef::Store(OrderId::new(54)))
        }
    );
    assert_eq!(cart.len(), 1);
    assert_eq!(backend.hits("GET", STATUS_PATH).await, 0);
}

// =============================================================================
// Abandoned and concurrent submissions
// =============================================================================

#[tokio::test]
async fn test_abandoned_submission_allows_retry() {
    let backend = TestBackend::start().await;
    backend.mount_user(8).await;
    Mock::given(method("POST"))
        .and(path("/orders/"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"id": 60}))
                .set_delay(Duration::from_millis(500)),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&backend.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 61})))
        .mount(&backend.server)
        .await;

    let cart = cart_of(&[(1, 300, 1)]);
    let checkout = backend.checkout(cart.clone());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        checkout.submit(store_order(PaymentMethod::Cash, "")),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(matches!(
        checkout.state(),
        CheckoutState::Failed {
            error: CheckoutError::Network(_),
            order: None
        }
    ));
    assert_eq!(cart.len(), 1);

    let retry = checkout.submit(store_order(PaymentMethod::Cash, "")).await;
    assert_eq!(
        retry,
        Ok(SubmitOutcome::Settled(OrderRef::Store(OrderId::new(61))))
    );
    assert!(cart.is_empty());
}

#[tokio::test]
async fn test_abandoned_after_order_created_keeps_order() {
    let backend = TestBackend::start().await;
    backend.mount_user(8).await;
    mount_order(&backend, 62).await;
    Mock::given(method("POST"))
        .and(path("/payments/store/create/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"payment_url": "https://pay.example/62"}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&backend.server)
        .await;

    let cart = cart_of(&[(1, 300, 1)]);
    let checkout = backend.checkout(cart.clone());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(250),
        checkout.submit(store_order(PaymentMethod::Gateway, "")),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(matches!(
        checkout.state(),
        CheckoutState::Failed {
            order: Some(OrderRef::Store(id)),
            ..
        } if id == OrderId::new(62)
    ));
    assert!(!checkout.is_polling());
    assert_eq!(cart.len(), 1);
}

#[tokio::test]
async fn test_concurrent_submit_creates_one_order() {
    let backend = TestBackend::start().await;
    backend.mount_user(8).await;
    Mock::given(method("POST"))
        .and(path("/orders/"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"id": 63}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&backend.server)
        .await;

    let checkout = backend.checkout(cart_of(&[(1, 300, 1)]));
    let (first, second) = tokio::join!(
        checkout.submit(store_order(PaymentMethod::Cash, "")),
        checkout.submit(store_order(PaymentMethod::Cash, "")),
    );

    let results = [first, second];
    assert_eq!(
        results
            .iter()
            .filter(|r| **r == Err(CheckoutError::AlreadyInFlight))
            .count(),
        1
    );
    assert!(results.contains(&Ok(SubmitOutcome::Settled(OrderRef::Store(OrderId::new(63))))));
    assert_eq!(backend.hits("POST", "/orders/").await, 1);
}

// =============================================================================
// Courier orders
// =============================================================================

fn courier_order(payment_method: PaymentMethod) -> OrderRequest {
    OrderRequest::Courier(CourierOrderRequest {
        from: "Akhunbaeva 1".to_string(),
        to: "Manasa 40".to_string(),
        price: Money::new(300),
        payment_method: Some(payment_method),
        comment: "Fragile".to_string(),
    })
}

#[tokio::test]
async fn test_courier_cash_order() {
    let backend = TestBackend::start().await;
    backend.mount_user(8).await;
    Mock::given(method("POST"))
        .and(path("/orders_client/"))
        .and(body_json(json!({
            "delivery_address_a": "Akhunbaeva 1",
            "delivery_address_b": "Manasa 40",
            "delivery_price": 300,
            "payment_method": "cash",
            "comment": "Fragile",
            "user": 8
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
        .expect(1)
        .mount(&backend.server)
        .await;

    let checkout = backend.checkout(cart_of(&[]));
    let outcome = checkout.submit(courier_order(PaymentMethod::Cash)).await;

    assert_eq!(
        outcome,
        Ok(SubmitOutcome::Settled(OrderRef::Courier(CourierOrderId::new(9))))
    );
}

#[tokio::test]
async fn test_courier_gateway_order_settles() {
    let backend = TestBackend::start().await;
    backend.mount_user(8).await;
    Mock::given(method("POST"))
        .and(path("/orders_client/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
        .expect(1)
        .mount(&backend.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/payments/client/create/"))
        .and(body_json(json!({"client_order_id": 9})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"payment_url": "https://pay.example/c9"})),
        )
        .expect(1)
        .mount(&backend.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/payments/client/status/"))
        .and(query_param("order_id", "9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pg_payment_status": "success"})))
        .mount(&backend.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/orders_client/9/"))
        .and(body_json(json!({"paid": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&backend.server)
        .await;

    let checkout = backend.checkout(cart_of(&[]));
    let outcome = checkout
        .submit(courier_order(PaymentMethod::Gateway))
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::AwaitingPayment(_)));

    let settled = wait_for_state(&checkout, |s| matches!(s, CheckoutState::Settled { .. })).await;
    assert_eq!(
        settled,
        CheckoutState::Settled {
            order: OrderRef::Courier(CourierOrderId::new(9))
        }
    );
}

#[tokio::test]
async fn test_courier_price_below_floor() {
    let backend = TestBackend::start().await;
    let checkout = backend.checkout(cart_of(&[]));

    let err = checkout
        .submit(OrderRequest::Courier(CourierOrderRequest {
            from: "Akhunbaeva 1".to_string(),
            to: "Manasa 40".to_string(),
            price: Money::new(50),
            payment_method: Some(PaymentMethod::Cash),
            comment: String::new(),
        }))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(backend.hits("POST", "/orders_client/").await, 0);
}
