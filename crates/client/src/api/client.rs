//! HTTP client for the backend REST API.

use std::sync::Arc;

use deliverly_core::{CourierOrderId, OrderId, PromoCodeId, UserId};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use super::types::{
    Created, CurrentUser, MarkPaid, NewCourierOrder, NewNotification, NewOrder, OrderRef,
    PaymentSessionCreated, PaymentStatus, PromoCode, PromoUsageUpdate,
};
use super::{ApiError, extract_detail};
use crate::config::ClientConfig;

/// Header carrying the checkout attempt id.
const REQUEST_ID_HEADER: &str = "X-Request-Id";

// =============================================================================
// BackendClient
// =============================================================================

/// Client for the backend REST API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
    request_id: Option<Uuid>,
}

struct BackendClientInner {
    client: reqwest::Client,
    base_url: Url,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns error if the token is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();

        let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", config.bearer_token()))
            .map_err(|e| ApiError::Parse(format!("Invalid API token format: {e}")))?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                client,
                base_url: config.api_base_url.clone(),
            }),
            request_id: None,
        })
    }

    /// Return a client that tags every request with the given request id.
    #[must_use]
    pub fn with_request_id(&self, request_id: Uuid) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            request_id: Some(request_id),
        }
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Fetch the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the credential is rejected.
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<CurrentUser, ApiError> {
        let url = self.endpoint("auth/users/me/")?;
        self.send_json(self.inner.client.get(url)).await
    }

    // =========================================================================
    // Promo codes
    // =========================================================================

    /// Fetch the promo code catalog.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn promo_codes(&self) -> Result<Vec<PromoCode>, ApiError> {
        let url = self.endpoint("promocodes/")?;
        self.send_json(self.inner.client.get(url)).await
    }

    /// Replace the list of users that consumed a promo code.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, users_used), fields(users = users_used.len()))]
    pub async fn record_promo_usage(
        &self,
        promo_id: PromoCodeId,
        users_used: Vec<UserId>,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("promocodes/{promo_id}/"))?;
        let body = PromoUsageUpdate { users_used };
        self.send_unit(self.inner.client.patch(url).json(&body))
            .await
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Create a storefront order.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects the order.
    #[instrument(skip(self, order), fields(user = %order.user, total = %order.total_price))]
    pub async fn create_order(&self, order: &NewOrder) -> Result<OrderId, ApiError> {
        let url = self.endpoint("orders/")?;
        let created: Created<OrderId> = self
            .send_json(self.inner.client.post(url).json(order))
            .await?;
        Ok(created.id)
    }

    /// Create a courier order.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects the order.
    #[instrument(skip(self, order), fields(user = %order.user, price = %order.delivery_price))]
    pub async fn create_courier_order(
        &self,
        order: &NewCourierOrder,
    ) -> Result<CourierOrderId, ApiError> {
        let url = self.endpoint("orders_client/")?;
        let created: Created<CourierOrderId> = self
            .send_json(self.inner.client.post(url).json(order))
            .await?;
        Ok(created.id)
    }

    /// Mark an order as paid.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self), fields(order = %target))]
    pub async fn mark_paid(&self, target: OrderRef) -> Result<(), ApiError> {
        let url = self.endpoint(&target.order_path())?;
        self.send_unit(self.inner.client.patch(url).json(&MarkPaid { paid: true }))
            .await
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Open a gateway payment session for an order.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self), fields(order = %target))]
    pub async fn create_payment_session(
        &self,
        target: OrderRef,
    ) -> Result<PaymentSessionCreated, ApiError> {
        let url = self.endpoint(target.create_session_path())?;
        let key = target.create_session_key();
        let body = serde_json::json!({ key: target.order_id() });
        self.send_json(self.inner.client.post(url).json(&body))
            .await
    }

    /// Query the gateway status of an order's payment.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self), fields(order = %target))]
    pub async fn payment_status(&self, target: OrderRef) -> Result<PaymentStatus, ApiError> {
        let mut url = self.endpoint(target.status_path())?;
        url.query_pairs_mut()
            .append_pair("order_id", &target.order_id().to_string());
        self.send_json(self.inner.client.get(url)).await
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Create an in-app notification for a user.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, notification), fields(user = %notification.user))]
    pub async fn create_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("users/{}/notifications/", notification.user))?;
        self.send_unit(self.inner.client.post(url).json(notification))
            .await
    }

    // =========================================================================
    // Request plumbing
    // =========================================================================

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{path}: {e}")))
    }

    fn tagged(&self, request: RequestBuilder) -> RequestBuilder {
        match self.request_id {
            Some(id) => request.header(REQUEST_ID_HEADER, id.to_string()),
            None => request,
        }
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = self.tagged(request).send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }

        // Get response body as text first for better error diagnostics
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Backend returned non-success status"
            );
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                detail: extract_detail(&body),
            });
        }

        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            ApiError::Parse(e.to_string())
        })
    }

    async fn send_unit(&self, request: RequestBuilder) -> Result<(), ApiError> {
        let body = self.send(request).await?;
        debug!(bytes = body.len(), "Backend request succeeded");
        Ok(())
    }
}
