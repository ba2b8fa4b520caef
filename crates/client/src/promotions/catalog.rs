//! Cached promo code catalog.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument};

use crate::api::{ApiError, BackendClient, PromoCode};

/// Promo catalog fetched from the backend and cached in memory.
///
/// The whole catalog is stored under a single entry and refetched after the
/// TTL expires or [`PromoCatalog::invalidate`] is called.
#[derive(Clone)]
pub struct PromoCatalog {
    client: BackendClient,
    cache: Cache<(), Arc<Vec<PromoCode>>>,
}

impl std::fmt::Debug for PromoCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromoCatalog")
            .field("cached", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl PromoCatalog {
    /// Create a catalog backed by `client` with the given freshness window.
    #[must_use]
    pub fn new(client: BackendClient, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(1).time_to_live(ttl).build();
        Self { client, cache }
    }

    /// Current catalog snapshot.
    ///
    /// # Errors
    ///
    /// Returns error if the catalog is not cached and fetching it fails.
    #[instrument(skip(self))]
    pub async fn codes(&self) -> Result<Arc<Vec<PromoCode>>, ApiError> {
        if let Some(codes) = self.cache.get(&()).await {
            debug!("Cache hit for promo catalog");
            return Ok(codes);
        }

        let codes = Arc::new(self.client.promo_codes().await?);
        debug!(count = codes.len(), "Fetched promo catalog");
        self.cache.insert((), Arc::clone(&codes)).await;
        Ok(codes)
    }

    /// Drop the cached snapshot so the next read refetches it.
    pub async fn invalidate(&self) {
        self.cache.invalidate(&()).await;
    }
}
