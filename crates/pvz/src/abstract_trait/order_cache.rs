use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared::errors::CacheError;
use shared::model::Order;
use tracing::{info, warn};

use super::order_repository::DynOrderRepository;

pub type DynOrderCache = Arc<dyn OrderCacheTrait + Send + Sync>;

/// Look-aside order cache. The store stays authoritative; an absent entry
/// never implies the order does not exist.
#[async_trait]
pub trait OrderCacheTrait {
    /// Stores the order with a TTL derived from its storage deadline.
    /// Refuses orders whose deadline has already passed.
    async fn set_order(&self, order: &Order) -> Result<(), CacheError>;

    /// Returns the cached order; a present-but-expired entry is removed and
    /// reported as [`CacheError::Expired`].
    async fn get_order(&self, order_id: i64) -> Result<Order, CacheError>;

    /// Idempotent removal.
    async fn delete_order(&self, order_id: i64) -> Result<(), CacheError>;

    /// Removes every order entry while leaving the history snapshot alone.
    async fn clear_order_cache(&self) -> Result<(), CacheError>;

    async fn get_order_history(&self) -> Result<Vec<Order>, CacheError>;

    /// Performs an immediate history refresh, then keeps refreshing every
    /// `interval` in the background. Overlapping refreshes are collapsed
    /// into one (single-flight).
    async fn start_history_cache_refresh(
        self: Arc<Self>,
        repo: DynOrderRepository,
        interval: Duration,
    );

    /// Primes the cache with every accepted/delivered order. Entries whose
    /// deadline has already passed are skipped.
    async fn warm(&self, repo: DynOrderRepository) -> Result<(), CacheError> {
        let orders = repo
            .list_actual()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        info!("Warming order cache with {} actual orders", orders.len());

        for order in &orders {
            match self.set_order(order).await {
                Ok(()) => {}
                Err(CacheError::NotCached(id)) => {
                    warn!("Skipping order {id} during cache warm-up: deadline passed");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}
