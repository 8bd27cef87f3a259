use std::cmp::min;
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use shared::config::CacheConfig;
use shared::errors::CacheError;
use shared::model::Order;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::abstract_trait::{DynOrderRepository, OrderCacheTrait};

const REFRESH_TIMEOUT: StdDuration = StdDuration::from_secs(30);

#[derive(Clone)]
struct OrderEntry {
    order: Order,
    expires_at: DateTime<Utc>,
}

struct HistoryEntry {
    orders: Vec<Order>,
    expires_at: DateTime<Utc>,
}

/// Bounded in-process backend: least-recently-used orders are evicted when
/// the cache is full, and a periodic reaper sweeps entries whose TTL
/// elapsed. Every operation fails with [`CacheError::Cancelled`] once the
/// ambient scope is cancelled.
pub struct InMemoryOrderCache {
    orders: RwLock<LruCache<i64, OrderEntry>>,
    history: RwLock<Option<HistoryEntry>>,
    refresh_lock: Mutex<()>,
    token: CancellationToken,

    order_ttl: Duration,
    history_ttl: Duration,
    additional_ttl: Duration,
}

impl InMemoryOrderCache {
    pub fn new(config: &CacheConfig, token: CancellationToken) -> Arc<Self> {
        let capacity = NonZeroUsize::new(config.max_cache_size.max(1)).unwrap();

        let cache = Arc::new(Self {
            orders: RwLock::new(LruCache::new(capacity)),
            history: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            token,
            order_ttl: Duration::from_std(config.order_ttl).unwrap_or(Duration::zero()),
            history_ttl: Duration::from_std(config.history_ttl).unwrap_or(Duration::zero()),
            additional_ttl: Duration::from_std(config.additional_ttl).unwrap_or(Duration::zero()),
        });

        info!(
            "Created in-memory order cache: capacity={}, cleanup interval={}s",
            config.max_cache_size,
            config.cleanup_interval.as_secs()
        );

        tokio::spawn(cleanup_loop(cache.clone(), config.cleanup_interval));

        cache
    }

    fn ensure_live(&self) -> Result<(), CacheError> {
        if self.token.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        Ok(())
    }

    /// Sweeps orders whose TTL elapsed and drops the history snapshot once
    /// its TTL elapsed.
    fn cleanup_expired(&self) {
        let now = Utc::now();

        let expired: Vec<i64> = {
            let guard = self.orders.read().unwrap();
            guard
                .iter()
                .filter(|(_, entry)| now > entry.expires_at)
                .map(|(id, _)| *id)
                .collect()
        };

        if !expired.is_empty() {
            let mut guard = self.orders.write().unwrap();
            for id in &expired {
                guard.pop(id);
            }
            info!("Reaped {} expired orders from in-memory cache", expired.len());
        }

        let history_expired = {
            let guard = self.history.read().unwrap();
            guard.as_ref().is_some_and(|entry| now > entry.expires_at)
        };

        if history_expired {
            *self.history.write().unwrap() = None;
            info!("History snapshot expired, cleared");
        }
    }

    async fn refresh_history_cache(&self, repo: &DynOrderRepository) -> Result<(), CacheError> {
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            debug!("Skipping history cache refresh: another refresh is in flight");
            return Ok(());
        };

        let orders = repo
            .list("")
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        let entry = HistoryEntry {
            expires_at: Utc::now() + self.history_ttl,
            orders,
        };

        let count = entry.orders.len();
        *self.history.write().unwrap() = Some(entry);

        info!("History cache refreshed with {count} orders");
        Ok(())
    }
}

async fn cleanup_loop(cache: Arc<InMemoryOrderCache>, interval: StdDuration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => cache.cleanup_expired(),
            _ = cache.token.cancelled() => {
                info!("In-memory cache reaper stopped: scope cancelled");
                return;
            }
        }
    }
}

#[async_trait]
impl OrderCacheTrait for InMemoryOrderCache {
    async fn set_order(&self, order: &Order) -> Result<(), CacheError> {
        self.ensure_live()?;

        let now = Utc::now();
        if now > order.deadline_at {
            warn!(
                "Refusing to cache order {}: deadline {} already passed",
                order.id, order.deadline_at
            );
            return Err(CacheError::NotCached(order.id));
        }

        let ttl = min(order.deadline_at - now + self.additional_ttl, self.order_ttl);
        let entry = OrderEntry {
            order: order.clone(),
            expires_at: now + ttl,
        };

        let mut guard = self.orders.write().unwrap();
        if let Some((evicted_id, _)) = guard.push(order.id, entry)
            && evicted_id != order.id
        {
            debug!("Cache full, evicted least-recently-used order {evicted_id}");
        }

        debug!("Cached order {} with TTL {}s", order.id, ttl.num_seconds());
        Ok(())
    }

    async fn get_order(&self, order_id: i64) -> Result<Order, CacheError> {
        self.ensure_live()?;

        let entry = {
            let mut guard = self.orders.write().unwrap();
            match guard.get(&order_id) {
                Some(entry) => entry.clone(),
                None => {
                    debug!("Order {order_id} not found in in-memory cache");
                    return Err(CacheError::NotFoundInCache(order_id));
                }
            }
        };

        let now = Utc::now();
        if now > entry.expires_at || now > entry.order.deadline_at {
            warn!("Order {order_id} in cache is expired, evicting");
            self.orders.write().unwrap().pop(&order_id);
            return Err(CacheError::Expired(order_id));
        }

        Ok(entry.order)
    }

    async fn delete_order(&self, order_id: i64) -> Result<(), CacheError> {
        self.ensure_live()?;

        self.orders.write().unwrap().pop(&order_id);
        debug!("Deleted order {order_id} from in-memory cache");
        Ok(())
    }

    async fn clear_order_cache(&self) -> Result<(), CacheError> {
        self.ensure_live()?;

        let mut guard = self.orders.write().unwrap();
        let removed = guard.len();
        guard.clear();

        info!("Cleared {removed} orders from in-memory cache");
        Ok(())
    }

    async fn get_order_history(&self) -> Result<Vec<Order>, CacheError> {
        self.ensure_live()?;

        let guard = self.history.read().unwrap();
        let Some(entry) = guard.as_ref() else {
            return Err(CacheError::HistoryNotFoundInCache);
        };

        if Utc::now() > entry.expires_at {
            return Err(CacheError::HistoryNotFoundInCache);
        }

        // Copied so callers are insulated from the next refresh.
        Ok(entry.orders.clone())
    }

    async fn start_history_cache_refresh(
        self: Arc<Self>,
        repo: DynOrderRepository,
        interval: StdDuration,
    ) {
        info!(
            "Starting history cache refresh every {}s",
            interval.as_secs()
        );

        match tokio::time::timeout(REFRESH_TIMEOUT, self.refresh_history_cache(&repo)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Initial history cache refresh failed: {e}"),
            Err(_) => error!("Initial history cache refresh timed out"),
        }

        let cache = self.clone();
        let token = self.token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match tokio::time::timeout(
                            REFRESH_TIMEOUT,
                            cache.refresh_history_cache(&repo),
                        )
                        .await
                        {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => error!("History cache refresh failed: {e}"),
                            Err(_) => error!("History cache refresh timed out"),
                        }
                    }
                    _ = token.cancelled() => {
                        info!("History cache refresh stopped: scope cancelled");
                        return;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use shared::config::CacheKind;
    use shared::errors::RepositoryError;
    use shared::model::OrderState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::abstract_trait::{OrderCursorQuery, OrderRepositoryTrait};

    fn config(max_size: usize, order_ttl: StdDuration, additional: StdDuration) -> CacheConfig {
        CacheConfig {
            kind: CacheKind::InMemory,
            order_key_prefix: "order:".to_string(),
            history_key: "order:history".to_string(),
            order_ttl,
            history_ttl: StdDuration::from_secs(60),
            additional_ttl: additional,
            max_cache_size: max_size,
            cleanup_interval: StdDuration::from_secs(3600),
            history_refresh_interval: StdDuration::from_secs(3600),
        }
    }

    fn order(id: i64, deadline: DateTime<Utc>) -> Order {
        Order {
            id,
            customer_id: 1,
            state: OrderState::Accepted,
            weight: Decimal::from(5),
            cost: Decimal::from(100),
            package_type: None,
            wrapper: None,
            deadline_at: deadline,
            updated_at: Utc::now(),
            delivered_at: None,
            returned_at: None,
        }
    }

    struct CountingRepo {
        list_calls: AtomicUsize,
        delay: StdDuration,
    }

    impl CountingRepo {
        fn new(delay: StdDuration) -> Arc<Self> {
            Arc::new(Self {
                list_calls: AtomicUsize::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl OrderRepositoryTrait for CountingRepo {
        async fn create(&self, _order: &Order) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn update(&self, _order: &Order) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn delete(&self, _id: i64) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn delete_all(&self) -> Result<u64, RepositoryError> {
            unimplemented!()
        }
        async fn get_by_id(&self, _id: i64) -> Result<Order, RepositoryError> {
            unimplemented!()
        }
        async fn list(&self, _search: &str) -> Result<Vec<Order>, RepositoryError> {
            tokio::time::sleep(self.delay).await;
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![order(99, Utc::now() + Duration::hours(1))])
        }
        async fn list_with_cursor(
            &self,
            _query: &OrderCursorQuery,
        ) -> Result<Vec<Order>, RepositoryError> {
            unimplemented!()
        }
        async fn list_returns_with_cursor(
            &self,
            _cursor_id: i64,
            _limit: i64,
            _search: &str,
        ) -> Result<Vec<Order>, RepositoryError> {
            unimplemented!()
        }
        async fn list_actual(&self) -> Result<Vec<Order>, RepositoryError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn set_then_get_before_ttl_returns_the_order() {
        let cache = InMemoryOrderCache::new(
            &config(10, StdDuration::from_secs(60), StdDuration::from_secs(60)),
            CancellationToken::new(),
        );

        let order = order(1, Utc::now() + Duration::hours(1));
        cache.set_order(&order).await.unwrap();

        let cached = cache.get_order(1).await.unwrap();
        assert_eq!(cached, order);
    }

    #[tokio::test]
    async fn expired_entry_is_reported_and_removed() {
        let cache = InMemoryOrderCache::new(
            &config(10, StdDuration::ZERO, StdDuration::ZERO),
            CancellationToken::new(),
        );

        let order = order(1, Utc::now() + Duration::hours(1));
        cache.set_order(&order).await.unwrap();

        tokio::time::sleep(StdDuration::from_millis(20)).await;

        assert!(matches!(
            cache.get_order(1).await,
            Err(CacheError::Expired(1))
        ));
        // The expired entry is gone, not just hidden.
        assert!(matches!(
            cache.get_order(1).await,
            Err(CacheError::NotFoundInCache(1))
        ));
    }

    #[tokio::test]
    async fn orders_past_deadline_are_refused() {
        let cache = InMemoryOrderCache::new(
            &config(10, StdDuration::from_secs(60), StdDuration::ZERO),
            CancellationToken::new(),
        );

        let order = order(1, Utc::now() - Duration::seconds(1));
        assert!(matches!(
            cache.set_order(&order).await,
            Err(CacheError::NotCached(1))
        ));
    }

    #[tokio::test]
    async fn least_recently_used_order_is_evicted_at_capacity() {
        let cache = InMemoryOrderCache::new(
            &config(2, StdDuration::from_secs(60), StdDuration::from_secs(60)),
            CancellationToken::new(),
        );

        let deadline = Utc::now() + Duration::hours(1);
        cache.set_order(&order(1, deadline)).await.unwrap();
        cache.set_order(&order(2, deadline)).await.unwrap();

        // Touch 1 so that 2 becomes the eviction candidate.
        cache.get_order(1).await.unwrap();
        cache.set_order(&order(3, deadline)).await.unwrap();

        assert!(cache.get_order(1).await.is_ok());
        assert!(matches!(
            cache.get_order(2).await,
            Err(CacheError::NotFoundInCache(2))
        ));
        assert!(cache.get_order(3).await.is_ok());
    }

    #[tokio::test]
    async fn clear_removes_orders_but_keeps_history() {
        let cache = InMemoryOrderCache::new(
            &config(10, StdDuration::from_secs(60), StdDuration::from_secs(60)),
            CancellationToken::new(),
        );

        let repo: DynOrderRepository = CountingRepo::new(StdDuration::ZERO);
        cache.refresh_history_cache(&repo).await.unwrap();
        cache
            .set_order(&order(1, Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        cache.clear_order_cache().await.unwrap();

        assert!(matches!(
            cache.get_order(1).await,
            Err(CacheError::NotFoundInCache(1))
        ));
        assert_eq!(cache.get_order_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let cache = InMemoryOrderCache::new(
            &config(10, StdDuration::from_secs(60), StdDuration::from_secs(60)),
            CancellationToken::new(),
        );

        assert!(cache.delete_order(404).await.is_ok());
        assert!(cache.delete_order(404).await.is_ok());
    }

    #[tokio::test]
    async fn reaper_sweeps_expired_entries() {
        let cache = InMemoryOrderCache::new(
            &config(10, StdDuration::ZERO, StdDuration::ZERO),
            CancellationToken::new(),
        );

        cache
            .set_order(&order(1, Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        cache.cleanup_expired();

        // Swept by the reaper, so the lookup reports a plain miss.
        assert!(matches!(
            cache.get_order(1).await,
            Err(CacheError::NotFoundInCache(1))
        ));
    }

    #[tokio::test]
    async fn history_refresh_is_single_flight() {
        let cache = InMemoryOrderCache::new(
            &config(10, StdDuration::from_secs(60), StdDuration::from_secs(60)),
            CancellationToken::new(),
        );

        let repo = CountingRepo::new(StdDuration::from_millis(100));
        let dyn_repo: DynOrderRepository = repo.clone();

        let (first, second) = tokio::join!(
            cache.refresh_history_cache(&dyn_repo),
            cache.refresh_history_cache(&dyn_repo),
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_scope_fails_every_operation() {
        let token = CancellationToken::new();
        let cache = InMemoryOrderCache::new(
            &config(10, StdDuration::from_secs(60), StdDuration::from_secs(60)),
            token.clone(),
        );

        let order = order(1, Utc::now() + Duration::hours(1));
        cache.set_order(&order).await.unwrap();

        token.cancel();

        assert!(matches!(
            cache.set_order(&order).await,
            Err(CacheError::Cancelled)
        ));
        assert!(matches!(cache.get_order(1).await, Err(CacheError::Cancelled)));
        assert!(matches!(
            cache.delete_order(1).await,
            Err(CacheError::Cancelled)
        ));
        assert!(matches!(
            cache.clear_order_cache().await,
            Err(CacheError::Cancelled)
        ));
        assert!(matches!(
            cache.get_order_history().await,
            Err(CacheError::Cancelled)
        ));
    }
}
