use std::cmp::min;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use deadpool_redis::redis;
use shared::config::{CacheConfig, RedisPool};
use shared::errors::CacheError;
use shared::model::Order;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::abstract_trait::{DynOrderRepository, OrderCacheTrait};

const REFRESH_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Remote look-aside backend. TTLs are applied at the storage layer, so the
/// reaping the in-process backend does by hand happens server-side here.
pub struct RedisOrderCache {
    pool: RedisPool,
    refresh_lock: Mutex<()>,
    token: CancellationToken,

    order_key_prefix: String,
    history_key: String,
    order_ttl: Duration,
    history_ttl: Duration,
    additional_ttl: Duration,
}

impl RedisOrderCache {
    pub fn new(pool: RedisPool, config: &CacheConfig, token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            pool,
            refresh_lock: Mutex::new(()),
            token,
            order_key_prefix: config.order_key_prefix.clone(),
            history_key: config.history_key.clone(),
            order_ttl: Duration::from_std(config.order_ttl).unwrap_or(Duration::zero()),
            history_ttl: Duration::from_std(config.history_ttl).unwrap_or(Duration::zero()),
            additional_ttl: Duration::from_std(config.additional_ttl).unwrap_or(Duration::zero()),
        })
    }

    fn order_key(&self, order_id: i64) -> String {
        format!("{}{}", self.order_key_prefix, order_id)
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
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

        let json =
            serde_json::to_string(&orders).map_err(|e| CacheError::Backend(e.to_string()))?;

        let mut conn = self.conn().await?;
        redis::cmd("SET")
            .arg(&self.history_key)
            .arg(json)
            .arg("EX")
            .arg(self.history_ttl.num_seconds().max(1))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        info!("History cache refreshed with {} orders", orders.len());
        Ok(())
    }
}

#[async_trait]
impl OrderCacheTrait for RedisOrderCache {
    async fn set_order(&self, order: &Order) -> Result<(), CacheError> {
        let now = Utc::now();
        if now > order.deadline_at {
            warn!(
                "Refusing to cache order {}: deadline {} already passed",
                order.id, order.deadline_at
            );
            return Err(CacheError::NotCached(order.id));
        }

        let json = serde_json::to_string(order).map_err(|e| CacheError::Backend(e.to_string()))?;

        let ttl = min(order.deadline_at - now + self.additional_ttl, self.order_ttl);

        debug!(
            "Caching order {} in redis with TTL {}s (deadline {})",
            order.id,
            ttl.num_seconds(),
            order.deadline_at
        );

        let mut conn = self.conn().await?;
        redis::cmd("SET")
            .arg(self.order_key(order.id))
            .arg(json)
            .arg("EX")
            .arg(ttl.num_seconds().max(1))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| {
                error!("Failed to cache order {}: {e}", order.id);
                CacheError::Backend(e.to_string())
            })?;

        Ok(())
    }

    async fn get_order(&self, order_id: i64) -> Result<Order, CacheError> {
        let mut conn = self.conn().await?;

        let json: Option<String> = redis::cmd("GET")
            .arg(self.order_key(order_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        let Some(json) = json else {
            debug!("Order {order_id} not found in redis cache");
            return Err(CacheError::NotFoundInCache(order_id));
        };

        let order: Order =
            serde_json::from_str(&json).map_err(|e| CacheError::Backend(e.to_string()))?;

        if Utc::now() > order.deadline_at {
            warn!("Order {order_id} in cache is past its deadline, evicting");
            if let Err(e) = self.delete_order(order_id).await {
                warn!("Failed to evict expired order {order_id}: {e}");
            }
            return Err(CacheError::Expired(order_id));
        }

        Ok(order)
    }

    async fn delete_order(&self, order_id: i64) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;

        redis::cmd("DEL")
            .arg(self.order_key(order_id))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        debug!("Deleted order {order_id} from redis cache");
        Ok(())
    }

    async fn clear_order_cache(&self) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;

        let pattern = format!("{}*", self.order_key_prefix);
        let mut keys: Vec<String> = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        // The history snapshot lives under the same prefix in the default
        // configuration; clearing orders must leave it untouched.
        keys.retain(|key| *key != self.history_key);

        if keys.is_empty() {
            info!("No cached orders to clear");
            return Ok(());
        }

        let removed = keys.len();
        redis::cmd("DEL")
            .arg(keys)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        info!("Cleared {removed} orders from redis cache");
        Ok(())
    }

    async fn get_order_history(&self) -> Result<Vec<Order>, CacheError> {
        let mut conn = self.conn().await?;

        let json: Option<String> = redis::cmd("GET")
            .arg(&self.history_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        let Some(json) = json else {
            return Err(CacheError::HistoryNotFoundInCache);
        };

        serde_json::from_str(&json).map_err(|e| CacheError::Backend(e.to_string()))
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
