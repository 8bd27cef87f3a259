mod inmem;
mod redis;

pub use self::inmem::InMemoryOrderCache;
pub use self::redis::RedisOrderCache;

use anyhow::{Context, Result};
use shared::config::{CacheConfig, CacheKind, RedisConfig, RedisPool};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::abstract_trait::DynOrderCache;

/// Picks the cache backend from configuration.
pub async fn new_order_cache(
    cache_config: &CacheConfig,
    redis_config: &RedisConfig,
    token: CancellationToken,
) -> Result<DynOrderCache> {
    match cache_config.kind {
        CacheKind::InMemory => {
            info!("Using in-memory order cache");
            Ok(InMemoryOrderCache::new(cache_config, token) as DynOrderCache)
        }
        CacheKind::Redis => {
            info!("Using redis order cache");
            let pool = RedisPool::new(redis_config)?;
            pool.ping()
                .await
                .context("Failed to ping Redis server for the order cache")?;
            Ok(RedisOrderCache::new(pool, cache_config, token) as DynOrderCache)
        }
    }
}
