use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use super::redis::RedisConfig;

fn required(key: &str) -> Result<String> {
    std::env::var(key).context(format!("Missing environment variable: {key}"))
}

fn optional_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}

/// Which order-cache backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    InMemory,
    Redis,
}

impl FromStr for CacheKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "inmem" => Ok(CacheKind::InMemory),
            "redis" => Ok(CacheKind::Redis),
            other => Err(format!("unknown cache kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub kind: CacheKind,
    pub order_key_prefix: String,
    pub history_key: String,
    pub order_ttl: Duration,
    pub history_ttl: Duration,
    pub additional_ttl: Duration,
    pub max_cache_size: usize,
    pub cleanup_interval: Duration,
    pub history_refresh_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub audit_topic: String,
    pub audit_group_id: String,
}

#[derive(Debug, Clone)]
pub struct AuditLoggerConfig {
    pub workers_num: usize,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub filter_path: String,
}

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub workers_num: usize,
    pub batch_size: i64,
    pub polling_rate: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_min_conn: u32,
    pub db_max_conn: u32,
    pub redis: RedisConfig,
    pub cache: CacheConfig,
    pub kafka: KafkaConfig,
    pub audit_logger: AuditLoggerConfig,
    pub outbox: OutboxConfig,
}

impl Config {
    pub fn init() -> Result<Self> {
        let database_url = required("DATABASE_URL")?;
        let db_min_conn = optional_or("DB_MIN_CONN", 1)?;
        let db_max_conn = optional_or("DB_MAX_CONN", 10)?;

        let redis = RedisConfig {
            host: optional_or("REDIS_HOST", "localhost".to_string())?,
            port: optional_or("REDIS_PORT", 6379)?,
            db: optional_or("REDIS_DB", 0)?,
            password: std::env::var("REDIS_PASSWORD").ok(),
        };

        let cache = CacheConfig {
            kind: optional_or("CACHE_KIND", CacheKind::InMemory)?,
            order_key_prefix: optional_or("CACHE_ORDER_KEY_PREFIX", "order:".to_string())?,
            history_key: optional_or("CACHE_HISTORY_KEY", "order:history".to_string())?,
            order_ttl: Duration::from_secs(60 * optional_or("CACHE_ORDER_TTL_MIN", 30u64)?),
            history_ttl: Duration::from_secs(60 * optional_or("CACHE_HISTORY_TTL_MIN", 10u64)?),
            additional_ttl: Duration::from_secs(60 * optional_or("CACHE_ADDITIONAL_TTL_MIN", 60u64)?),
            max_cache_size: optional_or("CACHE_MAX_SIZE", 100)?,
            cleanup_interval: Duration::from_secs(
                60 * optional_or("CACHE_CLEANUP_INTERVAL_MIN", 5u64)?,
            ),
            history_refresh_interval: Duration::from_secs(
                60 * optional_or("CACHE_HISTORY_REFRESH_MIN", 5u64)?,
            ),
        };

        let kafka = KafkaConfig {
            brokers: optional_or("KAFKA_BROKERS", "localhost:9092".to_string())?,
            audit_topic: optional_or("KAFKA_AUDIT_TOPIC", "audit-logs".to_string())?,
            audit_group_id: optional_or("KAFKA_AUDIT_GROUP_ID", "pvz-audit".to_string())?,
        };

        let audit_logger = AuditLoggerConfig {
            workers_num: optional_or("AUDIT_WORKERS", 2)?,
            batch_size: optional_or("AUDIT_BATCH_SIZE", 5)?,
            batch_timeout: Duration::from_millis(optional_or("AUDIT_BATCH_TIMEOUT_MS", 500u64)?),
            filter_path: optional_or("AUDIT_FILTER_PATH", "audit_filters.json".to_string())?,
        };

        let outbox = OutboxConfig {
            workers_num: optional_or("OUTBOX_WORKERS", 3)?,
            batch_size: optional_or("OUTBOX_BATCH_SIZE", 5)?,
            polling_rate: Duration::from_millis(optional_or("OUTBOX_POLLING_MS", 500u64)?),
        };

        Ok(Self {
            database_url,
            db_min_conn,
            db_max_conn,
            redis,
            cache,
            kafka,
            audit_logger,
            outbox,
        })
    }
}
