mod database;
mod myconfig;
mod redis;

pub use self::database::{ConnectionManager, ConnectionPool};
pub use self::myconfig::{
    AuditLoggerConfig, CacheConfig, CacheKind, Config, KafkaConfig, OutboxConfig,
};
pub use self::redis::{RedisConfig, RedisPool};
