use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Order {0} not found in cache")]
    NotFoundInCache(i64),

    #[error("Order {0} has expired in cache")]
    Expired(i64),

    #[error("Order {0} not cached: storage deadline already passed")]
    NotCached(i64),

    #[error("Order history not found in cache")]
    HistoryNotFoundInCache,

    #[error("Cache operation cancelled")]
    Cancelled,

    #[error("Cache backend error: {0}")]
    Backend(String),
}
