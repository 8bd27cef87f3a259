use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::errors::cache::CacheError;
use crate::errors::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Repository error: {0}")]
    Repo(#[from] RepositoryError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid order ID: {0}")]
    InvalidOrderId(i64),

    #[error("Storage deadline is in the past: {deadline} (current time: {now})")]
    StorageDeadlinePassed {
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Order {0} already exists")]
    OrderExists(i64),

    #[error("Weight must be a positive number, got {0}")]
    NegativeWeight(Decimal),

    #[error("Cost must be a positive number, got {0}")]
    NegativeCost(Decimal),

    #[error("Order {0} belongs to another customer")]
    WrongCustomer(i64),

    #[error("Order {0} cannot be handed out in its current state")]
    WrongState(i64),

    #[error("Storage period of order {id} has expired: {deadline} (current time: {now})")]
    StorageExpired {
        id: i64,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Order {0} has not been delivered to the customer, return is impossible")]
    NotDelivered(i64),

    #[error("Storage period of order {id} has not expired yet: {deadline} (current time: {now})")]
    DeadlineNotExpired {
        id: i64,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Return window for order {id} has closed: delivered at {delivered_at} (current time: {now})")]
    ReturnExpired {
        id: i64,
        delivered_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Order {0} was already delivered to the customer, courier return is impossible")]
    OrderAlreadyDelivered(i64),

    #[error("Package weight limit exceeded: {weight} kg over the {max} kg limit")]
    PackageWeightExceeded { weight: Decimal, max: Decimal },

    #[error("Unknown package type: {0}")]
    UnknownPackageType(String),

    #[error("Unknown wrapper type: {0}")]
    UnknownWrapperType(String),

    #[error("Invalid deadline format: {0}")]
    InvalidDeadline(String),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
