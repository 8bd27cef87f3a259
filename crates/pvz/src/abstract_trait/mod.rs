mod audit_producer;
mod audit_repository;
mod audit_sink;
mod log_processor;
mod order_cache;
mod order_repository;

pub use self::audit_producer::{AuditProducerTrait, DynAuditProducer};
pub use self::audit_repository::{AuditRepositoryTrait, DynAuditRepository};
pub use self::audit_sink::{AuditSinkTrait, DynAuditSink};
pub use self::log_processor::{DynLogProcessor, LogProcessorTrait};
pub use self::order_cache::{DynOrderCache, OrderCacheTrait};
pub use self::order_repository::{DynOrderRepository, OrderCursorQuery, OrderRepositoryTrait};
