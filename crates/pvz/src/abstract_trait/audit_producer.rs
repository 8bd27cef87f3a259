use std::sync::Arc;

use async_trait::async_trait;
use shared::errors::ServiceError;
use shared::model::AuditLog;

pub type DynAuditProducer = Arc<dyn AuditProducerTrait + Send + Sync>;

#[async_trait]
pub trait AuditProducerTrait {
    /// Publishes one audit event keyed by its dispatch-task id and waits for
    /// broker acknowledgement.
    async fn send_message(&self, task_id: i64, payload: &AuditLog) -> Result<(), ServiceError>;
}
