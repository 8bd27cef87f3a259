use std::sync::Arc;

use async_trait::async_trait;
use shared::errors::ServiceError;
use shared::model::AuditLog;

pub type DynLogProcessor = Arc<dyn LogProcessorTrait + Send + Sync>;

/// Downstream half of an audit worker pool: receives whole batches.
#[async_trait]
pub trait LogProcessorTrait {
    fn name(&self) -> &'static str;

    async fn process_logs(&self, worker_name: &str, batch: &[AuditLog])
    -> Result<(), ServiceError>;
}
