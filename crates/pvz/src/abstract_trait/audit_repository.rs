use std::sync::Arc;

use async_trait::async_trait;
use shared::errors::RepositoryError;
use shared::model::{AuditLog, AuditTaskRef};

pub type DynAuditRepository = Arc<dyn AuditRepositoryTrait + Send + Sync>;

#[async_trait]
pub trait AuditRepositoryTrait {
    /// Persists the batch and one dispatch task per log in a single
    /// transaction.
    async fn create_logs_with_tasks(&self, logs: &[AuditLog]) -> Result<(), RepositoryError>;

    /// Atomically reserves up to `limit` dispatchable tasks (moves them to
    /// PROCESSING under `FOR UPDATE SKIP LOCKED`) and returns their ids.
    async fn fetch_tasks_ids(&self, limit: i64) -> Result<Vec<AuditTaskRef>, RepositoryError>;

    async fn get_audit_log(&self, id: i64) -> Result<AuditLog, RepositoryError>;

    async fn mark_task_completed(&self, task_id: i64) -> Result<(), RepositoryError>;

    /// Decrements the retry budget; keeps the task dispatchable two seconds
    /// later while attempts remain, otherwise parks it as NO_ATTEMPTS_LEFT.
    async fn mark_task_failed(&self, task_id: i64, error_message: &str)
    -> Result<(), RepositoryError>;
}
