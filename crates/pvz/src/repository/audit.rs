use async_trait::async_trait;
use shared::config::ConnectionPool;
use shared::errors::RepositoryError;
use shared::model::{AuditLog, AuditLogRow, AuditTaskRef};
use tracing::{debug, error};

use crate::abstract_trait::AuditRepositoryTrait;

#[derive(Clone)]
pub struct PostgresAuditRepository {
    db: ConnectionPool,
}

impl PostgresAuditRepository {
    pub fn new(db: ConnectionPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditRepositoryTrait for PostgresAuditRepository {
    async fn create_logs_with_tasks(&self, logs: &[AuditLog]) -> Result<(), RepositoryError> {
        if logs.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.begin().await?;

        let mut log_ids = Vec::with_capacity(logs.len());

        for log in logs {
            let body = log
                .body
                .as_ref()
                .map(|value| serde_json::to_string(value))
                .transpose()
                .map_err(|e| RepositoryError::InvalidArgument(format!("log body: {e}")))?;

            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO audit_logs
                    (timestamp, type, path, method, request_id, ip, body,
                     status_code, order_id, old_status, new_status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                RETURNING id
                "#,
            )
            .bind(log.timestamp)
            .bind(log.kind.as_str())
            .bind(log.path.as_deref())
            .bind(log.method.as_deref())
            .bind(log.request_id.as_deref())
            .bind(log.ip.as_deref())
            .bind(body)
            .bind(log.status_code)
            .bind(log.order_id)
            .bind(log.old_status.as_deref())
            .bind(log.new_status.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| {
                error!("❌ Failed to insert audit log: {:?}", err);
                RepositoryError::from(err)
            })?;

            log_ids.push(id);
        }

        for log_id in &log_ids {
            sqlx::query("INSERT INTO audit_tasks (log_id) VALUES ($1)")
                .bind(log_id)
                .execute(&mut *tx)
                .await
                .map_err(|err| {
                    error!("❌ Failed to insert audit task for log {log_id}: {:?}", err);
                    RepositoryError::from(err)
                })?;
        }

        tx.commit().await?;

        debug!("Persisted {} audit logs with dispatch tasks", logs.len());
        Ok(())
    }

    async fn fetch_tasks_ids(&self, limit: i64) -> Result<Vec<AuditTaskRef>, RepositoryError> {
        let mut tx = self.db.begin().await?;

        // SKIP LOCKED keeps concurrent workers off each other's batches; a
        // crashed worker's rows unlock when its transaction aborts.
        let tasks = sqlx::query_as::<_, AuditTaskRef>(
            r#"
            UPDATE audit_tasks
            SET status = 'PROCESSING'::task_status, updated_at = NOW()
            WHERE id IN (
                SELECT id FROM audit_tasks
                WHERE (status = 'CREATED'::task_status OR
                      (status = 'FAILED'::task_status AND attempts_left > 0 AND
                       (next_attempt_after IS NULL OR next_attempt_after <= NOW())))
                ORDER BY created_at
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            RETURNING id, log_id
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(tasks)
    }

    async fn get_audit_log(&self, id: i64) -> Result<AuditLog, RepositoryError> {
        let row = sqlx::query_as::<_, AuditLogRow>(
            r#"
            SELECT
                id, timestamp, type, path, method, request_id, ip, body,
                status_code, order_id, old_status, new_status
            FROM audit_logs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        AuditLog::try_from(row).map_err(RepositoryError::Decode)
    }

    async fn mark_task_completed(&self, task_id: i64) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM audit_tasks WHERE id = $1 FOR UPDATE)")
                .bind(task_id)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query(
            r#"
            UPDATE audit_tasks
            SET
                status = 'COMPLETED'::task_status,
                updated_at = NOW(),
                completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            error!("❌ Failed to mark task {task_id} completed: {:?}", err);
            RepositoryError::from(err)
        })?;

        tx.commit().await?;
        Ok(())
    }

    async fn mark_task_failed(
        &self,
        task_id: i64,
        error_message: &str,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM audit_tasks WHERE id = $1 FOR UPDATE)")
                .bind(task_id)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Err(RepositoryError::NotFound);
        }

        // A task that spends its last attempt is parked as NO_ATTEMPTS_LEFT
        // with no scheduled retry.
        sqlx::query(
            r#"
            UPDATE audit_tasks
            SET
                status = CASE WHEN attempts_left > 1
                              THEN 'FAILED'::task_status
                              ELSE 'NO_ATTEMPTS_LEFT'::task_status END,
                attempts_left = attempts_left - 1,
                next_attempt_after = CASE WHEN attempts_left > 1
                                          THEN NOW() + INTERVAL '2 seconds'
                                          ELSE NULL END,
                updated_at = NOW(),
                error_message = $2
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(error_message)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            error!("❌ Failed to mark task {task_id} failed: {:?}", err);
            RepositoryError::from(err)
        })?;

        tx.commit().await?;
        Ok(())
    }
}
