use std::time::Duration;

use async_trait::async_trait;
use shared::errors::ServiceError;
use shared::model::AuditLog;
use tracing::{error, info, warn};

use crate::abstract_trait::{DynAuditRepository, LogProcessorTrait};
use crate::audit::filter::load_filter_config;

const PERSIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Prints events whose JSON form matches at least one filter substring; an
/// empty filter list prints everything.
pub struct StdoutLogProcessor {
    filters: Vec<String>,
}

impl StdoutLogProcessor {
    pub fn new(filter_path: &str) -> Self {
        let filters = match load_filter_config(filter_path) {
            Ok(config) => {
                if config.stdout_filters.is_empty() {
                    info!("No stdout audit filters configured, printing all events");
                } else {
                    info!("Loaded stdout audit filters: {:?}", config.stdout_filters);
                }
                config.stdout_filters
            }
            Err(e) => {
                warn!("Failed to load audit filter config: {e}. No filters applied.");
                Vec::new()
            }
        };

        Self { filters }
    }

    fn print_log(&self, worker_name: &str, log: &AuditLog) {
        match serde_json::to_string_pretty(log) {
            Ok(data) => info!("[AUDIT] [{worker_name}] {data}"),
            Err(e) => error!("[{worker_name}] Failed to serialize audit log: {e}"),
        }
    }
}

#[async_trait]
impl LogProcessorTrait for StdoutLogProcessor {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn process_logs(
        &self,
        worker_name: &str,
        batch: &[AuditLog],
    ) -> Result<(), ServiceError> {
        for log in batch {
            if self.filters.is_empty() {
                self.print_log(worker_name, log);
                continue;
            }

            let serialized = match serde_json::to_string(log) {
                Ok(data) => data.to_lowercase(),
                Err(e) => {
                    error!("[{worker_name}] Failed to serialize audit log for filtering: {e}");
                    continue;
                }
            };

            if self
                .filters
                .iter()
                .any(|filter| serialized.contains(&filter.to_lowercase()))
            {
                self.print_log(worker_name, log);
            }
        }

        Ok(())
    }
}

/// Hands whole batches to the transactional outbox insert.
pub struct PersistentLogProcessor {
    repo: DynAuditRepository,
}

impl PersistentLogProcessor {
    pub fn new(repo: DynAuditRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl LogProcessorTrait for PersistentLogProcessor {
    fn name(&self) -> &'static str {
        "db"
    }

    async fn process_logs(
        &self,
        worker_name: &str,
        batch: &[AuditLog],
    ) -> Result<(), ServiceError> {
        match tokio::time::timeout(PERSIST_TIMEOUT, self.repo.create_logs_with_tasks(batch)).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("[{worker_name}] Failed to persist audit batch: {e}");
                Err(e.into())
            }
            Err(_) => {
                error!("[{worker_name}] Persisting audit batch timed out");
                Err(ServiceError::Internal(
                    "audit batch persist timed out".to_string(),
                ))
            }
        }
    }
}
