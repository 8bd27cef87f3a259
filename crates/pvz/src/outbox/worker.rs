use std::sync::Mutex;
use std::time::Duration;

use shared::config::OutboxConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::abstract_trait::{DynAuditProducer, DynAuditRepository};

const BATCH_BUDGET: Duration = Duration::from_secs(5);

/// Worker pool that drains the transactional outbox: reserves task batches,
/// publishes their events to the bus, and records terminal outcomes.
/// Workers never coordinate in memory; `SKIP LOCKED` at the store keeps
/// them off each other's batches.
pub struct OutboxWorkerPool {
    workers_num: usize,
    batch_size: i64,
    polling_rate: Duration,
    audit_repo: DynAuditRepository,
    producer: DynAuditProducer,
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl OutboxWorkerPool {
    pub fn new(
        audit_repo: DynAuditRepository,
        producer: DynAuditProducer,
        config: &OutboxConfig,
        token: CancellationToken,
    ) -> Self {
        info!(
            "Creating outbox worker pool: workers={}, batch_size={}, polling_rate={:?}",
            config.workers_num, config.batch_size, config.polling_rate
        );

        Self {
            workers_num: config.workers_num,
            batch_size: config.batch_size,
            polling_rate: config.polling_rate,
            audit_repo,
            producer,
            token,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn start(&self) {
        info!("Starting outbox worker pool with {} workers", self.workers_num);

        let mut handles = self.handles.lock().unwrap();
        for worker_id in 1..=self.workers_num {
            handles.push(tokio::spawn(worker_routine(
                self.audit_repo.clone(),
                self.producer.clone(),
                self.batch_size,
                self.polling_rate,
                self.token.clone(),
                worker_id,
            )));
        }
    }

    pub async fn stop(&self) {
        info!("Stopping outbox worker pool");
        self.token.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().unwrap();
            guard.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }

        info!("Outbox worker pool stopped");
    }
}

async fn worker_routine(
    audit_repo: DynAuditRepository,
    producer: DynAuditProducer,
    batch_size: i64,
    polling_rate: Duration,
    token: CancellationToken,
    worker_id: usize,
) {
    let name = format!("outbox-worker-{worker_id}");
    info!("[{name}] Worker started");

    let mut ticker = tokio::time::interval(polling_rate);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                process_outbox_batch(&audit_repo, &producer, batch_size, &name).await;
            }
            _ = token.cancelled() => {
                info!("[{name}] Worker stopped");
                return;
            }
        }
    }
}

/// One polling tick: everything a worker does for a batch runs under a
/// five-second budget. A batch cut off mid-flight stays PROCESSING and is
/// recovered by the deferred-retry policy.
pub(crate) async fn process_outbox_batch(
    audit_repo: &DynAuditRepository,
    producer: &DynAuditProducer,
    batch_size: i64,
    name: &str,
) {
    let work = process_batch_inner(audit_repo, producer, batch_size, name);
    if tokio::time::timeout(BATCH_BUDGET, work).await.is_err() {
        warn!("[{name}] Outbox batch ran past its budget");
    }
}

async fn process_batch_inner(
    audit_repo: &DynAuditRepository,
    producer: &DynAuditProducer,
    batch_size: i64,
    name: &str,
) {
    let tasks = match audit_repo.fetch_tasks_ids(batch_size).await {
        Ok(tasks) => tasks,
        Err(e) => {
            error!("[{name}] Failed to reserve outbox tasks: {e}");
            return;
        }
    };

    if tasks.is_empty() {
        debug!("[{name}] No dispatchable tasks");
        return;
    }

    info!("[{name}] Reserved {} tasks", tasks.len());

    for task in tasks {
        debug!(
            "[{name}] Processing task: task_id={}, log_id={}",
            task.task_id, task.log_id
        );

        let log = match audit_repo.get_audit_log(task.log_id).await {
            Ok(log) => log,
            Err(e) => {
                error!("[{name}] Failed to load audit log {}: {e}", task.log_id);
                if let Err(mark_err) = audit_repo
                    .mark_task_failed(task.task_id, &e.to_string())
                    .await
                {
                    error!(
                        "[{name}] Failed to mark task {} failed: {mark_err}",
                        task.task_id
                    );
                }
                continue;
            }
        };

        if let Err(e) = producer.send_message(task.task_id, &log).await {
            error!(
                "[{name}] Failed to publish task {} to the bus: {e}",
                task.task_id
            );
            if let Err(mark_err) = audit_repo
                .mark_task_failed(task.task_id, &e.to_string())
                .await
            {
                error!(
                    "[{name}] Failed to mark task {} failed: {mark_err}",
                    task.task_id
                );
            }
            continue;
        }

        match audit_repo.mark_task_completed(task.task_id).await {
            Ok(()) => debug!("[{name}] Task {} completed", task.task_id),
            Err(e) => error!(
                "[{name}] Failed to mark task {} completed: {e}",
                task.task_id
            ),
        }
    }
}
