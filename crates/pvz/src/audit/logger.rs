use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shared::config::AuditLoggerConfig;
use shared::model::AuditLog;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::abstract_trait::{AuditSinkTrait, DynLogProcessor};

const MAX_LOG_CHAN_SIZE: usize = 100;
const OVERFLOW_DRAIN_INTERVAL: Duration = Duration::from_millis(100);

type Overflow = Arc<Mutex<VecDeque<AuditLog>>>;

/// In-process fan-out of audit events: a bounded inbound mailbox, an
/// overflow spill list, and one worker pool per downstream processor.
///
/// `log` never blocks; events that do not fit the mailbox wait in the
/// overflow list until the drainer moves them back.
pub struct AuditLogger {
    main_tx: mpsc::Sender<AuditLog>,
    overflow: Overflow,
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl AuditLogger {
    pub fn new(
        token: CancellationToken,
        processors: Vec<DynLogProcessor>,
        config: &AuditLoggerConfig,
    ) -> Self {
        let (main_tx, main_rx) = mpsc::channel(MAX_LOG_CHAN_SIZE);
        let overflow: Overflow = Arc::new(Mutex::new(VecDeque::new()));

        let mut handles = Vec::new();
        let mut pool_senders = Vec::with_capacity(processors.len());

        for processor in processors {
            let (pool_tx, pool_rx) = mpsc::channel(MAX_LOG_CHAN_SIZE);
            let pool_rx = Arc::new(tokio::sync::Mutex::new(pool_rx));

            for i in 0..config.workers_num {
                let name = format!("{}-worker-{}", processor.name(), i + 1);
                handles.push(tokio::spawn(worker_loop(
                    processor.clone(),
                    pool_rx.clone(),
                    name,
                    config.batch_size,
                    config.batch_timeout,
                    token.clone(),
                )));
            }

            pool_senders.push(pool_tx);
        }

        handles.push(tokio::spawn(fan_out(main_rx, pool_senders, token.clone())));
        handles.push(tokio::spawn(overflow_drainer(
            overflow.clone(),
            main_tx.clone(),
            token.clone(),
        )));

        Self {
            main_tx,
            overflow,
            token,
            handles: Mutex::new(handles),
        }
    }

    /// Cancels the pipeline and waits for every worker to flush its partial
    /// batch. Overflow events that never reached the pools are printed by
    /// the drainer on its way out.
    pub async fn shutdown(&self) {
        self.token.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().unwrap();
            guard.drain(..).collect()
        };

        for handle in handles {
            let _ = handle.await;
        }

        info!("Audit logger stopped");
    }
}

impl AuditSinkTrait for AuditLogger {
    fn log(&self, log: AuditLog) {
        if let Err(err) = self.main_tx.try_send(log) {
            let log = match err {
                TrySendError::Full(log) | TrySendError::Closed(log) => log,
            };
            self.overflow.lock().unwrap().push_back(log);
        }
    }
}

/// Copies every inbound event into each pool's inbox. Pool sends may wait
/// for inbox space; only the caller-facing `log` is non-blocking.
async fn fan_out(
    mut main_rx: mpsc::Receiver<AuditLog>,
    pool_senders: Vec<mpsc::Sender<AuditLog>>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            maybe = main_rx.recv() => {
                let Some(log) = maybe else {
                    return; // mailbox closed, pool senders drop with us
                };

                for sender in &pool_senders {
                    tokio::select! {
                        result = sender.send(log.clone()) => {
                            if result.is_err() {
                                return;
                            }
                        }
                        _ = token.cancelled() => return,
                    }
                }
            }
            _ = token.cancelled() => return,
        }
    }
}

async fn worker_loop(
    processor: DynLogProcessor,
    pool_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<AuditLog>>>,
    name: String,
    batch_size: usize,
    batch_timeout: Duration,
    token: CancellationToken,
) {
    info!("[{name}] Audit worker started");

    let mut batch: Vec<AuditLog> = Vec::with_capacity(batch_size);
    let mut deadline = Instant::now() + batch_timeout;

    loop {
        tokio::select! {
            maybe = async { pool_rx.lock().await.recv().await } => {
                match maybe {
                    Some(log) => {
                        batch.push(log);
                        if batch.len() >= batch_size {
                            flush(&processor, &name, &mut batch).await;
                            deadline = Instant::now() + batch_timeout;
                        }
                    }
                    None => {
                        flush(&processor, &name, &mut batch).await;
                        info!("[{name}] Audit worker stopped: inbox closed");
                        return;
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                if !batch.is_empty() {
                    flush(&processor, &name, &mut batch).await;
                }
                deadline = Instant::now() + batch_timeout;
            }
            _ = token.cancelled() => {
                // One final delivery of the partial batch before exit.
                flush(&processor, &name, &mut batch).await;
                info!("[{name}] Audit worker stopped: scope cancelled");
                return;
            }
        }
    }
}

async fn flush(processor: &DynLogProcessor, name: &str, batch: &mut Vec<AuditLog>) {
    if batch.is_empty() {
        return;
    }

    if let Err(e) = processor.process_logs(name, batch).await {
        error!("[{name}] Failed to process audit batch: {e}");
    }

    batch.clear();
}

/// Wakes every 100 ms and moves overflow events back into the mailbox while
/// space is available. On shutdown any leftovers are surfaced straight to
/// stdout; they never entered the persistent path.
async fn overflow_drainer(overflow: Overflow, main_tx: mpsc::Sender<AuditLog>, token: CancellationToken) {
    let mut ticker = tokio::time::interval(OVERFLOW_DRAIN_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => drain_overflow(&overflow, &main_tx),
            _ = token.cancelled() => {
                flush_overflow_to_stdout(&overflow);
                return;
            }
        }
    }
}

fn drain_overflow(overflow: &Overflow, main_tx: &mpsc::Sender<AuditLog>) {
    loop {
        let Some(log) = overflow.lock().unwrap().pop_front() else {
            return;
        };

        if let Err(err) = main_tx.try_send(log) {
            let log = match err {
                TrySendError::Full(log) | TrySendError::Closed(log) => log,
            };
            overflow.lock().unwrap().push_front(log);
            return;
        }
    }
}

fn flush_overflow_to_stdout(overflow: &Overflow) {
    let leftovers: Vec<AuditLog> = {
        let mut guard = overflow.lock().unwrap();
        guard.drain(..).collect()
    };

    if leftovers.is_empty() {
        return;
    }

    info!(
        "[AUDIT-OVERFLOW] Printing {} events left in the overflow list",
        leftovers.len()
    );

    for log in &leftovers {
        match serde_json::to_string_pretty(log) {
            Ok(data) => info!("[AUDIT-OVERFLOW] {data}"),
            Err(e) => error!("[AUDIT-OVERFLOW] Failed to serialize event: {e}"),
        }
    }
}
