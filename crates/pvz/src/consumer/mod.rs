use std::sync::Mutex;
use std::time::Duration;

use rdkafka::Message;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use serde::Serialize;
use shared::config::KafkaConfig;
use shared::model::AuditLog;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const BASE_DELAY: Duration = Duration::from_millis(100);
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential reconnect backoff: `min(30s, 100ms · 2^(n-1))`.
pub fn backoff_delay(consecutive_errors: u32) -> Duration {
    let exponent = consecutive_errors.saturating_sub(1).min(16);
    let delay = BASE_DELAY * 2u32.pow(exponent);
    delay.min(MAX_DELAY)
}

#[derive(Serialize)]
struct KafkaMeta {
    topic: String,
    partition: i32,
    offset: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
}

/// Published audit event enriched with its bus coordinates.
#[derive(Serialize)]
struct EnrichedAuditLog<'a> {
    #[serde(flatten)]
    log: &'a AuditLog,
    kafka_meta: KafkaMeta,
}

/// Consumer-group subscriber of the dispatch topic. Echoes every decoded
/// event to stdout; the subscription loop reconnects with exponential
/// backoff and resets the error counter on a healthy session.
pub struct AuditConsumer {
    brokers: String,
    group_id: String,
    topic: String,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AuditConsumer {
    pub fn new(config: &KafkaConfig, token: CancellationToken) -> Self {
        info!(
            "Creating audit consumer: brokers={}, group_id={}, topic={}",
            config.brokers, config.audit_group_id, config.audit_topic
        );

        Self {
            brokers: config.brokers.clone(),
            group_id: config.audit_group_id.clone(),
            topic: config.audit_topic.clone(),
            token,
            handle: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        info!("Starting audit consumer");

        let handle = tokio::spawn(run_loop(
            self.brokers.clone(),
            self.group_id.clone(),
            self.topic.clone(),
            self.token.clone(),
        ));

        *self.handle.lock().unwrap() = Some(handle);
    }

    pub async fn stop(&self) {
        info!("Stopping audit consumer");
        self.token.cancel();

        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        info!("Audit consumer stopped");
    }
}

fn build_consumer(brokers: &str, group_id: &str) -> Result<StreamConsumer, rdkafka::error::KafkaError> {
    ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group_id)
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", "6000")
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "latest")
        .set("partition.assignment.strategy", "roundrobin")
        .set("allow.auto.create.topics", "true")
        .create()
}

async fn run_loop(brokers: String, group_id: String, topic: String, token: CancellationToken) {
    let mut consecutive_errors: u32 = 0;

    loop {
        if token.is_cancelled() {
            info!("Audit consumer loop stopped: scope cancelled");
            return;
        }

        let consumer = match build_consumer(&brokers, &group_id) {
            Ok(consumer) => consumer,
            Err(e) => {
                consecutive_errors += 1;
                if !wait_backoff(&token, consecutive_errors, &e.to_string()).await {
                    return;
                }
                continue;
            }
        };

        if let Err(e) = consumer.subscribe(&[topic.as_str()]) {
            consecutive_errors += 1;
            if !wait_backoff(&token, consecutive_errors, &e.to_string()).await {
                return;
            }
            continue;
        }

        info!("Audit consumer session established, subscribed to {topic}");
        consecutive_errors = 0;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Audit consumer loop stopped: scope cancelled");
                    return;
                }
                result = consumer.recv() => match result {
                    Ok(message) => {
                        consecutive_errors = 0;
                        handle_message(&consumer, &message);
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        if !wait_backoff(&token, consecutive_errors, &e.to_string()).await {
                            return;
                        }
                        // Rebuild the session after an unhealthy receive.
                        break;
                    }
                }
            }
        }
    }
}

/// Sleeps for the computed backoff; returns false when cancelled mid-wait.
async fn wait_backoff(token: &CancellationToken, consecutive_errors: u32, cause: &str) -> bool {
    let delay = backoff_delay(consecutive_errors);
    error!(
        "Audit consumer error (attempt {consecutive_errors}): {cause}. Retrying in {delay:?}"
    );

    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = token.cancelled() => {
            info!("Audit consumer cancelled during backoff");
            false
        }
    }
}

fn handle_message(consumer: &StreamConsumer, message: &BorrowedMessage<'_>) {
    debug!(
        "Received message: topic={}, partition={}, offset={}",
        message.topic(),
        message.partition(),
        message.offset()
    );

    let Some(payload) = message.payload() else {
        error!("Empty message payload, advancing offset");
        commit(consumer, message);
        return;
    };

    let log: AuditLog = match serde_json::from_slice(payload) {
        Ok(log) => log,
        Err(e) => {
            // Poison messages must not stall the group.
            error!("Failed to decode audit event: {e}");
            debug!("Raw payload: {}", String::from_utf8_lossy(payload));
            commit(consumer, message);
            return;
        }
    };

    let enriched = EnrichedAuditLog {
        log: &log,
        kafka_meta: KafkaMeta {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message
                .key()
                .filter(|key| !key.is_empty())
                .map(|key| String::from_utf8_lossy(key).to_string()),
        },
    };

    match serde_json::to_string_pretty(&enriched) {
        Ok(data) => info!("[KAFKA-AUDIT] Received audit event:\n{data}"),
        Err(e) => error!("Failed to serialize enriched audit event: {e}"),
    }

    commit(consumer, message);
}

fn commit(consumer: &StreamConsumer, message: &BorrowedMessage<'_>) {
    if let Err(e) = consumer.commit_message(message, CommitMode::Async) {
        error!(
            "Failed to commit offset {} on partition {}: {e}",
            message.offset(),
            message.partition()
        );
    }
}
