use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use shared::errors::ServiceError;
use shared::model::AuditLog;
use tracing::{debug, error, info};

use crate::abstract_trait::AuditProducerTrait;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes persisted audit events to the dispatch topic. Sends wait for
/// acknowledgement from every in-sync replica.
pub struct KafkaOutboxProducer {
    producer: FutureProducer,
    topic: String,
}

impl KafkaOutboxProducer {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, ServiceError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("acks", "all")
            .set("message.timeout.ms", "6000")
            .set("allow.auto.create.topics", "true")
            .create()
            .map_err(|e| ServiceError::Kafka(e.to_string()))?;

        info!("Kafka outbox producer connected to {brokers}, topic {topic}");

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl AuditProducerTrait for KafkaOutboxProducer {
    async fn send_message(&self, task_id: i64, payload: &AuditLog) -> Result<(), ServiceError> {
        let data = serde_json::to_vec(payload)?;
        let key = task_id.to_string();

        let record = FutureRecord::to(&self.topic).key(&key).payload(&data);

        let (partition, offset) = self
            .producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(e, _)| {
                error!("Failed to publish audit event for task {task_id}: {e}");
                ServiceError::Kafka(e.to_string())
            })?;

        debug!(
            "Published audit event: topic={}, partition={partition}, offset={offset}, task_id={task_id}",
            self.topic
        );

        Ok(())
    }
}
