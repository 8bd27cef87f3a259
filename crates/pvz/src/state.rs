use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use prometheus_client::registry::Registry;
use shared::config::{Config, ConnectionPool};
use shared::utils::{OrderMetrics, RequestMetrics};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::abstract_trait::{
    DynAuditProducer, DynAuditRepository, DynAuditSink, DynLogProcessor, DynOrderRepository,
};
use crate::audit::{AuditLogger, PersistentLogProcessor, StdoutLogProcessor};
use crate::cache::new_order_cache;
use crate::consumer::AuditConsumer;
use crate::outbox::{KafkaOutboxProducer, OutboxWorkerPool};
use crate::repository::{PostgresAuditRepository, PostgresOrderRepository};
use crate::service::OrderService;

/// Everything long-lived, wired together: repositories, the configured
/// cache backend (warmed and refreshing), the audit pipeline, the outbox
/// dispatcher and the bus consumer.
pub struct AppState {
    pub order_service: Arc<OrderService>,
    pub audit_logger: Arc<AuditLogger>,
    pub outbox_pool: OutboxWorkerPool,
    pub consumer: AuditConsumer,
    pub order_metrics: Arc<OrderMetrics>,
    pub request_metrics: Arc<RequestMetrics>,
    pub registry: Arc<Mutex<Registry>>,
}

impl AppState {
    pub async fn new(
        pool: ConnectionPool,
        config: &Config,
        token: &CancellationToken,
    ) -> Result<Self> {
        let order_repo: DynOrderRepository = Arc::new(PostgresOrderRepository::new(pool.clone()));
        let audit_repo: DynAuditRepository = Arc::new(PostgresAuditRepository::new(pool));

        let cache = new_order_cache(&config.cache, &config.redis, token.child_token())
            .await
            .context("Failed to construct the order cache")?;

        cache
            .warm(order_repo.clone())
            .await
            .context("Failed to warm the order cache")?;

        cache
            .clone()
            .start_history_cache_refresh(
                order_repo.clone(),
                config.cache.history_refresh_interval,
            )
            .await;

        let mut registry = Registry::default();
        let order_metrics = Arc::new(OrderMetrics::new());
        order_metrics.register(&mut registry);
        let request_metrics = Arc::new(RequestMetrics::new());
        request_metrics.register(&mut registry);

        let processors: Vec<DynLogProcessor> = vec![
            Arc::new(StdoutLogProcessor::new(&config.audit_logger.filter_path)),
            Arc::new(PersistentLogProcessor::new(audit_repo.clone())),
        ];
        let audit_logger = Arc::new(AuditLogger::new(
            token.child_token(),
            processors,
            &config.audit_logger,
        ));

        let order_service = Arc::new(OrderService::new(
            order_repo,
            audit_logger.clone() as DynAuditSink,
            cache,
            order_metrics.clone(),
        ));

        let producer: DynAuditProducer = Arc::new(
            KafkaOutboxProducer::new(&config.kafka.brokers, &config.kafka.audit_topic)
                .context("Failed to create the Kafka outbox producer")?,
        );
        let outbox_pool = OutboxWorkerPool::new(
            audit_repo,
            producer,
            &config.outbox,
            token.child_token(),
        );

        let consumer = AuditConsumer::new(&config.kafka, token.child_token());

        info!("✅ Application state assembled");

        Ok(Self {
            order_service,
            audit_logger,
            outbox_pool,
            consumer,
            order_metrics,
            request_metrics,
            registry: Arc::new(Mutex::new(registry)),
        })
    }
}
