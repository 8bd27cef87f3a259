use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::errors::{RepositoryError, ServiceError};
use shared::model::{Order, OrderState, PackageType, WrapperType};
use shared::utils::{OrderMetrics, parse_deadline};
use tracing::{debug, error, info, warn};

use crate::abstract_trait::{DynAuditSink, DynOrderCache, DynOrderRepository, OrderCursorQuery};
use crate::service::packager::Packager;

/// How long after delivery a customer may still hand the parcel back.
fn return_window() -> Duration {
    Duration::hours(48)
}

#[derive(Debug, Deserialize)]
struct OrderImport {
    id: i64,
    customer_id: i64,
    deadline_at: String,
    weight: Decimal,
    cost: Decimal,
    #[serde(default)]
    package_type: Option<String>,
    #[serde(default)]
    wrapper: Option<String>,
}

/// Business rules of the order lifecycle. Each operation is linearised at
/// its store commit; cache updates follow the commit and precede the audit
/// emission.
pub struct OrderService {
    repo: DynOrderRepository,
    audit: DynAuditSink,
    cache: DynOrderCache,
    metrics: Arc<OrderMetrics>,
}

impl OrderService {
    pub fn new(
        repo: DynOrderRepository,
        audit: DynAuditSink,
        cache: DynOrderCache,
        metrics: Arc<OrderMetrics>,
    ) -> Self {
        Self {
            repo,
            audit,
            cache,
            metrics,
        }
    }

    /// Read-through: any cache error falls back to the repository.
    async fn load_order(&self, id: i64) -> Result<Order, ServiceError> {
        match self.cache.get_order(id).await {
            Ok(order) => Ok(order),
            Err(e) => {
                debug!("Cache miss for order {id}: {e}, falling back to repository");
                self.repo.get_by_id(id).await.map_err(|err| {
                    error!("Failed to load order {id} from repository: {err}");
                    ServiceError::from(err)
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn accept_order(
        &self,
        id: i64,
        customer_id: i64,
        deadline: DateTime<Utc>,
        weight: Decimal,
        cost: Decimal,
        package_type: Option<PackageType>,
        wrapper: Option<WrapperType>,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();

        if id <= 0 {
            error!("Invalid order id: {id}");
            return Err(ServiceError::InvalidOrderId(id));
        }
        if now > deadline {
            error!("Storage deadline of order {id} is already past: {deadline}");
            return Err(ServiceError::StorageDeadlinePassed { deadline, now });
        }
        match self.repo.get_by_id(id).await {
            Ok(_) => {
                error!("Order {id} already exists");
                return Err(ServiceError::OrderExists(id));
            }
            Err(RepositoryError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        if weight <= Decimal::ZERO {
            return Err(ServiceError::NegativeWeight(weight));
        }
        if cost <= Decimal::ZERO {
            return Err(ServiceError::NegativeCost(cost));
        }

        let mut final_cost = cost;
        if let Some(base) = package_type {
            let packager = Packager::build(base, wrapper);
            packager.validate_weight(weight)?;
            final_cost += packager.additional_cost();
            debug!("Final cost of order {id} with packaging: {final_cost}");
        }

        let order = Order {
            id,
            customer_id,
            state: OrderState::Accepted,
            weight,
            cost: final_cost,
            package_type,
            wrapper,
            deadline_at: deadline,
            updated_at: now,
            delivered_at: None,
            returned_at: None,
        };

        self.repo.create(&order).await?;

        if let Err(e) = self.cache.set_order(&order).await {
            warn!("Failed to cache order {id} after acceptance: {e}");
            return Err(e.into());
        }

        self.audit
            .log_order_status_change(id, "none", order.state.as_str());
        info!("✅ Order {id} accepted");
        self.metrics.orders_accepted.inc();

        Ok(())
    }

    pub async fn deliver_order(
        &self,
        id: i64,
        customer_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut order = self.load_order(id).await?;

        if order.customer_id != customer_id {
            error!(
                "Order {id} belongs to customer {}, requested by {customer_id}",
                order.customer_id
            );
            return Err(ServiceError::WrongCustomer(id));
        }
        if order.state != OrderState::Accepted {
            error!("Cannot hand out order {id} in state {}", order.state.as_str());
            return Err(ServiceError::WrongState(id));
        }
        if now > order.deadline_at {
            return Err(ServiceError::StorageExpired {
                id,
                deadline: order.deadline_at,
                now,
            });
        }

        let previous_updated = order.updated_at;
        let old_state = order.state;

        order.state = OrderState::Delivered;
        order.updated_at = now;
        order.delivered_at = Some(now);

        self.repo.update(&order).await?;

        if let Err(e) = self.cache.set_order(&order).await {
            warn!("Failed to refresh cache for order {id} after delivery: {e}");
            return Err(e.into());
        }

        self.audit
            .log_order_status_change(id, old_state.as_str(), order.state.as_str());
        info!("✅ Order {id} handed out to customer {customer_id}");
        self.metrics.orders_delivered.inc();

        let processing_secs = (now - previous_updated).num_milliseconds() as f64 / 1000.0;
        self.metrics.order_processing_time.observe(processing_secs);

        Ok(())
    }

    pub async fn process_return_order(
        &self,
        id: i64,
        customer_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut order = self.load_order(id).await?;

        if order.customer_id != customer_id {
            error!(
                "Order {id} belongs to customer {}, requested by {customer_id}",
                order.customer_id
            );
            return Err(ServiceError::WrongCustomer(id));
        }
        if order.state != OrderState::Delivered {
            error!("Cannot return order {id} in state {}", order.state.as_str());
            return Err(ServiceError::NotDelivered(id));
        }
        let delivered_at = order.delivered_at.ok_or(ServiceError::NotDelivered(id))?;
        if now - delivered_at > return_window() {
            return Err(ServiceError::ReturnExpired {
                id,
                delivered_at,
                now,
            });
        }

        let old_state = order.state;

        order.state = OrderState::Returned;
        order.updated_at = now;
        order.returned_at = Some(now);

        self.repo.update(&order).await?;

        // Returned orders are never cached.
        if let Err(e) = self.cache.delete_order(id).await {
            warn!("Failed to evict order {id} from cache after return: {e}");
            return Err(e.into());
        }

        self.audit
            .log_order_status_change(id, old_state.as_str(), order.state.as_str());
        info!("✅ Order {id} returned by customer {customer_id}");
        self.metrics.orders_returned.inc();

        Ok(())
    }

    pub async fn return_order_to_courier(&self, id: i64) -> Result<(), ServiceError> {
        let now = Utc::now();
        let order = self.load_order(id).await?;

        if order.state == OrderState::Delivered {
            error!("Cannot release delivered order {id} back to courier");
            return Err(ServiceError::OrderAlreadyDelivered(id));
        }
        if now < order.deadline_at && order.state != OrderState::Returned {
            return Err(ServiceError::DeadlineNotExpired {
                id,
                deadline: order.deadline_at,
                now,
            });
        }

        let old_state = order.state;

        if let Err(e) = self.cache.delete_order(id).await {
            warn!("Failed to evict order {id} from cache before courier return: {e}");
            return Err(e.into());
        }
        self.repo.delete(id).await?;

        self.audit
            .log_order_status_change(id, old_state.as_str(), "deleted");
        info!("✅ Order {id} released back to courier");
        self.metrics.orders_returned_to_courier.inc();

        Ok(())
    }

    pub async fn get_order_by_id(&self, id: i64) -> Result<Order, ServiceError> {
        if let Ok(order) = self.cache.get_order(id).await {
            debug!("Order {id} served from cache");
            return Ok(order);
        }

        let order = self.repo.get_by_id(id).await.map_err(|e| {
            error!("Failed to load order {id} from repository: {e}");
            ServiceError::from(e)
        })?;

        if order.state != OrderState::Returned && order.deadline_at > Utc::now() {
            // Best-effort re-cache on the read path.
            if let Err(e) = self.cache.set_order(&order).await {
                warn!("Failed to re-cache order {id}: {e}");
            }
        }

        Ok(order)
    }

    /// History of all orders. An empty search prefers the cached snapshot;
    /// the final ordering is stabilised here regardless of the source.
    pub async fn order_history(&self, search: &str) -> Result<Vec<Order>, ServiceError> {
        let mut orders = if search.is_empty() {
            match self.cache.get_order_history().await {
                Ok(orders) => orders,
                Err(e) => {
                    debug!("History cache miss: {e}, falling back to repository");
                    self.repo.list("").await?
                }
            }
        } else {
            debug!("Fetching order history with search term: {search}");
            self.repo.list(search).await?
        };

        orders.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        info!("Fetched order history, {} records", orders.len());
        Ok(orders)
    }

    /// Imports a JSON array of orders, failing fast on the first bad entry.
    pub async fn accept_orders_from_file(&self, path: &str) -> Result<usize, ServiceError> {
        info!("Importing orders from file: {path}");

        let raw = tokio::fs::read(path).await?;
        let imports: Vec<OrderImport> = serde_json::from_slice(&raw)?;

        info!("Read {} orders from file", imports.len());

        let now = Utc::now();
        for import in &imports {
            let deadline = parse_deadline(&import.deadline_at, now)?;

            let package_type = match import.package_type.as_deref().filter(|s| !s.is_empty()) {
                Some(raw) => Some(
                    PackageType::try_from(raw)
                        .map_err(|_| ServiceError::UnknownPackageType(raw.to_string()))?,
                ),
                None => None,
            };
            let wrapper = match import.wrapper.as_deref().filter(|s| !s.is_empty()) {
                Some(raw) => Some(
                    WrapperType::try_from(raw)
                        .map_err(|_| ServiceError::UnknownWrapperType(raw.to_string()))?,
                ),
                None => None,
            };

            self.accept_order(
                import.id,
                import.customer_id,
                deadline,
                import.weight,
                import.cost,
                package_type,
                wrapper,
            )
            .await
            .map_err(|e| {
                error!("Failed to accept order {} from file: {e}", import.id);
                e
            })?;
        }

        info!("Imported {} orders from {path}", imports.len());
        Ok(imports.len())
    }

    /// Removes every stored order and clears the cache in the same logical
    /// step. Test/admin only.
    pub async fn clear_database(&self) -> Result<(), ServiceError> {
        info!("Clearing order database");

        let removed = self.repo.delete_all().await?;

        self.cache.clear_order_cache().await.map_err(|e| {
            error!("Failed to clear order cache: {e}");
            ServiceError::from(e)
        })?;

        info!("Order database cleared, {removed} orders removed");
        Ok(())
    }

    pub async fn list_orders_with_cursor(
        &self,
        query: &OrderCursorQuery,
    ) -> Result<Vec<Order>, ServiceError> {
        debug!(
            "Listing orders with cursor: cursor_id={}, limit={}, customer_id={:?}, available_only={}, search='{}'",
            query.cursor_id, query.limit, query.customer_id, query.available_only, query.search
        );

        let orders = self.repo.list_with_cursor(query).await.map_err(|e| {
            error!("Failed to list orders with cursor: {e}");
            ServiceError::from(e)
        })?;

        debug!("Fetched {} orders with cursor pagination", orders.len());
        Ok(orders)
    }

    pub async fn list_returns_with_cursor(
        &self,
        cursor_id: i64,
        limit: i64,
        search: &str,
    ) -> Result<Vec<Order>, ServiceError> {
        debug!("Listing returns with cursor: cursor_id={cursor_id}, limit={limit}, search='{search}'");

        let returns = self
            .repo
            .list_returns_with_cursor(cursor_id, limit, search)
            .await
            .map_err(|e| {
                error!("Failed to list returns with cursor: {e}");
                ServiceError::from(e)
            })?;

        debug!("Fetched {} returned orders with cursor pagination", returns.len());
        Ok(returns)
    }
}
