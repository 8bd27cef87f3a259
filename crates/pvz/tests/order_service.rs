use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use pvz::abstract_trait::{
    AuditSinkTrait, DynAuditSink, DynOrderCache, DynOrderRepository, OrderCacheTrait,
    OrderCursorQuery, OrderRepositoryTrait,
};
use pvz::cache::InMemoryOrderCache;
use pvz::service::OrderService;
use shared::config::{CacheConfig, CacheKind};
use shared::errors::{CacheError, RepositoryError, ServiceError};
use shared::model::{AuditLog, Order, OrderState, PackageType, WrapperType};
use shared::utils::OrderMetrics;

struct InMemoryOrderRepo {
    orders: Mutex<HashMap<i64, Order>>,
}

impl InMemoryOrderRepo {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            orders: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl OrderRepositoryTrait for InMemoryOrderRepo {
    async fn create(&self, order: &Order) -> Result<(), RepositoryError> {
        if order.id <= 0 {
            return Err(RepositoryError::InvalidArgument(format!(
                "order id must be positive, got {}",
                order.id
            )));
        }
        if order.customer_id <= 0 {
            return Err(RepositoryError::InvalidArgument(format!(
                "customer id must be positive, got {}",
                order.customer_id
            )));
        }

        let mut orders = self.orders.lock().unwrap();
        if orders.contains_key(&order.id) {
            return Err(RepositoryError::AlreadyExists(format!("order {}", order.id)));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.lock().unwrap();
        if !orders.contains_key(&order.id) {
            return Err(RepositoryError::NotFound);
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        self.orders
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn delete_all(&self) -> Result<u64, RepositoryError> {
        let mut orders = self.orders.lock().unwrap();
        let removed = orders.len() as u64;
        orders.clear();
        Ok(removed)
    }

    async fn get_by_id(&self, id: i64) -> Result<Order, RepositoryError> {
        self.orders
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list(&self, search: &str) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.lock().unwrap();
        let mut result: Vec<Order> = orders
            .values()
            .filter(|o| {
                search.is_empty()
                    || o.id.to_string().contains(search)
                    || o.customer_id.to_string().contains(search)
            })
            .cloned()
            .collect();
        result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(result)
    }

    async fn list_with_cursor(
        &self,
        query: &OrderCursorQuery,
    ) -> Result<Vec<Order>, RepositoryError> {
        let now = Utc::now();
        let orders = self.orders.lock().unwrap();
        let mut result: Vec<Order> = orders
            .values()
            .filter(|o| {
                query.search.is_empty()
                    || o.id.to_string().contains(&query.search)
                    || o.customer_id.to_string().contains(&query.search)
            })
            .filter(|o| query.customer_id.is_none_or(|c| o.customer_id == c))
            .filter(|o| {
                !query.available_only
                    || (o.state == OrderState::Accepted && o.deadline_at > now)
            })
            .filter(|o| query.cursor_id <= 0 || o.id < query.cursor_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.id.cmp(&a.id));
        result.truncate(query.limit as usize);
        Ok(result)
    }

    async fn list_returns_with_cursor(
        &self,
        cursor_id: i64,
        limit: i64,
        search: &str,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.lock().unwrap();
        let mut result: Vec<Order> = orders
            .values()
            .filter(|o| o.state == OrderState::Returned)
            .filter(|o| {
                search.is_empty()
                    || o.id.to_string().contains(search)
                    || o.customer_id.to_string().contains(search)
            })
            .filter(|o| cursor_id <= 0 || o.id < cursor_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.id.cmp(&a.id));
        result.truncate(limit as usize);
        Ok(result)
    }

    async fn list_actual(&self) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.lock().unwrap();
        let mut result: Vec<Order> = orders
            .values()
            .filter(|o| matches!(o.state, OrderState::Accepted | OrderState::Delivered))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(result)
    }
}

struct RecordingSink {
    logs: Mutex<Vec<AuditLog>>,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            logs: Mutex::new(Vec::new()),
        })
    }

    fn status_changes(&self) -> Vec<(i64, String, String)> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .map(|log| {
                (
                    log.order_id.unwrap(),
                    log.old_status.clone().unwrap(),
                    log.new_status.clone().unwrap(),
                )
            })
            .collect()
    }
}

impl AuditSinkTrait for RecordingSink {
    fn log(&self, log: AuditLog) {
        self.logs.lock().unwrap().push(log);
    }
}

fn cache_config() -> CacheConfig {
    CacheConfig {
        kind: CacheKind::InMemory,
        order_key_prefix: "order:".to_string(),
        history_key: "order:history".to_string(),
        order_ttl: StdDuration::from_secs(1800),
        history_ttl: StdDuration::from_secs(600),
        additional_ttl: StdDuration::from_secs(3600),
        max_cache_size: 100,
        cleanup_interval: StdDuration::from_secs(3600),
        history_refresh_interval: StdDuration::from_secs(3600),
    }
}

struct Harness {
    service: OrderService,
    repo: Arc<InMemoryOrderRepo>,
    sink: Arc<RecordingSink>,
    cache: DynOrderCache,
    metrics: Arc<OrderMetrics>,
}

fn harness() -> Harness {
    let repo = InMemoryOrderRepo::new();
    let sink = RecordingSink::new();
    let cache: DynOrderCache = InMemoryOrderCache::new(&cache_config(), CancellationToken::new());
    let metrics = Arc::new(OrderMetrics::new());

    let service = OrderService::new(
        repo.clone() as DynOrderRepository,
        sink.clone() as DynAuditSink,
        cache.clone(),
        metrics.clone(),
    );

    Harness {
        service,
        repo,
        sink,
        cache,
        metrics,
    }
}

fn in_hours(hours: i64) -> DateTime<Utc> {
    Utc::now() + Duration::hours(hours)
}

#[tokio::test]
async fn happy_path_accept_deliver_return() {
    let h = harness();
    let t0 = Utc::now();

    h.service
        .accept_order(
            1,
            1,
            in_hours(24),
            Decimal::from(5),
            Decimal::from(100),
            Some(PackageType::Box),
            Some(WrapperType::Film),
        )
        .await
        .unwrap();

    // Box adds 20, the film wrapper stacks 1 more.
    let stored = h.service.get_order_by_id(1).await.unwrap();
    assert_eq!(stored.cost, Decimal::from(121));
    assert_eq!(stored.state, OrderState::Accepted);

    h.service
        .deliver_order(1, 1, t0 + Duration::hours(1))
        .await
        .unwrap();

    let delivered = h.service.get_order_by_id(1).await.unwrap();
    assert_eq!(delivered.state, OrderState::Delivered);
    assert!(delivered.delivered_at.is_some());

    h.service
        .process_return_order(1, 1, t0 + Duration::hours(2))
        .await
        .unwrap();

    let returned = h.service.get_order_by_id(1).await.unwrap();
    assert_eq!(returned.state, OrderState::Returned);
    assert!(returned.delivered_at.is_some());
    assert!(returned.returned_at.is_some());

    // Returned orders are evicted and never re-cached.
    assert!(matches!(
        h.cache.get_order(1).await,
        Err(CacheError::NotFoundInCache(1))
    ));

    assert_eq!(h.metrics.orders_accepted.get(), 1);
    assert_eq!(h.metrics.orders_delivered.get(), 1);
    assert_eq!(h.metrics.orders_returned.get(), 1);

    assert_eq!(
        h.sink.status_changes(),
        vec![
            (1, "none".to_string(), "accepted".to_string()),
            (1, "accepted".to_string(), "delivered".to_string()),
            (1, "delivered".to_string(), "returned".to_string()),
        ]
    );
}

#[tokio::test]
async fn accept_rejects_invalid_input() {
    let h = harness();
    let deadline = in_hours(24);
    let weight = Decimal::from(5);
    let cost = Decimal::from(100);

    assert!(matches!(
        h.service
            .accept_order(0, 1, deadline, weight, cost, None, None)
            .await,
        Err(ServiceError::InvalidOrderId(0))
    ));

    assert!(matches!(
        h.service
            .accept_order(1, 1, Utc::now() - Duration::hours(1), weight, cost, None, None)
            .await,
        Err(ServiceError::StorageDeadlinePassed { .. })
    ));

    assert!(matches!(
        h.service
            .accept_order(1, 1, deadline, Decimal::ZERO, cost, None, None)
            .await,
        Err(ServiceError::NegativeWeight(_))
    ));

    assert!(matches!(
        h.service
            .accept_order(1, 1, deadline, weight, Decimal::from(-10), None, None)
            .await,
        Err(ServiceError::NegativeCost(_))
    ));
}

#[tokio::test]
async fn accept_rejects_duplicates() {
    let h = harness();
    let deadline = in_hours(24);

    h.service
        .accept_order(7, 1, deadline, Decimal::from(5), Decimal::from(100), None, None)
        .await
        .unwrap();

    assert!(matches!(
        h.service
            .accept_order(7, 2, deadline, Decimal::from(5), Decimal::from(100), None, None)
            .await,
        Err(ServiceError::OrderExists(7))
    ));
}

#[tokio::test]
async fn concurrent_duplicate_accept_admits_exactly_one() {
    let h = harness();
    let deadline = in_hours(24);

    let (first, second) = tokio::join!(
        h.service
            .accept_order(9, 1, deadline, Decimal::from(5), Decimal::from(100), None, None),
        h.service
            .accept_order(9, 1, deadline, Decimal::from(5), Decimal::from(100), None, None),
    );

    assert_eq!(
        [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
        1
    );
    assert_eq!(h.repo.orders.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn packaging_ceilings_are_boundary_exact() {
    let h = harness();
    let deadline = in_hours(24);
    let cost = Decimal::from(100);

    // Exactly at the bag ceiling.
    h.service
        .accept_order(1, 1, deadline, Decimal::from(10), cost, Some(PackageType::Bag), None)
        .await
        .unwrap();
    assert_eq!(
        h.service.get_order_by_id(1).await.unwrap().cost,
        Decimal::from(105)
    );

    // A hair over it.
    assert!(matches!(
        h.service
            .accept_order(
                2,
                1,
                deadline,
                Decimal::new(1001, 2),
                cost,
                Some(PackageType::Bag),
                None
            )
            .await,
        Err(ServiceError::PackageWeightExceeded { .. })
    ));

    // Film has no ceiling.
    h.service
        .accept_order(3, 1, deadline, Decimal::from(500), cost, Some(PackageType::Film), None)
        .await
        .unwrap();
    assert_eq!(
        h.service.get_order_by_id(3).await.unwrap().cost,
        Decimal::from(101)
    );
}

#[tokio::test]
async fn deliver_enforces_customer_state_and_deadline() {
    let h = harness();
    let deadline = in_hours(1);

    h.service
        .accept_order(1, 1, deadline, Decimal::from(5), Decimal::from(100), None, None)
        .await
        .unwrap();

    assert!(matches!(
        h.service.deliver_order(1, 2, Utc::now()).await,
        Err(ServiceError::WrongCustomer(1))
    ));

    assert!(matches!(
        h.service
            .deliver_order(1, 1, Utc::now() + Duration::hours(2))
            .await,
        Err(ServiceError::StorageExpired { .. })
    ));

    // Handing out at exactly the deadline still succeeds.
    h.service.deliver_order(1, 1, deadline).await.unwrap();

    assert!(matches!(
        h.service.deliver_order(1, 1, deadline).await,
        Err(ServiceError::WrongState(1))
    ));
}

#[tokio::test]
async fn return_window_closes_after_48_hours() {
    let h = harness();
    let delivered_at = Utc::now() + Duration::hours(1);

    for id in [1, 2] {
        h.service
            .accept_order(
                id,
                1,
                in_hours(200),
                Decimal::from(5),
                Decimal::from(100),
                None,
                None,
            )
            .await
            .unwrap();
        h.service.deliver_order(id, 1, delivered_at).await.unwrap();
    }

    // Exactly 48 hours after delivery is still within the window.
    h.service
        .process_return_order(1, 1, delivered_at + Duration::hours(48))
        .await
        .unwrap();

    assert!(matches!(
        h.service
            .process_return_order(2, 1, delivered_at + Duration::hours(48) + Duration::seconds(1))
            .await,
        Err(ServiceError::ReturnExpired { .. })
    ));
}

#[tokio::test]
async fn return_requires_delivery_and_matching_customer() {
    let h = harness();

    h.service
        .accept_order(1, 1, in_hours(24), Decimal::from(5), Decimal::from(100), None, None)
        .await
        .unwrap();

    assert!(matches!(
        h.service.process_return_order(1, 1, Utc::now()).await,
        Err(ServiceError::NotDelivered(1))
    ));

    h.service.deliver_order(1, 1, Utc::now()).await.unwrap();

    assert!(matches!(
        h.service.process_return_order(1, 2, Utc::now()).await,
        Err(ServiceError::WrongCustomer(1))
    ));
}

#[tokio::test]
async fn courier_reclaim_requires_expiry_except_for_returns() {
    let h = harness();

    // Still within its storage window: reclaim refused.
    h.service
        .accept_order(1, 1, in_hours(24), Decimal::from(5), Decimal::from(100), None, None)
        .await
        .unwrap();
    assert!(matches!(
        h.service.return_order_to_courier(1).await,
        Err(ServiceError::DeadlineNotExpired { .. })
    ));

    // Delivered orders can never go back to the courier.
    h.service.deliver_order(1, 1, Utc::now()).await.unwrap();
    assert!(matches!(
        h.service.return_order_to_courier(1).await,
        Err(ServiceError::OrderAlreadyDelivered(1))
    ));

    // A returned order is reclaimable before its deadline.
    h.service
        .process_return_order(1, 1, Utc::now())
        .await
        .unwrap();
    h.service.return_order_to_courier(1).await.unwrap();
    assert!(matches!(
        h.service.get_order_by_id(1).await,
        Err(ServiceError::Repo(RepositoryError::NotFound))
    ));

    let changes = h.sink.status_changes();
    assert_eq!(
        changes.last().unwrap(),
        &(1, "returned".to_string(), "deleted".to_string())
    );
    assert_eq!(h.metrics.orders_returned_to_courier.get(), 1);
}

#[tokio::test]
async fn courier_reclaim_after_storage_expiry() {
    let h = harness();

    h.service
        .accept_order(
            1,
            1,
            Utc::now() + Duration::milliseconds(100),
            Decimal::from(5),
            Decimal::from(100),
            None,
            None,
        )
        .await
        .unwrap();

    tokio::time::sleep(StdDuration::from_millis(200)).await;

    h.service.return_order_to_courier(1).await.unwrap();

    assert!(h.repo.orders.lock().unwrap().is_empty());
    assert_eq!(
        h.sink.status_changes().last().unwrap(),
        &(1, "accepted".to_string(), "deleted".to_string())
    );
}

#[tokio::test]
async fn history_is_sorted_by_update_time_descending() {
    let h = harness();

    for id in [1, 2, 3] {
        h.service
            .accept_order(id, 10, in_hours(24), Decimal::from(5), Decimal::from(100), None, None)
            .await
            .unwrap();
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }

    let history = h.service.order_history("").await.unwrap();
    let ids: Vec<i64> = history.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![3, 2, 1]);

    // A search term bypasses the cache and matches stringified ids.
    let matched = h.service.order_history("2").await.unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].id, 2);
}

#[tokio::test]
async fn cursor_listing_paginates_by_id_descending() {
    let h = harness();

    for id in 1..=5 {
        h.service
            .accept_order(id, 10, in_hours(24), Decimal::from(5), Decimal::from(100), None, None)
            .await
            .unwrap();
    }

    let page = h
        .service
        .list_orders_with_cursor(&OrderCursorQuery {
            cursor_id: 0,
            limit: 2,
            customer_id: None,
            available_only: false,
            search: String::new(),
        })
        .await
        .unwrap();
    assert_eq!(page.iter().map(|o| o.id).collect::<Vec<_>>(), vec![5, 4]);

    let next = h
        .service
        .list_orders_with_cursor(&OrderCursorQuery {
            cursor_id: 4,
            limit: 2,
            customer_id: None,
            available_only: false,
            search: String::new(),
        })
        .await
        .unwrap();
    assert_eq!(next.iter().map(|o| o.id).collect::<Vec<_>>(), vec![3, 2]);
}

#[tokio::test]
async fn returns_listing_only_contains_returned_orders() {
    let h = harness();
    let t0 = Utc::now();

    for id in [1, 2] {
        h.service
            .accept_order(id, 1, in_hours(200), Decimal::from(5), Decimal::from(100), None, None)
            .await
            .unwrap();
    }
    h.service.deliver_order(1, 1, t0).await.unwrap();
    h.service
        .process_return_order(1, 1, t0 + Duration::hours(1))
        .await
        .unwrap();

    let returns = h
        .service
        .list_returns_with_cursor(0, 10, "")
        .await
        .unwrap();
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0].id, 1);
    assert_eq!(returns[0].state, OrderState::Returned);
}

#[tokio::test]
async fn imports_orders_from_json_file() {
    let h = harness();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
            {{"id": 1, "customer_id": 10, "deadline_at": "24h", "weight": "5", "cost": "100", "package_type": "box"}},
            {{"id": 2, "customer_id": 11, "deadline_at": "2030-01-02T15:04:05", "weight": "2.5", "cost": "50"}}
        ]"#
    )
    .unwrap();

    let imported = h
        .service
        .accept_orders_from_file(file.path().to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(imported, 2);

    assert_eq!(
        h.service.get_order_by_id(1).await.unwrap().cost,
        Decimal::from(120)
    );
    assert_eq!(
        h.service.get_order_by_id(2).await.unwrap().cost,
        Decimal::from(50)
    );
}

#[tokio::test]
async fn import_fails_fast_on_bad_entries() {
    let h = harness();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
            {{"id": 1, "customer_id": 10, "deadline_at": "24h", "weight": "5", "cost": "100"}},
            {{"id": 2, "customer_id": 11, "deadline_at": "24h", "weight": "5", "cost": "100", "package_type": "crate"}},
            {{"id": 3, "customer_id": 12, "deadline_at": "24h", "weight": "5", "cost": "100"}}
        ]"#
    )
    .unwrap();

    let err = h
        .service
        .accept_orders_from_file(file.path().to_str().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::UnknownPackageType(ref t) if t == "crate"));

    // The first order landed before the failure, the third never did.
    assert!(h.service.get_order_by_id(1).await.is_ok());
    assert!(h.service.get_order_by_id(3).await.is_err());

    let missing = h
        .service
        .accept_orders_from_file("definitely/not/there.json")
        .await;
    assert!(matches!(missing, Err(ServiceError::Io(_))));
}

#[tokio::test]
async fn clear_database_empties_store_and_cache() {
    let h = harness();

    for id in [1, 2] {
        h.service
            .accept_order(id, 1, in_hours(24), Decimal::from(5), Decimal::from(100), None, None)
            .await
            .unwrap();
    }

    h.service.clear_database().await.unwrap();

    assert!(h.repo.orders.lock().unwrap().is_empty());
    assert!(matches!(
        h.cache.get_order(1).await,
        Err(CacheError::NotFoundInCache(1))
    ));
    assert!(h.service.order_history("").await.unwrap().is_empty());
}

#[tokio::test]
async fn read_through_recaches_on_repository_fallback() {
    let h = harness();

    h.service
        .accept_order(1, 1, in_hours(24), Decimal::from(5), Decimal::from(100), None, None)
        .await
        .unwrap();

    // Simulate a cold cache.
    h.cache.delete_order(1).await.unwrap();

    let order = h.service.get_order_by_id(1).await.unwrap();
    assert_eq!(order.id, 1);

    // The fallback read re-populated the cache.
    assert!(h.cache.get_order(1).await.is_ok());
}
