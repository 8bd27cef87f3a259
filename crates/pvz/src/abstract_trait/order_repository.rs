use std::sync::Arc;

use async_trait::async_trait;
use shared::errors::RepositoryError;
use shared::model::Order;

pub type DynOrderRepository = Arc<dyn OrderRepositoryTrait + Send + Sync>;

/// Cursor-paginated listing parameters; `cursor_id = 0` starts from the
/// newest order.
#[derive(Debug, Clone, Default)]
pub struct OrderCursorQuery {
    pub cursor_id: i64,
    pub limit: i64,
    pub customer_id: Option<i64>,
    /// Restricts to accepted orders still within their storage deadline,
    /// i.e. parcels a customer can actually pick up.
    pub available_only: bool,
    pub search: String,
}

#[async_trait]
pub trait OrderRepositoryTrait {
    async fn create(&self, order: &Order) -> Result<(), RepositoryError>;
    async fn update(&self, order: &Order) -> Result<(), RepositoryError>;
    async fn delete(&self, id: i64) -> Result<(), RepositoryError>;
    async fn delete_all(&self) -> Result<u64, RepositoryError>;
    async fn get_by_id(&self, id: i64) -> Result<Order, RepositoryError>;
    /// Full history, all states, ordered by `updated_at` descending.
    async fn list(&self, search: &str) -> Result<Vec<Order>, RepositoryError>;
    async fn list_with_cursor(&self, query: &OrderCursorQuery)
    -> Result<Vec<Order>, RepositoryError>;
    async fn list_returns_with_cursor(
        &self,
        cursor_id: i64,
        limit: i64,
        search: &str,
    ) -> Result<Vec<Order>, RepositoryError>;
    /// Orders in accepted or delivered state; used only to warm the cache.
    async fn list_actual(&self) -> Result<Vec<Order>, RepositoryError>;
}
