use async_trait::async_trait;
use chrono::Utc;
use shared::config::ConnectionPool;
use shared::errors::RepositoryError;
use shared::model::{Order, OrderRow};
use sqlx::{Postgres, QueryBuilder};
use tracing::{error, info};

use crate::abstract_trait::{OrderCursorQuery, OrderRepositoryTrait};

/// Outer-joined read resolving the enum-valued foreign keys to their names.
/// The repository is the only place those reference-table ids exist.
const ORDER_SELECT: &str = r#"
    SELECT
        o.id,
        o.customer_id,
        os.name AS state,
        o.weight,
        o.cost,
        pt.name AS package_type,
        wt.name AS wrapper,
        o.deadline_at,
        o.updated_at,
        o.delivered_at,
        o.returned_at
    FROM orders o
    JOIN order_states os ON o.state_id = os.id
    LEFT JOIN package_types pt ON o.package_type_id = pt.id
    LEFT JOIN wrapper_types wt ON o.wrapper_type_id = wt.id
"#;

#[derive(Clone)]
pub struct PostgresOrderRepository {
    db: ConnectionPool,
}

impl PostgresOrderRepository {
    pub fn new(db: ConnectionPool) -> Self {
        Self { db }
    }
}

fn rows_into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
    rows.into_iter()
        .map(|row| Order::try_from(row).map_err(RepositoryError::Decode))
        .collect()
}

fn push_search(builder: &mut QueryBuilder<'_, Postgres>, search: &str) {
    let pattern = format!("%{search}%");
    builder
        .push(" AND (CAST(o.id AS TEXT) LIKE ")
        .push_bind(pattern.clone())
        .push(" OR CAST(o.customer_id AS TEXT) LIKE ")
        .push_bind(pattern)
        .push(")");
}

#[async_trait]
impl OrderRepositoryTrait for PostgresOrderRepository {
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

        let mut tx = self.db.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1 FOR UPDATE)")
                .bind(order.id)
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            return Err(RepositoryError::AlreadyExists(format!(
                "order {}",
                order.id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO orders
                (id, customer_id, state_id, weight, cost, package_type_id,
                 wrapper_type_id, deadline_at, updated_at, delivered_at, returned_at)
            VALUES
                ($1, $2,
                 (SELECT id FROM order_states WHERE name = $3),
                 $4, $5,
                 (SELECT id FROM package_types WHERE name = $6),
                 (SELECT id FROM wrapper_types WHERE name = $7),
                 $8, $9, $10, $11)
            "#,
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(order.state.as_str())
        .bind(order.weight)
        .bind(order.cost)
        .bind(order.package_type.map(|p| p.as_str()))
        .bind(order.wrapper.map(|w| w.as_str()))
        .bind(order.deadline_at)
        .bind(order.updated_at)
        .bind(order.delivered_at)
        .bind(order.returned_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            error!("❌ Failed to insert order {}: {:?}", order.id, err);
            RepositoryError::from(err)
        })?;

        tx.commit().await?;

        info!("✅ Created order {}", order.id);
        Ok(())
    }

    async fn update(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1 FOR UPDATE)")
                .bind(order.id)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Err(RepositoryError::NotFound);
        }

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                customer_id = $2,
                state_id = (SELECT id FROM order_states WHERE name = $3),
                weight = $4,
                cost = $5,
                package_type_id = (SELECT id FROM package_types WHERE name = $6),
                wrapper_type_id = (SELECT id FROM wrapper_types WHERE name = $7),
                deadline_at = $8,
                updated_at = $9,
                delivered_at = $10,
                returned_at = $11
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(order.state.as_str())
        .bind(order.weight)
        .bind(order.cost)
        .bind(order.package_type.map(|p| p.as_str()))
        .bind(order.wrapper.map(|w| w.as_str()))
        .bind(order.deadline_at)
        .bind(order.updated_at)
        .bind(order.delivered_at)
        .bind(order.returned_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            error!("❌ Failed to update order {}: {:?}", order.id, err);
            RepositoryError::from(err)
        })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;

        info!("🔄 Updated order {}", order.id);
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        let mut tx = self.db.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1 FOR UPDATE)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Err(RepositoryError::NotFound);
        }

        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                error!("❌ Failed to delete order {id}: {:?}", err);
                RepositoryError::from(err)
            })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;

        info!("🗑️ Deleted order {id}");
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM orders")
            .execute(&self.db)
            .await
            .map_err(|err| {
                error!("❌ Failed to delete all orders: {:?}", err);
                RepositoryError::from(err)
            })?;

        let removed = result.rows_affected();
        info!("🗑️ Deleted all orders ({removed} rows)");
        Ok(removed)
    }

    async fn get_by_id(&self, id: i64) -> Result<Order, RepositoryError> {
        let mut query = String::from(ORDER_SELECT);
        query.push_str(" WHERE o.id = $1");

        let row = sqlx::query_as::<_, OrderRow>(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        Order::try_from(row).map_err(RepositoryError::Decode)
    }

    async fn list(&self, search: &str) -> Result<Vec<Order>, RepositoryError> {
        let mut builder = QueryBuilder::new(ORDER_SELECT);
        builder.push(" WHERE 1=1");

        if !search.is_empty() {
            push_search(&mut builder, search);
        }

        builder.push(" ORDER BY o.updated_at DESC");

        let rows: Vec<OrderRow> = builder.build_query_as().fetch_all(&self.db).await?;

        rows_into_orders(rows)
    }

    async fn list_with_cursor(
        &self,
        query: &OrderCursorQuery,
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut builder = QueryBuilder::new(ORDER_SELECT);
        builder.push(" WHERE 1=1");

        if !query.search.is_empty() {
            push_search(&mut builder, &query.search);
        }

        if let Some(customer_id) = query.customer_id {
            builder.push(" AND o.customer_id = ").push_bind(customer_id);
        }

        if query.available_only {
            builder
                .push(" AND os.name = 'accepted' AND o.deadline_at > ")
                .push_bind(Utc::now());
        }

        if query.cursor_id > 0 {
            builder.push(" AND o.id < ").push_bind(query.cursor_id);
        }

        builder.push(" ORDER BY o.id DESC LIMIT ").push_bind(query.limit);

        let rows: Vec<OrderRow> = builder.build_query_as().fetch_all(&self.db).await?;

        rows_into_orders(rows)
    }

    async fn list_returns_with_cursor(
        &self,
        cursor_id: i64,
        limit: i64,
        search: &str,
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut builder = QueryBuilder::new(ORDER_SELECT);
        builder.push(" WHERE os.name = 'returned'");

        if !search.is_empty() {
            push_search(&mut builder, search);
        }

        if cursor_id > 0 {
            builder.push(" AND o.id < ").push_bind(cursor_id);
        }

        builder.push(" ORDER BY o.id DESC LIMIT ").push_bind(limit);

        let rows: Vec<OrderRow> = builder.build_query_as().fetch_all(&self.db).await?;

        rows_into_orders(rows)
    }

    async fn list_actual(&self) -> Result<Vec<Order>, RepositoryError> {
        let mut query = String::from(ORDER_SELECT);
        query.push_str(" WHERE os.name IN ('accepted', 'delivered') ORDER BY o.updated_at DESC");

        let rows = sqlx::query_as::<_, OrderRow>(&query)
            .fetch_all(&self.db)
            .await?;

        rows_into_orders(rows)
    }
}
