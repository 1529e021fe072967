use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{LineItem, Order, OrderStatus, Result, StoreError, store::OrderStore};

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let id: Uuid = row.try_get("id")?;
        let items_json: serde_json::Value = row.try_get("items")?;
        let items: Vec<LineItem> = serde_json::from_value(items_json)?;
        let status: String = row.try_get("status")?;
        let status: OrderStatus = status
            .parse()
            .map_err(|reason| StoreError::CorruptRecord {
                id: id.to_string(),
                reason,
            })?;

        Ok(Order {
            id: OrderId::from_uuid(id),
            customer_id: CustomerId::new(row.try_get::<String, _>("customer_id")?),
            items,
            status,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let items_json = serde_json::to_value(&order.items)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, items, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_str())
        .bind(items_json)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::DuplicateOrder(order.id);
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, customer_id, items, status, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn transition_status(
        &self,
        ids: &[OrderId],
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = ids.iter().map(OrderId::as_uuid).collect();
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, updated_at = $2
            WHERE id = ANY($3) AND status = $4
            "#,
        )
        .bind(to.as_str())
        .bind(at)
        .bind(&ids)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            requested = ids.len(),
            changed = result.rows_affected(),
            %from,
            %to,
            "bulk status transition"
        );

        Ok(result.rows_affected())
    }
}
