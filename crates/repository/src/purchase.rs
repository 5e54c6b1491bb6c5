use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use model::{Estimate, EstimateLineItem, Order, OrderHistoryRow};
use tokio_postgres::types::ToSql;
use tracing::warn;
use uuid::Uuid;

use crate::rows;
use crate::{
    OrderHistoryQuery, PurchaseRepository, PurchaseTransaction, RepositoryError, like_pattern,
};

/// PostgreSQL implementation of the [`PurchaseRepository`] trait.
#[derive(Clone)]
pub struct PgPurchaseRepository {
    pool: Pool,
}

impl PgPurchaseRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PurchaseRepository for PgPurchaseRepository {
    async fn begin(&self) -> Result<Box<dyn PurchaseTransaction>, RepositoryError> {
        // Wrap the connection first so a drop during BEGIN discards it.
        let tx = PgPurchaseTransaction {
            client: Some(self.pool.get().await?),
        };
        tx.client()?.batch_execute("BEGIN").await?;
        Ok(Box::new(tx))
    }

    async fn get_estimate_by_id(&self, id: Uuid) -> Result<Estimate, RepositoryError> {
        let query = "SELECT id, user_id, created_at FROM estimates WHERE id = $1";
        let client = self.pool.get().await?;
        match client.query_opt(query, &[&id]).await? {
            Some(row) => Ok(Estimate {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                created_at: row.try_get("created_at")?,
            }),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn get_order_history(&self, filter: &OrderHistoryQuery) -> Result<Vec<OrderHistoryRow>, RepositoryError> {
        let pattern = filter.name.as_deref().map(like_pattern);
        let limit = i64::try_from(filter.page.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(filter.page.offset).unwrap_or(i64::MAX);

        let mut conditions = vec!["user_id = $1".to_string()];
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        params.push(&filter.user_id);

        if let Some(category) = &filter.category {
            params.push(category);
            conditions.push(format!("merchant_category = ${}", params.len()));
        }
        if let Some(id) = &filter.merchant_id {
            params.push(id);
            conditions.push(format!("merchant_id = ${}", params.len()));
        }
        if let Some(pattern) = &pattern {
            params.push(pattern);
            let i = params.len();
            conditions.push(format!("(merchant_name ILIKE ${i} OR item_name ILIKE ${i})"));
        }
        params.push(&limit);
        let limit_idx = params.len();
        params.push(&offset);
        let offset_idx = params.len();

        let query = format!(
            r#"
            SELECT
                order_id, user_id,
                merchant_id, merchant_name, merchant_category, merchant_image_url,
                merchant_lat, merchant_long, merchant_created_at,
                item_id, item_name, item_category, item_price, quantity,
                item_image_url, item_created_at
            FROM order_history_view
            WHERE {}
            ORDER BY order_id DESC, merchant_id, item_id
            LIMIT ${limit_idx} OFFSET ${offset_idx}
            "#,
            conditions.join(" AND ")
        );

        let client = self.pool.get().await?;
        let rows = client.query(query.as_str(), &params).await?;
        rows.iter().map(rows::order_history).collect()
    }
}

/// A transaction on a pooled connection.
///
/// The connection is held for the lifetime of the transaction. If the value
/// is dropped while still open, the connection is detached from the pool and
/// closed, which makes the server abort the transaction.
pub struct PgPurchaseTransaction {
    client: Option<Object>,
}

impl PgPurchaseTransaction {
    fn client(&self) -> Result<&Object, RepositoryError> {
        self.client.as_ref().ok_or(RepositoryError::TransactionFinished)
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> Result<(), RepositoryError> {
        let client = self.client.take().ok_or(RepositoryError::TransactionFinished)?;
        client.batch_execute(statement).await?;
        Ok(())
    }
}

#[async_trait]
impl PurchaseTransaction for PgPurchaseTransaction {
    async fn insert_estimate(&mut self, estimate: &Estimate) -> Result<(), RepositoryError> {
        let query = r#"
            INSERT INTO estimates (id, user_id, created_at)
            VALUES ($1, $2, $3)
        "#;
        self.client()?
            .execute(query, &[&estimate.id, &estimate.user_id, &estimate.created_at])
            .await?;
        Ok(())
    }

    async fn insert_estimate_items(&mut self, items: &[EstimateLineItem]) -> Result<(), RepositoryError> {
        let query = r#"
            INSERT INTO estimate_items (id, estimate_id, merchant_id, item_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#;
        let client = self.client()?;
        let statement = client.prepare_cached(query).await?;
        for it in items {
            client
                .execute(&statement, &[
                    &it.id,
                    &it.estimate_id,
                    &it.merchant_id,
                    &it.item_id,
                    &it.quantity,
                    &it.unit_price,
                ])
                .await?;
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<Uuid, RepositoryError> {
        let client = self.client()?;
        let inserted = client
            .query_opt(
                r#"
                INSERT INTO orders (id, estimate_id, created_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (estimate_id) DO NOTHING
                RETURNING id
                "#,
                &[&order.id, &order.estimate_id, &order.created_at],
            )
            .await?;
        if let Some(row) = inserted {
            return Ok(row.try_get("id")?);
        }

        // Already confirmed; the conflicting row is committed and visible to a new statement.
        let existing = client
            .query_one("SELECT id FROM orders WHERE estimate_id = $1", &[&order.estimate_id])
            .await?;
        Ok(existing.try_get("id")?)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgPurchaseTransaction {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            warn!("Transaction dropped while open, discarding its connection");
            drop(Object::take(client));
        }
    }
}
