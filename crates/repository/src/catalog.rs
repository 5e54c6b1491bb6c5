use async_trait::async_trait;
use deadpool_postgres::Pool;
use model::{Item, Merchant};
use tokio_postgres::types::ToSql;
use uuid::Uuid;

use crate::rows::{self, ITEM_COLUMNS, MERCHANT_COLUMNS};
use crate::{CatalogRepository, MerchantQuery, RepositoryError, like_pattern};

/// PostgreSQL implementation of the [`CatalogRepository`] trait.
#[derive(Clone)]
pub struct PgCatalogRepository {
    pool: Pool,
}

impl PgCatalogRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn get_merchants_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Merchant>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!("SELECT {MERCHANT_COLUMNS} FROM merchants m WHERE m.id = ANY($1)");
        let client = self.pool.get().await?;
        let rows = client.query(query.as_str(), &[&ids]).await?;
        rows.iter().map(rows::merchant).collect()
    }

    async fn get_items_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Item>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!("SELECT {ITEM_COLUMNS} FROM items i WHERE i.id = ANY($1)");
        let client = self.pool.get().await?;
        let rows = client.query(query.as_str(), &[&ids]).await?;
        rows.iter().map(rows::item).collect()
    }

    async fn get_merchant_by_id(&self, id: Uuid) -> Result<Merchant, RepositoryError> {
        let query = format!("SELECT {MERCHANT_COLUMNS} FROM merchants m WHERE m.id = $1");
        let client = self.pool.get().await?;
        match client.query_opt(query.as_str(), &[&id]).await? {
            Some(row) => rows::merchant(&row),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn find_merchants(&self, filter: &MerchantQuery) -> Result<Vec<Merchant>, RepositoryError> {
        let pattern = filter.name.as_deref().map(like_pattern);

        let mut conditions = vec!["TRUE".to_string()];
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(id) = &filter.merchant_id {
            params.push(id);
            conditions.push(format!("m.id = ${}", params.len()));
        }
        if let Some(category) = &filter.category {
            params.push(category);
            conditions.push(format!("m.category = ${}", params.len()));
        }
        if let Some(pattern) = &pattern {
            params.push(pattern);
            let i = params.len();
            conditions.push(format!(
                "(m.name ILIKE ${i} OR EXISTS (
                    SELECT 1 FROM items it
                    WHERE it.merchant_id = m.id AND it.name ILIKE ${i}
                ))"
            ));
        }

        let query = format!(
            "SELECT {MERCHANT_COLUMNS} FROM merchants m WHERE {}",
            conditions.join(" AND ")
        );
        let client = self.pool.get().await?;
        let rows = client.query(query.as_str(), &params).await?;
        rows.iter().map(rows::merchant).collect()
    }

    async fn get_items_by_merchant_ids(&self, merchant_ids: &[Uuid]) -> Result<Vec<Item>, RepositoryError> {
        if merchant_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM items i
             WHERE i.merchant_id = ANY($1)
             ORDER BY i.created_at DESC, i.id"
        );
        let client = self.pool.get().await?;
        let rows = client.query(query.as_str(), &[&merchant_ids]).await?;
        rows.iter().map(rows::item).collect()
    }
}
