//! # Data Repository Layer
//!
//! Repository traits and their PostgreSQL implementations.
//!
//! * [`CatalogRepository`] is the read-only gateway to merchant and item
//!   master data.
//! * [`PurchaseRepository`] reads estimates and order history and opens
//!   [`PurchaseTransaction`]s, the only way estimates and orders are written.
//!
//! Implementations receive the connection pool through their constructor;
//! nothing in this crate holds global state.

use async_trait::async_trait;
use deadpool_postgres::PoolError;
use model::{
    Estimate, EstimateLineItem, Item, Merchant, MerchantCategory, Order, OrderHistoryRow, Page,
};
use thiserror::Error;
use uuid::Uuid;

mod catalog;
mod purchase;
mod rows;

pub use catalog::PgCatalogRepository;
pub use purchase::{PgPurchaseRepository, PgPurchaseTransaction};

/// # RepositoryError
///
/// Error types that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database-related errors, wrapping the underlying PostgreSQL error
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    /// No connection could be taken from the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
    /// No result found.
    #[error("Not found")]
    NotFound,
    /// A transaction was used after commit or rollback.
    #[error("Transaction already finished")]
    TransactionFinished,
}

/// SQL-side narrowing of the merchant catalog for nearby search.
///
/// Distance is not part of the query; the caller ranks the candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerchantQuery {
    pub merchant_id: Option<Uuid>,
    pub category: Option<MerchantCategory>,
    /// Case-insensitive substring of the merchant name or of any of its item names.
    pub name: Option<String>,
}

/// Filters of the flattened order history feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderHistoryQuery {
    pub user_id: String,
    pub merchant_id: Option<Uuid>,
    pub category: Option<MerchantCategory>,
    /// Case-insensitive substring of the merchant name or of the item name.
    pub name: Option<String>,
    pub page: Page,
}

/// # CatalogRepository
///
/// Read-only lookups of merchant and item records.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Merchants whose id is in `ids`. Unknown ids are silently skipped.
    async fn get_merchants_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Merchant>, RepositoryError>;

    /// Items whose id is in `ids`. Unknown ids are silently skipped.
    async fn get_items_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Item>, RepositoryError>;

    /// A single merchant, or [`RepositoryError::NotFound`].
    async fn get_merchant_by_id(&self, id: Uuid) -> Result<Merchant, RepositoryError>;

    /// Every merchant matching `query`, in no particular order.
    async fn find_merchants(&self, query: &MerchantQuery) -> Result<Vec<Merchant>, RepositoryError>;

    /// All items of the given merchants, newest first.
    async fn get_items_by_merchant_ids(&self, merchant_ids: &[Uuid]) -> Result<Vec<Item>, RepositoryError>;
}

/// # PurchaseRepository
///
/// Reads of estimates and order history, and the entry point for writes.
#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    /// Opens a transaction. Nothing written through it is visible to other
    /// readers until [`PurchaseTransaction::commit`] succeeds.
    async fn begin(&self) -> Result<Box<dyn PurchaseTransaction>, RepositoryError>;

    /// The estimate with `id`, or [`RepositoryError::NotFound`].
    async fn get_estimate_by_id(&self, id: Uuid) -> Result<Estimate, RepositoryError>;

    /// One row per (order, merchant, item), ordered by order id descending.
    async fn get_order_history(&self, query: &OrderHistoryQuery) -> Result<Vec<OrderHistoryRow>, RepositoryError>;
}

/// # PurchaseTransaction
///
/// An open unit of work. Dropping it without calling [`commit`](Self::commit)
/// or [`rollback`](Self::rollback) discards every write made through it.
#[async_trait]
pub trait PurchaseTransaction: Send {
    async fn insert_estimate(&mut self, estimate: &Estimate) -> Result<(), RepositoryError>;

    async fn insert_estimate_items(&mut self, items: &[EstimateLineItem]) -> Result<(), RepositoryError>;

    /// Inserts `order` unless its estimate already has an order.
    ///
    /// Returns the id of the order that now references the estimate: the new
    /// one, or the one created by an earlier confirmation.
    async fn insert_order(&mut self, order: &Order) -> Result<Uuid, RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Escapes `%`, `_` and `\` so `term` matches literally inside an ILIKE pattern.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
