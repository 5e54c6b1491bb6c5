//! Business logic layer for merchant discovery, estimates and orders.
//!
//! This crate defines the [`PurchaseService`] trait and its implementation
//! [`PurchaseServiceImpl`], which composes a [`CatalogRepository`] and a
//! [`PurchaseRepository`].
//!
//! # Features
//! - Nearby search: merchants within the service radius, nearest first, with
//!   their complete item catalog.
//! - Estimates: cart validation, greedy route length, price and ETA, stored
//!   atomically with their line items.
//! - Orders: confirmation of an existing estimate (one order per estimate)
//!   and reconstruction of a user's order history.
//! - Cooperative cancellation: every operation takes a [`CancellationToken`]
//!   and stops before the next datastore round trip once it is cancelled.

use std::future::Future;

use async_trait::async_trait;
use model::{
    DeliveryRules, EstimateQuote, EstimateRequest, NearbyFilter, NearbyPage, OrderHistoryEntry,
    OrderHistoryFilter,
};
use repository::{CatalogRepository, PurchaseRepository, PurchaseTransaction, RepositoryError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

mod estimate;
mod nearby;
mod orders;

pub use nearby::rank_by_distance;
pub use orders::build_order_history;

/// Coarse classification of a [`ServiceError`], used by transports to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    Internal,
    Cancelled,
}

/// The main error type for all operations in [`PurchaseService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request is malformed or violates a business rule.
    #[error("{0}")]
    BadRequest(String),
    /// A referenced merchant, item or estimate does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Reserved for state conflicts.
    #[error("{0}")]
    Conflict(String),
    /// An invariant was broken inside the service.
    #[error("Internal error: {0}")]
    Internal(String),
    /// A repository (database) operation failed.
    #[error("Database error: {0}")]
    Db(RepositoryError),
    /// The caller went away before the operation finished.
    #[error("Operation cancelled")]
    Cancelled,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::BadRequest(_) => ErrorKind::BadRequest,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::Internal(_) | ServiceError::Db(_) => ErrorKind::Internal,
            ServiceError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn bad_request(msg: impl Into<String>) -> Self {
        ServiceError::BadRequest(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        ServiceError::NotFound(msg.into())
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => ServiceError::NotFound("not found".into()),
            other => ServiceError::Db(other),
        }
    }
}

/// Trait describing the purchase operations exposed to transports.
#[async_trait]
pub trait PurchaseService: Send + Sync {
    /// Merchants within the service radius of `filter.user_location`, nearest first.
    ///
    /// # Errors
    /// [`ServiceError::Db`] when the catalog cannot be read,
    /// [`ServiceError::Cancelled`] when `cancel` fires first.
    async fn find_nearby(&self, cancel: &CancellationToken, filter: &NearbyFilter) -> Result<NearbyPage, ServiceError>;

    /// Validates a cart, prices it, estimates delivery time and stores the estimate.
    ///
    /// # Errors
    /// [`ServiceError::BadRequest`] for cart shape, starting point and distance
    /// violations; [`ServiceError::NotFound`] for unknown merchants or items.
    async fn create_estimate(&self, cancel: &CancellationToken, request: &EstimateRequest) -> Result<EstimateQuote, ServiceError>;

    /// Turns an existing estimate into an order and returns the order id.
    ///
    /// Confirming the same estimate again returns the same order id.
    ///
    /// # Errors
    /// [`ServiceError::NotFound`] when the estimate does not exist.
    async fn confirm_order(&self, cancel: &CancellationToken, estimate_id: &str) -> Result<Uuid, ServiceError>;

    /// The user's orders, each grouped by merchant.
    async fn get_order_history(
        &self,
        cancel: &CancellationToken,
        user_id: &str,
        filter: &OrderHistoryFilter,
    ) -> Result<Vec<OrderHistoryEntry>, ServiceError>;
}

/// Implementation of [`PurchaseService`] over injected repositories.
pub struct PurchaseServiceImpl<C, P> {
    catalog: C,
    purchases: P,
    rules: DeliveryRules,
}

impl<C, P> PurchaseServiceImpl<C, P>
where
    C: CatalogRepository,
    P: PurchaseRepository,
{
    /// Constructs a new [`PurchaseServiceImpl`].
    ///
    /// # Arguments
    /// * `catalog` - Read-only merchant and item lookups.
    /// * `purchases` - Estimate and order persistence.
    /// * `rules` - Service radius, courier speed and default page size.
    pub fn new(catalog: C, purchases: P, rules: DeliveryRules) -> Self {
        Self {
            catalog,
            purchases,
            rules,
        }
    }
}

#[async_trait]
impl<C, P> PurchaseService for PurchaseServiceImpl<C, P>
where
    C: CatalogRepository,
    P: PurchaseRepository,
{
    async fn find_nearby(&self, cancel: &CancellationToken, filter: &NearbyFilter) -> Result<NearbyPage, ServiceError> {
        self.nearby(cancel, filter).await
    }

    async fn create_estimate(&self, cancel: &CancellationToken, request: &EstimateRequest) -> Result<EstimateQuote, ServiceError> {
        self.estimate(cancel, request).await
    }

    async fn confirm_order(&self, cancel: &CancellationToken, estimate_id: &str) -> Result<Uuid, ServiceError> {
        self.confirm(cancel, estimate_id).await
    }

    async fn get_order_history(
        &self,
        cancel: &CancellationToken,
        user_id: &str,
        filter: &OrderHistoryFilter,
    ) -> Result<Vec<OrderHistoryEntry>, ServiceError> {
        self.history(cancel, user_id, filter).await
    }
}

/// Fails with [`ServiceError::Cancelled`] once `cancel` has fired.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<(), ServiceError> {
    if cancel.is_cancelled() {
        Err(ServiceError::Cancelled)
    } else {
        Ok(())
    }
}

/// Runs one datastore round trip unless the caller has already gone away,
/// and abandons it if the caller goes away while it is in flight.
pub(crate) async fn guarded<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    ensure_active(cancel)?;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ServiceError::Cancelled),
        res = fut => res.map_err(ServiceError::from),
    }
}

/// Commits `tx` when `result` is Ok and the caller is still waiting,
/// otherwise rolls it back and returns the error.
pub(crate) async fn finish_transaction<T>(
    tx: Box<dyn PurchaseTransaction>,
    cancel: &CancellationToken,
    result: Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    let result = result.and_then(|value| ensure_active(cancel).map(|()| value));
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback failed after {err}: {rollback_err}");
            }
            Err(err)
        }
    }
}

/// Treats an empty or whitespace-only filter value as absent.
pub(crate) fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}
