use std::collections::HashMap;

use chrono::Utc;
use model::{
    MerchantCategory, Order, OrderHistoryEntry, OrderHistoryFilter, OrderHistoryMerchant, OrderHistoryRow, Page,
};
use repository::{CatalogRepository, OrderHistoryQuery, PurchaseRepository};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{PurchaseServiceImpl, ServiceError, ensure_active, finish_transaction, guarded, non_blank};

/// Folds flattened history rows into orders, each holding its merchants and
/// their items.
///
/// Orders appear in the order of their first row, merchants in the order they
/// first appear within an order, and items in row order. A merchant's details
/// are taken from its first row within the order.
pub fn build_order_history(rows: Vec<OrderHistoryRow>) -> Vec<OrderHistoryEntry> {
    let mut entries: Vec<OrderHistoryEntry> = Vec::new();
    let mut order_pos: HashMap<Uuid, usize> = HashMap::new();
    let mut merchant_pos: HashMap<(Uuid, Uuid), usize> = HashMap::new();

    for row in rows {
        let oi = match order_pos.get(&row.order_id) {
            Some(&i) => i,
            None => {
                entries.push(OrderHistoryEntry {
                    order_id: row.order_id,
                    merchants: Vec::new(),
                });
                order_pos.insert(row.order_id, entries.len() - 1);
                entries.len() - 1
            }
        };
        let merchants = &mut entries[oi].merchants;

        let key = (row.order_id, row.merchant.id);
        let mi = match merchant_pos.get(&key) {
            Some(&i) => i,
            None => {
                merchants.push(OrderHistoryMerchant {
                    merchant: row.merchant,
                    items: Vec::new(),
                });
                merchant_pos.insert(key, merchants.len() - 1);
                merchants.len() - 1
            }
        };
        merchants[mi].items.push(row.item);
    }

    entries
}

/// Translates raw history filters into a repository query, or `None` when
/// they cannot match anything.
fn history_query(user_id: &str, filter: &OrderHistoryFilter, page: Page) -> Option<OrderHistoryQuery> {
    let merchant_id = match non_blank(filter.merchant_id.as_ref()) {
        Some(raw) => Some(Uuid::parse_str(raw).ok()?),
        None => None,
    };
    let category = match non_blank(filter.category.as_ref()) {
        Some(raw) => Some(raw.parse::<MerchantCategory>().ok()?),
        None => None,
    };
    Some(OrderHistoryQuery {
        user_id: user_id.to_string(),
        merchant_id,
        category,
        name: non_blank(filter.name.as_ref()).map(str::to_string),
        page,
    })
}

impl<C, P> PurchaseServiceImpl<C, P>
where
    C: CatalogRepository,
    P: PurchaseRepository,
{
    #[instrument(skip(self, cancel))]
    pub(crate) async fn confirm(&self, cancel: &CancellationToken, estimate_id: &str) -> Result<Uuid, ServiceError> {
        ensure_active(cancel)?;
        let estimate_id =
            Uuid::parse_str(estimate_id).map_err(|_| ServiceError::not_found("estimate not found"))?;

        let estimate = match guarded(cancel, self.purchases.get_estimate_by_id(estimate_id)).await {
            Ok(estimate) => estimate,
            Err(ServiceError::NotFound(_)) => return Err(ServiceError::not_found("estimate not found")),
            Err(err) => return Err(err),
        };

        let order = Order {
            id: Uuid::new_v4(),
            estimate_id: estimate.id,
            created_at: Utc::now(),
        };

        let mut tx = guarded(cancel, self.purchases.begin()).await?;
        let inserted = guarded(cancel, tx.insert_order(&order)).await;
        let order_id = finish_transaction(tx, cancel, inserted).await?;

        if order_id == order.id {
            info!(%order_id, estimate_id = %estimate.id, "Order created");
        } else {
            info!(%order_id, estimate_id = %estimate.id, "Estimate already confirmed");
        }
        Ok(order_id)
    }

    #[instrument(skip(self, cancel))]
    pub(crate) async fn history(
        &self,
        cancel: &CancellationToken,
        user_id: &str,
        filter: &OrderHistoryFilter,
    ) -> Result<Vec<OrderHistoryEntry>, ServiceError> {
        ensure_active(cancel)?;
        let page = Page::resolve(filter.limit, filter.offset, self.rules.default_page_size);
        let Some(query) = history_query(user_id, filter, page) else {
            debug!("History filter cannot match any order");
            return Ok(Vec::new());
        };

        let rows = guarded(cancel, self.purchases.get_order_history(&query)).await?;
        Ok(build_order_history(rows))
    }
}
