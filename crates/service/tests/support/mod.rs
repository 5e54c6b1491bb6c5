//! In-memory repositories shared by the service integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use model::{
    Coordinate, DeliveryRules, Estimate, EstimateLineItem, Item, ItemCategory, Merchant, MerchantCategory, Order,
    OrderHistoryItem, OrderHistoryRow,
};
use repository::{
    CatalogRepository, MerchantQuery, OrderHistoryQuery, PurchaseRepository, PurchaseTransaction, RepositoryError,
};
use service::PurchaseServiceImpl;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const USER: Coordinate = Coordinate { lat: -6.2, long: 106.8 };

pub const NASI: u128 = 1;
pub const KOPI: u128 = 2;
pub const FAR: u128 = 3;

pub const NASI_GORENG: u128 = 11;
pub const ES_TEH: u128 = 12;
pub const KOPI_SUSU: u128 = 21;
pub const ROTI_BAKAR: u128 = 22;
pub const FAR_SOUP: u128 = 31;

#[derive(Default)]
pub struct Store {
    pub merchants: Vec<Merchant>,
    pub items: Vec<Item>,
    pub estimates: Vec<Estimate>,
    pub estimate_items: Vec<EstimateLineItem>,
    pub orders: Vec<Order>,
    pub transactions_begun: usize,
    pub rollbacks: usize,
    pub fail_estimate_items: bool,
    /// When set, the next transaction cancels this token right after its
    /// first estimate or order write succeeds.
    pub cancel_on_write: Option<CancellationToken>,
}

#[derive(Clone, Default)]
pub struct Shared(Arc<Mutex<Store>>);

impl Shared {
    pub fn lock(&self) -> MutexGuard<'_, Store> {
        self.0.lock().unwrap()
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn merchant(n: u128, name: &str, category: MerchantCategory, lat: f64, long: f64) -> Merchant {
    Merchant {
        id: id(n),
        name: name.to_string(),
        category,
        image_url: format!("https://img.example/{n}.png"),
        location: Coordinate::new(lat, long),
        created_at: at(n as i64),
    }
}

fn item(n: u128, merchant: u128, name: &str, category: ItemCategory, price: i64, created: i64) -> Item {
    Item {
        id: id(n),
        merchant_id: id(merchant),
        name: name.to_string(),
        category,
        price,
        image_url: format!("https://img.example/items/{n}.png"),
        created_at: at(created),
    }
}

/// Two merchants about 1.1 km from [`USER`] and one about 3.3 km away.
pub fn seeded() -> Shared {
    let shared = Shared::default();
    {
        let mut store = shared.lock();
        store.merchants = vec![
            merchant(NASI, "Warung Nasi", MerchantCategory::SmallRestaurant, -6.19, 106.8),
            merchant(KOPI, "Kedai Kopi", MerchantCategory::BoothKiosk, -6.2, 106.81),
            merchant(FAR, "Soto Jauh", MerchantCategory::LargeRestaurant, -6.17, 106.8),
        ];
        store.items = vec![
            item(NASI_GORENG, NASI, "Nasi Goreng", ItemCategory::Food, 10_000, 100),
            item(ES_TEH, NASI, "Es Teh", ItemCategory::Beverage, 3_000, 200),
            item(KOPI_SUSU, KOPI, "Kopi Susu", ItemCategory::Beverage, 2_000, 50),
            item(ROTI_BAKAR, KOPI, "Roti Bakar", ItemCategory::Snack, 8_000, 60),
            item(FAR_SOUP, FAR, "Soto Ayam", ItemCategory::Food, 15_000, 10),
        ];
    }
    shared
}

pub fn service(shared: &Shared) -> PurchaseServiceImpl<InMemoryCatalog, InMemoryPurchases> {
    PurchaseServiceImpl::new(
        InMemoryCatalog(shared.clone()),
        InMemoryPurchases(shared.clone()),
        DeliveryRules::default(),
    )
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

pub struct InMemoryCatalog(pub Shared);

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn get_merchants_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Merchant>, RepositoryError> {
        let store = self.0.lock();
        Ok(store.merchants.iter().filter(|m| ids.contains(&m.id)).cloned().collect())
    }

    async fn get_items_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Item>, RepositoryError> {
        let store = self.0.lock();
        Ok(store.items.iter().filter(|i| ids.contains(&i.id)).cloned().collect())
    }

    async fn get_merchant_by_id(&self, id: Uuid) -> Result<Merchant, RepositoryError> {
        let store = self.0.lock();
        store
            .merchants
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn find_merchants(&self, query: &MerchantQuery) -> Result<Vec<Merchant>, RepositoryError> {
        let store = self.0.lock();
        let keep = |m: &Merchant| {
            query.merchant_id.is_none_or(|id| m.id == id)
                && query.category.is_none_or(|c| m.category == c)
                && query.name.as_deref().is_none_or(|name| {
                    contains_ci(&m.name, name)
                        || store
                            .items
                            .iter()
                            .any(|i| i.merchant_id == m.id && contains_ci(&i.name, name))
                })
        };
        // Reverse insertion order: callers must not rely on repository ordering.
        Ok(store.merchants.iter().rev().filter(|m| keep(m)).cloned().collect())
    }

    async fn get_items_by_merchant_ids(&self, merchant_ids: &[Uuid]) -> Result<Vec<Item>, RepositoryError> {
        let store = self.0.lock();
        Ok(store
            .items
            .iter()
            .filter(|i| merchant_ids.contains(&i.merchant_id))
            .cloned()
            .collect())
    }
}

pub struct InMemoryPurchases(pub Shared);

#[async_trait]
impl PurchaseRepository for InMemoryPurchases {
    async fn begin(&self) -> Result<Box<dyn PurchaseTransaction>, RepositoryError> {
        let cancel_on_write = {
            let mut store = self.0.lock();
            store.transactions_begun += 1;
            store.cancel_on_write.take()
        };
        let inner = InMemoryTransaction {
            shared: self.0.clone(),
            estimates: Vec::new(),
            estimate_items: Vec::new(),
            orders: Vec::new(),
        };
        Ok(match cancel_on_write {
            Some(cancel) => Box::new(CancellingTransaction { inner, cancel }),
            None => Box::new(inner),
        })
    }

    async fn get_estimate_by_id(&self, id: Uuid) -> Result<Estimate, RepositoryError> {
        let store = self.0.lock();
        store
            .estimates
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_order_history(&self, query: &OrderHistoryQuery) -> Result<Vec<OrderHistoryRow>, RepositoryError> {
        let store = self.0.lock();
        let mut rows = Vec::new();
        for order in &store.orders {
            let Some(estimate) = store.estimates.iter().find(|e| e.id == order.estimate_id) else {
                continue;
            };
            if estimate.user_id != query.user_id {
                continue;
            }
            for line in store.estimate_items.iter().filter(|l| l.estimate_id == estimate.id) {
                let (Some(merchant), Some(item)) = (
                    store.merchants.iter().find(|m| m.id == line.merchant_id),
                    store.items.iter().find(|i| i.id == line.item_id),
                ) else {
                    continue;
                };
                let keep = query.merchant_id.is_none_or(|id| merchant.id == id)
                    && query.category.is_none_or(|c| merchant.category == c)
                    && query
                        .name
                        .as_deref()
                        .is_none_or(|name| contains_ci(&merchant.name, name) || contains_ci(&item.name, name));
                if !keep {
                    continue;
                }
                rows.push(OrderHistoryRow {
                    order_id: order.id,
                    merchant: merchant.clone(),
                    item: OrderHistoryItem {
                        item_id: item.id,
                        category: item.category,
                        name: item.name.clone(),
                        quantity: line.quantity,
                        image_url: item.image_url.clone(),
                        price: line.unit_price,
                        created_at: item.created_at,
                    },
                });
            }
        }
        rows.sort_by(|a, b| {
            b.order_id
                .cmp(&a.order_id)
                .then_with(|| a.merchant.id.cmp(&b.merchant.id))
                .then_with(|| a.item.item_id.cmp(&b.item.item_id))
        });
        Ok(query.page.apply(rows))
    }
}

/// Buffers writes until commit, like a database transaction would.
pub struct InMemoryTransaction {
    shared: Shared,
    estimates: Vec<Estimate>,
    estimate_items: Vec<EstimateLineItem>,
    orders: Vec<Order>,
}

#[async_trait]
impl PurchaseTransaction for InMemoryTransaction {
    async fn insert_estimate(&mut self, estimate: &Estimate) -> Result<(), RepositoryError> {
        self.estimates.push(estimate.clone());
        Ok(())
    }

    async fn insert_estimate_items(&mut self, items: &[EstimateLineItem]) -> Result<(), RepositoryError> {
        if self.shared.lock().fail_estimate_items {
            return Err(RepositoryError::TransactionFinished);
        }
        self.estimate_items.extend_from_slice(items);
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<Uuid, RepositoryError> {
        let existing = {
            let store = self.shared.lock();
            store
                .orders
                .iter()
                .chain(self.orders.iter())
                .find(|o| o.estimate_id == order.estimate_id)
                .map(|o| o.id)
        };
        match existing {
            Some(id) => Ok(id),
            None => {
                self.orders.push(order.clone());
                Ok(order.id)
            }
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let this = *self;
        let mut store = this.shared.lock();
        store.estimates.extend(this.estimates);
        store.estimate_items.extend(this.estimate_items);
        store.orders.extend(this.orders);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.shared.lock().rollbacks += 1;
        Ok(())
    }
}

/// Cancels the caller's token once a write lands, as if the client hung up
/// halfway through the transaction.
pub struct CancellingTransaction {
    inner: InMemoryTransaction,
    cancel: CancellationToken,
}

#[async_trait]
impl PurchaseTransaction for CancellingTransaction {
    async fn insert_estimate(&mut self, estimate: &Estimate) -> Result<(), RepositoryError> {
        self.inner.insert_estimate(estimate).await?;
        self.cancel.cancel();
        Ok(())
    }

    async fn insert_estimate_items(&mut self, items: &[EstimateLineItem]) -> Result<(), RepositoryError> {
        self.inner.insert_estimate_items(items).await
    }

    async fn insert_order(&mut self, order: &Order) -> Result<Uuid, RepositoryError> {
        let id = self.inner.insert_order(order).await?;
        self.cancel.cancel();
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        Box::new(self.inner).commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        Box::new(self.inner).rollback().await
    }
}
