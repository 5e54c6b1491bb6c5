use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use geodesy::Coordinate;

/// Returned when a category string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category: {0}")]
pub struct ParseCategoryError(pub String);

/// MerchantCategory — the kind of outlet a merchant runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "merchant_category")]
pub enum MerchantCategory {
    SmallRestaurant,
    MediumRestaurant,
    LargeRestaurant,
    MerchandiseRestaurant,
    BoothKiosk,
    ConvenienceStore,
}

impl MerchantCategory {
    pub const ALL: [MerchantCategory; 6] = [
        MerchantCategory::SmallRestaurant,
        MerchantCategory::MediumRestaurant,
        MerchantCategory::LargeRestaurant,
        MerchantCategory::MerchandiseRestaurant,
        MerchantCategory::BoothKiosk,
        MerchantCategory::ConvenienceStore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MerchantCategory::SmallRestaurant => "SmallRestaurant",
            MerchantCategory::MediumRestaurant => "MediumRestaurant",
            MerchantCategory::LargeRestaurant => "LargeRestaurant",
            MerchantCategory::MerchandiseRestaurant => "MerchandiseRestaurant",
            MerchantCategory::BoothKiosk => "BoothKiosk",
            MerchantCategory::ConvenienceStore => "ConvenienceStore",
        }
    }
}

impl FromStr for MerchantCategory {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MerchantCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ParseCategoryError(s.to_string()))
    }
}

impl fmt::Display for MerchantCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ItemCategory — what kind of product an item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "product_category")]
pub enum ItemCategory {
    Beverage,
    Food,
    Snack,
    Condiments,
    Additions,
}

impl ItemCategory {
    pub const ALL: [ItemCategory; 5] = [
        ItemCategory::Beverage,
        ItemCategory::Food,
        ItemCategory::Snack,
        ItemCategory::Condiments,
        ItemCategory::Additions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::Beverage => "Beverage",
            ItemCategory::Food => "Food",
            ItemCategory::Snack => "Snack",
            ItemCategory::Condiments => "Condiments",
            ItemCategory::Additions => "Additions",
        }
    }
}

impl FromStr for ItemCategory {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ParseCategoryError(s.to_string()))
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merchant — a catalog outlet at a fixed location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Merchant {
    #[serde(rename = "merchantId")]
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "merchantCategory")]
    pub category: MerchantCategory,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    pub location: Coordinate,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Item — a product sold by one merchant. Prices are in the smallest currency unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    #[serde(rename = "itemId")]
    pub id: Uuid,
    #[serde(rename = "merchantId")]
    pub merchant_id: Uuid,
    pub name: String,
    #[serde(rename = "productCategory")]
    pub category: ItemCategory,
    pub price: i64,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// MerchantWithItems — a merchant together with its full current catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MerchantWithItems {
    pub merchant: Merchant,
    pub items: Vec<Item>,
}

/// CartItem — one requested item and how many of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartItem {
    #[serde(rename = "itemId")]
    pub item_id: String,
    pub quantity: i32,
}

/// CartLine — everything ordered from a single merchant.
///
/// Ids are kept as received; the estimate engine decides whether they are valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartLine {
    #[serde(rename = "merchantId")]
    pub merchant_id: String,
    #[serde(rename = "isStartingPoint")]
    pub is_starting_point: bool,
    pub items: Vec<CartItem>,
}

/// EstimateRequest — a user's cart and where it should be delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateRequest {
    pub user_id: String,
    pub user_location: Coordinate,
    pub lines: Vec<CartLine>,
}

/// Estimate — a persisted quote owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Estimate {
    pub id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// EstimateLineItem — one (merchant, item, quantity) triple of an estimate.
///
/// `unit_price` is the item price at estimation time, so later catalog price
/// changes do not rewrite order history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EstimateLineItem {
    pub id: Uuid,
    pub estimate_id: Uuid,
    pub merchant_id: Uuid,
    pub item_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
}

/// EstimateQuote — what the caller gets back after an estimate is stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EstimateQuote {
    #[serde(rename = "calculatedEstimateId")]
    pub estimate_id: Uuid,
    #[serde(rename = "totalPrice")]
    pub total_price: i64,
    #[serde(rename = "estimatedDeliveryTimeInMinutes")]
    pub eta_minutes: i64,
}

/// Order — a confirmed estimate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    pub id: Uuid,
    pub estimate_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Page — a resolved limit/offset window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    /// Applies defaults and bounds: a missing limit falls back to `default_limit`,
    /// a limit below 1 becomes 1, a missing or negative offset becomes 0.
    pub fn resolve(limit: Option<i64>, offset: Option<i64>, default_limit: usize) -> Self {
        let limit = match limit {
            Some(l) => usize::try_from(l.max(1)).unwrap_or(usize::MAX),
            None => default_limit.max(1),
        };
        let offset = offset
            .and_then(|o| usize::try_from(o.max(0)).ok())
            .unwrap_or(0);
        Self { limit, offset }
    }

    /// Returns the slice of `items` covered by this page.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.offset).take(self.limit).collect()
    }
}

/// NearbyFilter — parameters of a nearby-merchant search.
///
/// Filter values are raw strings as received; an unknown category or a
/// malformed merchant id simply matches nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyFilter {
    pub user_location: Coordinate,
    pub merchant_id: Option<String>,
    pub category: Option<String>,
    pub name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl NearbyFilter {
    /// A search around `user_location` with no extra filters and default paging.
    pub fn around(user_location: Coordinate) -> Self {
        Self {
            user_location,
            merchant_id: None,
            category: None,
            name: None,
            limit: None,
            offset: None,
        }
    }
}

/// NearbyPage — one page of nearby merchants plus the unpaginated total.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NearbyPage {
    pub merchants: Vec<MerchantWithItems>,
    pub total: usize,
    pub page: Page,
}

/// OrderHistoryFilter — optional narrowing of a user's order history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderHistoryFilter {
    pub merchant_id: Option<String>,
    pub category: Option<String>,
    pub name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// OrderHistoryRow — one flattened (order, merchant, item) row of the history feed.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderHistoryRow {
    pub order_id: Uuid,
    pub merchant: Merchant,
    pub item: OrderHistoryItem,
}

/// OrderHistoryItem — an item as it was when the order was placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderHistoryItem {
    #[serde(rename = "itemId")]
    pub item_id: Uuid,
    #[serde(rename = "productCategory")]
    pub category: ItemCategory,
    pub name: String,
    pub quantity: i32,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    pub price: i64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// OrderHistoryMerchant — the part of an order bought from one merchant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderHistoryMerchant {
    pub merchant: Merchant,
    pub items: Vec<OrderHistoryItem>,
}

/// OrderHistoryEntry — one order with its merchants and items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderHistoryEntry {
    #[serde(rename = "orderId")]
    pub order_id: Uuid,
    #[serde(rename = "orders")]
    pub merchants: Vec<OrderHistoryMerchant>,
}

/// DeliveryRules — business constants of the delivery model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryRules {
    /// Maximum distance between the user and any merchant, in kilometres.
    pub service_radius_km: f64,
    /// Assumed courier speed, in kilometres per hour.
    pub courier_speed_kmh: f64,
    pub default_page_size: usize,
}

impl Default for DeliveryRules {
    fn default() -> Self {
        Self {
            service_radius_km: 3.0,
            courier_speed_kmh: 40.0,
            default_page_size: 5,
        }
    }
}
