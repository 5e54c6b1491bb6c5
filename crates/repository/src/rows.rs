//! Mapping of result rows into model types.

use model::{Coordinate, Item, Merchant, OrderHistoryItem, OrderHistoryRow};
use tokio_postgres::Row;

use crate::RepositoryError;

pub(crate) const MERCHANT_COLUMNS: &str = "m.id, m.name, m.category, m.image_url, m.lat, m.long, m.created_at";

pub(crate) const ITEM_COLUMNS: &str = "i.id, i.merchant_id, i.name, i.category, i.price, i.image_url, i.created_at";

pub(crate) fn merchant(row: &Row) -> Result<Merchant, RepositoryError> {
    Ok(Merchant {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        image_url: row.try_get("image_url")?,
        location: Coordinate::new(row.try_get("lat")?, row.try_get("long")?),
        created_at: row.try_get("created_at")?,
    })
}

pub(crate) fn item(row: &Row) -> Result<Item, RepositoryError> {
    Ok(Item {
        id: row.try_get("id")?,
        merchant_id: row.try_get("merchant_id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        price: row.try_get("price")?,
        image_url: row.try_get("image_url")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(crate) fn order_history(row: &Row) -> Result<OrderHistoryRow, RepositoryError> {
    Ok(OrderHistoryRow {
        order_id: row.try_get("order_id")?,
        merchant: Merchant {
            id: row.try_get("merchant_id")?,
            name: row.try_get("merchant_name")?,
            category: row.try_get("merchant_category")?,
            image_url: row.try_get("merchant_image_url")?,
            location: Coordinate::new(row.try_get("merchant_lat")?, row.try_get("merchant_long")?),
            created_at: row.try_get("merchant_created_at")?,
        },
        item: OrderHistoryItem {
            item_id: row.try_get("item_id")?,
            category: row.try_get("item_category")?,
            name: row.try_get("item_name")?,
            quantity: row.try_get("quantity")?,
            image_url: row.try_get("item_image_url")?,
            price: row.try_get("item_price")?,
            created_at: row.try_get("item_created_at")?,
        },
    })
}
