use std::cmp::Ordering;
use std::collections::HashMap;

use model::{
    Coordinate, Item, Merchant, MerchantCategory, MerchantWithItems, NearbyFilter, NearbyPage, Page,
};
use repository::{CatalogRepository, MerchantQuery, PurchaseRepository};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{PurchaseServiceImpl, ServiceError, ensure_active, guarded, non_blank};

/// Keeps the merchants within `radius_km` of `user` and orders them for display.
///
/// Order: ascending distance, then newest `created_at` first, then merchant id,
/// so the result is the same on every call for the same input.
pub fn rank_by_distance(user: Coordinate, merchants: Vec<Merchant>, radius_km: f64) -> Vec<Merchant> {
    let mut ranked: Vec<(f64, Merchant)> = merchants
        .into_iter()
        .map(|m| (user.distance_to(&m.location), m))
        .filter(|(distance, _)| *distance <= radius_km)
        .collect();

    ranked.sort_by(|(da, a), (db, b)| {
        da.total_cmp(db)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    ranked.into_iter().map(|(_, m)| m).collect()
}

/// Translates raw filter values into a catalog query.
///
/// Returns `None` when the filter cannot match anything: an unknown category
/// or a merchant id that is not a valid identifier.
fn merchant_query(filter: &NearbyFilter) -> Option<MerchantQuery> {
    let merchant_id = match non_blank(filter.merchant_id.as_ref()) {
        Some(raw) => Some(Uuid::parse_str(raw).ok()?),
        None => None,
    };
    let category = match non_blank(filter.category.as_ref()) {
        Some(raw) => Some(raw.parse::<MerchantCategory>().ok()?),
        None => None,
    };
    Some(MerchantQuery {
        merchant_id,
        category,
        name: non_blank(filter.name.as_ref()).map(str::to_string),
    })
}

fn newest_first(a: &Item, b: &Item) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
}

impl<C, P> PurchaseServiceImpl<C, P>
where
    C: CatalogRepository,
    P: PurchaseRepository,
{
    #[instrument(skip(self, cancel))]
    pub(crate) async fn nearby(&self, cancel: &CancellationToken, filter: &NearbyFilter) -> Result<NearbyPage, ServiceError> {
        ensure_active(cancel)?;
        let page = Page::resolve(filter.limit, filter.offset, self.rules.default_page_size);

        let Some(query) = merchant_query(filter) else {
            debug!("Nearby filter cannot match any merchant");
            return Ok(NearbyPage {
                merchants: Vec::new(),
                total: 0,
                page,
            });
        };

        let candidates = guarded(cancel, self.catalog.find_merchants(&query)).await?;
        let ranked = rank_by_distance(filter.user_location, candidates, self.rules.service_radius_km);
        let total = ranked.len();
        let merchants = page.apply(ranked);

        if merchants.is_empty() {
            return Ok(NearbyPage {
                merchants: Vec::new(),
                total,
                page,
            });
        }

        let ids: Vec<Uuid> = merchants.iter().map(|m| m.id).collect();
        let items = guarded(cancel, self.catalog.get_items_by_merchant_ids(&ids)).await?;

        let mut by_merchant: HashMap<Uuid, Vec<Item>> = HashMap::with_capacity(ids.len());
        for item in items {
            by_merchant.entry(item.merchant_id).or_default().push(item);
        }

        let merchants = merchants
            .into_iter()
            .map(|merchant| {
                let mut items = by_merchant.remove(&merchant.id).unwrap_or_default();
                items.sort_by(newest_first);
                MerchantWithItems { merchant, items }
            })
            .collect();

        Ok(NearbyPage {
            merchants,
            total,
            page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn merchant(id: u128, lat: f64, long: f64) -> Merchant {
        merchant_created(id, lat, long, 0)
    }

    fn merchant_created(id: u128, lat: f64, long: f64, created_secs: i64) -> Merchant {
        Merchant {
            id: Uuid::from_u128(id),
            name: format!("merchant-{id}"),
            category: MerchantCategory::SmallRestaurant,
            image_url: String::new(),
            location: Coordinate::new(lat, long),
            created_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
        }
    }

    fn ids(merchants: &[Merchant]) -> Vec<u128> {
        merchants.iter().map(|m| m.id.as_u128()).collect()
    }

    #[test]
    fn test_rank_drops_merchants_outside_radius() {
        let user = Coordinate::new(0.0, 0.0);
        // 0.02 degrees on the equator is ~2.2 km, 0.03 is ~3.3 km.
        let ranked = rank_by_distance(
            user,
            vec![merchant(1, 0.0, 0.03), merchant(2, 0.0, 0.02)],
            3.0,
        );
        assert_eq!(ids(&ranked), vec![2]);
    }

    #[test]
    fn test_rank_orders_by_distance() {
        let user = Coordinate::new(0.0, 0.0);
        let ranked = rank_by_distance(
            user,
            vec![
                merchant(1, 0.0, 0.02),
                merchant(2, 0.0, 0.001),
                merchant(3, 0.01, 0.0),
            ],
            3.0,
        );
        assert_eq!(ids(&ranked), vec![2, 3, 1]);
    }

    #[test]
    fn test_rank_breaks_distance_ties_by_newest_then_id() {
        let user = Coordinate::new(0.0, 0.0);
        let ranked = rank_by_distance(
            user,
            vec![
                merchant_created(1, 0.0, 0.01, 100),
                merchant_created(2, 0.0, -0.01, 200),
                merchant_created(3, 0.0, 0.01, 100),
            ],
            3.0,
        );
        assert_eq!(ids(&ranked), vec![2, 1, 3]);
    }

    #[test]
    fn test_merchant_query_rejects_unknown_category() {
        let mut filter = NearbyFilter::around(Coordinate::new(0.0, 0.0));
        filter.category = Some("FoodTruck".to_string());
        assert_eq!(merchant_query(&filter), None);
    }

    #[test]
    fn test_merchant_query_rejects_malformed_id() {
        let mut filter = NearbyFilter::around(Coordinate::new(0.0, 0.0));
        filter.merchant_id = Some("not-a-uuid".to_string());
        assert_eq!(merchant_query(&filter), None);
    }

    #[test]
    fn test_merchant_query_ignores_blank_values() {
        let mut filter = NearbyFilter::around(Coordinate::new(0.0, 0.0));
        filter.category = Some(String::new());
        filter.name = Some("  ".to_string());
        assert_eq!(merchant_query(&filter), Some(MerchantQuery::default()));
    }
}
