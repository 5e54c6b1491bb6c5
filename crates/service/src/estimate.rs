use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use geodesy::route_length_km;
use model::{
    CartLine, Coordinate, Estimate, EstimateLineItem, EstimateQuote, EstimateRequest, Item, Merchant,
};
use repository::{CatalogRepository, PurchaseRepository, PurchaseTransaction};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{PurchaseServiceImpl, ServiceError, ensure_active, finish_transaction, guarded};

/// A cart line whose ids have been parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedLine {
    merchant_id: Uuid,
    items: Vec<(Uuid, i32)>,
}

/// Index of the single line flagged as starting point.
fn starting_index(lines: &[CartLine]) -> Result<usize, ServiceError> {
    let mut starts = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.is_starting_point)
        .map(|(i, _)| i);
    match (starts.next(), starts.next()) {
        (Some(i), None) => Ok(i),
        _ => Err(ServiceError::bad_request("must have exactly one starting point")),
    }
}

fn check_shape(lines: &[CartLine]) -> Result<(), ServiceError> {
    for line in lines {
        if line.items.is_empty() {
            return Err(ServiceError::bad_request(format!(
                "order for merchant {} has no items",
                line.merchant_id
            )));
        }
        if let Some(item) = line.items.iter().find(|item| item.quantity < 1) {
            return Err(ServiceError::bad_request(format!(
                "quantity of item {} must be at least 1",
                item.item_id
            )));
        }
    }
    Ok(())
}

/// Parses every id in the cart. A malformed id can never exist, so it is
/// reported exactly like an unknown one.
fn parse_lines(lines: &[CartLine]) -> Result<Vec<ParsedLine>, ServiceError> {
    lines
        .iter()
        .map(|line| {
            let merchant_id = Uuid::parse_str(&line.merchant_id)
                .map_err(|_| ServiceError::not_found(format!("merchant {} not found", line.merchant_id)))?;
            let items = line
                .items
                .iter()
                .map(|item| {
                    Uuid::parse_str(&item.item_id)
                        .map(|id| (id, item.quantity))
                        .map_err(|_| ServiceError::not_found(format!("item {} not found", item.item_id)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ParsedLine { merchant_id, items })
        })
        .collect()
}

/// Requires every referenced merchant and item to be resolved, and every item
/// to be sold by the merchant of its line.
fn check_resolved(
    lines: &[ParsedLine],
    merchants: &HashMap<Uuid, Merchant>,
    items: &HashMap<Uuid, Item>,
) -> Result<(), ServiceError> {
    for line in lines {
        if !merchants.contains_key(&line.merchant_id) {
            return Err(ServiceError::not_found(format!("merchant {} not found", line.merchant_id)));
        }
        for (item_id, _) in &line.items {
            match items.get(item_id) {
                Some(item) if item.merchant_id == line.merchant_id => {}
                Some(_) => {
                    return Err(ServiceError::not_found(format!(
                        "item {item_id} not found for merchant {}",
                        line.merchant_id
                    )));
                }
                None => return Err(ServiceError::not_found(format!("item {item_id} not found"))),
            }
        }
    }
    Ok(())
}

/// Prices every cart item for `estimate_id`: one line item per (merchant,
/// item, quantity) carrying the resolved unit price, and their total.
fn price_lines(
    estimate_id: Uuid,
    lines: &[ParsedLine],
    items: &HashMap<Uuid, Item>,
) -> Result<(i64, Vec<EstimateLineItem>), ServiceError> {
    let mut total: i64 = 0;
    let mut line_items = Vec::with_capacity(lines.iter().map(|l| l.items.len()).sum());
    for line in lines {
        for (item_id, quantity) in &line.items {
            let item = items
                .get(item_id)
                .ok_or_else(|| ServiceError::Internal(format!("item {item_id} missing after resolution")))?;
            total = item
                .price
                .checked_mul(i64::from(*quantity))
                .and_then(|subtotal| total.checked_add(subtotal))
                .ok_or_else(|| ServiceError::bad_request("total price is out of range"))?;
            line_items.push(EstimateLineItem {
                id: Uuid::new_v4(),
                estimate_id,
                merchant_id: line.merchant_id,
                item_id: *item_id,
                quantity: *quantity,
                unit_price: item.price,
            });
        }
    }
    Ok((total, line_items))
}

/// Whole minutes needed to cover `route_km` at `speed_kmh`, rounded down.
pub(crate) fn eta_minutes(route_km: f64, speed_kmh: f64) -> i64 {
    (route_km * (60.0 / speed_kmh)).floor() as i64
}

async fn write_estimate(
    tx: &mut dyn PurchaseTransaction,
    cancel: &CancellationToken,
    estimate: &Estimate,
    line_items: &[EstimateLineItem],
) -> Result<(), ServiceError> {
    guarded(cancel, tx.insert_estimate(estimate)).await?;
    guarded(cancel, tx.insert_estimate_items(line_items)).await?;
    Ok(())
}

impl<C, P> PurchaseServiceImpl<C, P>
where
    C: CatalogRepository,
    P: PurchaseRepository,
{
    #[instrument(skip(self, cancel, request), fields(user_id = %request.user_id, lines = request.lines.len()))]
    pub(crate) async fn estimate(&self, cancel: &CancellationToken, request: &EstimateRequest) -> Result<EstimateQuote, ServiceError> {
        ensure_active(cancel)?;

        let start = starting_index(&request.lines)?;
        check_shape(&request.lines)?;
        let lines = parse_lines(&request.lines)?;

        let merchant_ids: Vec<Uuid> = lines
            .iter()
            .map(|l| l.merchant_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let item_ids: Vec<Uuid> = lines
            .iter()
            .flat_map(|l| l.items.iter().map(|(id, _)| *id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let merchants: HashMap<Uuid, Merchant> = guarded(cancel, self.catalog.get_merchants_by_ids(&merchant_ids))
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();
        let items: HashMap<Uuid, Item> = guarded(cancel, self.catalog.get_items_by_ids(&item_ids))
            .await?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();
        check_resolved(&lines, &merchants, &items)?;

        // One stop per cart line, in cart order, with the user as destination.
        let mut points: Vec<Coordinate> = lines
            .iter()
            .filter_map(|l| merchants.get(&l.merchant_id).map(|m| m.location))
            .collect();
        let farthest_km = points
            .iter()
            .map(|p| p.distance_to(&request.user_location))
            .fold(0.0_f64, f64::max);
        if farthest_km > self.rules.service_radius_km {
            return Err(ServiceError::bad_request("distance too far"));
        }
        points.push(request.user_location);

        let route_km = route_length_km(start, &points)
            .ok_or_else(|| ServiceError::Internal(format!("starting point {start} is not a route stop")))?;
        let eta = eta_minutes(route_km, self.rules.courier_speed_kmh);

        let estimate = Estimate {
            id: Uuid::new_v4(),
            user_id: request.user_id.clone(),
            created_at: Utc::now(),
        };
        let (total_price, line_items) = price_lines(estimate.id, &lines, &items)?;

        let mut tx = guarded(cancel, self.purchases.begin()).await?;
        let written = write_estimate(tx.as_mut(), cancel, &estimate, &line_items).await;
        finish_transaction(tx, cancel, written).await?;

        info!(
            estimate_id = %estimate.id,
            total_price,
            route_km,
            eta_minutes = eta,
            "Estimate stored"
        );
        Ok(EstimateQuote {
            estimate_id: estimate.id,
            total_price,
            eta_minutes: eta,
        })
    }
}
