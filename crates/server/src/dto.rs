//! JSON shapes of the public HTTP API and their translation into service inputs.

use model::{CartLine, Coordinate, EstimateRequest, MerchantWithItems, NearbyFilter, NearbyPage, OrderHistoryFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ApiError;

/// Query string shared by the nearby and order history listings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub merchant_id: Option<String>,
    pub name: Option<String>,
    pub merchant_category: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn into_nearby(self, user_location: Coordinate) -> NearbyFilter {
        NearbyFilter {
            user_location,
            merchant_id: self.merchant_id,
            category: self.merchant_category,
            name: self.name,
            limit: self.limit,
            offset: self.offset,
        }
    }

    pub fn into_history(self) -> OrderHistoryFilter {
        OrderHistoryFilter {
            merchant_id: self.merchant_id,
            category: self.merchant_category,
            name: self.name,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// Parses the `{lat},{long}` path segment of the nearby route.
pub fn parse_coordinates(raw: &str) -> Result<Coordinate, ApiError> {
    let invalid = || ApiError::BadRequest(format!("invalid coordinates '{raw}', expected 'lat,long'"));
    let (lat, long) = raw.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let long: f64 = long.trim().parse().map_err(|_| invalid())?;
    checked_location(Coordinate::new(lat, long))
}

fn checked_location(location: Coordinate) -> Result<Coordinate, ApiError> {
    if location.is_valid() {
        Ok(location)
    } else {
        Err(ApiError::BadRequest(format!(
            "coordinates out of range: lat {} long {}",
            location.lat, location.long
        )))
    }
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub limit: usize,
    pub offset: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct NearbyResponse {
    pub data: Vec<MerchantWithItems>,
    pub meta: PageMeta,
}

impl From<NearbyPage> for NearbyResponse {
    fn from(page: NearbyPage) -> Self {
        Self {
            data: page.merchants,
            meta: PageMeta {
                limit: page.page.limit,
                offset: page.page.offset,
                total: page.total,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateBody {
    pub user_location: Coordinate,
    pub orders: Vec<CartLine>,
}

impl EstimateBody {
    pub fn into_request(self, user_id: String) -> Result<EstimateRequest, ApiError> {
        let user_location = checked_location(self.user_location)?;
        if self.orders.is_empty() {
            return Err(ApiError::BadRequest("orders must not be empty".to_string()));
        }
        Ok(EstimateRequest {
            user_id,
            user_location,
            lines: self.orders,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderBody {
    #[serde(rename = "calculatedEstimateId")]
    pub estimate_id: String,
}

#[derive(Debug, Serialize)]
pub struct OrderCreated {
    #[serde(rename = "orderId")]
    pub order_id: Uuid,
}
