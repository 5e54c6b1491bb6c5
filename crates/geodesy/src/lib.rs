//! Great-circle geometry used for merchant discovery and delivery routing.
//!
//! All coordinates are expressed as [`Coordinate`] values in degrees, always in
//! (latitude, longitude) order. Distances are kilometres on a sphere with a
//! fixed radius of [`EARTH_RADIUS_KM`]; there is no road network involved.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by every distance computation.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point on the globe, latitude first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub long: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, long: f64) -> Self {
        Self { lat, long }
    }

    /// Returns `true` when latitude is within [-90, 90] and longitude within [-180, 180].
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.long)
    }

    /// Great-circle distance to `other`, in kilometres.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_km(*self, *other)
    }
}

/// Haversine distance between two coordinates, in kilometres.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_long = (b.long - a.long).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let sin_d_lat = (d_lat / 2.0).sin();
    let sin_d_long = (d_long / 2.0).sin();

    let h = sin_d_lat * sin_d_lat + lat1.cos() * lat2.cos() * sin_d_long * sin_d_long;
    // Rounding can push h a hair above 1 for antipodal points.
    2.0 * EARTH_RADIUS_KM * h.min(1.0).sqrt().asin()
}

/// Approximate length of a single-vehicle delivery path, in kilometres.
///
/// The last element of `points` is the destination and is never visited
/// early. The path starts at `points[start]` and greedily moves to the nearest
/// unvisited stop until every stop has been visited, then adds the final leg
/// to the destination. It is an open path: the start is not revisited.
///
/// When two candidate stops are at exactly the same distance, the one with the
/// lower index in `points` is taken.
///
/// Returns `Some(0.0)` for fewer than two points and `None` when `start` does
/// not index one of the stops.
pub fn route_length_km(start: usize, points: &[Coordinate]) -> Option<f64> {
    let n = points.len();
    if n < 2 {
        return Some(0.0);
    }
    let stops = n - 1;
    if start >= stops {
        return None;
    }
    let destination = points[stops];

    let mut visited = vec![false; stops];
    let mut current = start;
    let mut total = 0.0;

    for _ in 0..stops - 1 {
        visited[current] = true;

        let mut nearest: Option<(usize, f64)> = None;
        for (j, point) in points.iter().take(stops).enumerate() {
            if visited[j] {
                continue;
            }
            let dist = haversine_km(points[current], *point);
            match nearest {
                Some((_, best)) if dist >= best => {}
                _ => nearest = Some((j, dist)),
            }
        }

        let Some((next, dist)) = nearest else { break };
        total += dist;
        current = next;
    }

    Some(total + haversine_km(points[current], destination))
}
