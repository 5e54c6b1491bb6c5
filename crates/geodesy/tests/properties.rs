//! Property-based tests for distance and route invariants.

use geodesy::{Coordinate, haversine_km, route_length_km};
use proptest::prelude::*;

fn coordinate() -> impl Strategy<Value = Coordinate> {
    (-89.0..89.0f64, -179.0..179.0f64).prop_map(|(lat, long)| Coordinate::new(lat, long))
}

/// Points inside a small delivery area, where routes are realistic.
fn local_coordinate() -> impl Strategy<Value = Coordinate> {
    (-6.25..-6.15f64, 106.75..106.85f64).prop_map(|(lat, long)| Coordinate::new(lat, long))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn distance_to_self_is_zero(a in coordinate()) {
        prop_assert!(haversine_km(a, a).abs() < 1e-9);
    }

    #[test]
    fn distance_is_symmetric(a in coordinate(), b in coordinate()) {
        prop_assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
    }

    #[test]
    fn distance_obeys_triangle_inequality(a in coordinate(), b in coordinate(), c in coordinate()) {
        let direct = haversine_km(a, c);
        let detour = haversine_km(a, b) + haversine_km(b, c);
        prop_assert!(direct <= detour + 1e-6, "direct {direct} > detour {detour}");
    }

    #[test]
    fn route_is_at_least_the_direct_leg(
        stops in prop::collection::vec(local_coordinate(), 1..8),
        user in local_coordinate(),
        start_seed in any::<usize>(),
    ) {
        let start = start_seed % stops.len();
        let direct = haversine_km(stops[start], user);
        let mut points = stops.clone();
        points.push(user);

        let route = route_length_km(start, &points).unwrap();
        prop_assert!(route + 1e-9 >= direct, "route {route} shorter than direct leg {direct}");
    }

    #[test]
    fn route_with_one_stop_equals_direct_leg(stop in local_coordinate(), user in local_coordinate()) {
        let route = route_length_km(0, &[stop, user]).unwrap();
        prop_assert_eq!(route, haversine_km(stop, user));
    }
}
