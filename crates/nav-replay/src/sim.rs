//! Simulated drives along a route's geometry.

use chrono::{DateTime, Duration, Utc};
use nav_core::models::{Coordinate, LocationFix, Route};
use nav_core::spatial;
use rand::Rng;

/// Concatenated shape of every step of every leg, with the shared vertex
/// between adjacent steps deduplicated.
pub fn full_geometry(route: &Route) -> Vec<Coordinate> {
    let mut shape: Vec<Coordinate> = Vec::new();
    for leg in &route.legs {
        for step in &leg.steps {
            for coordinate in &step.geometry {
                if shape.last() != Some(coordinate) {
                    shape.push(*coordinate);
                }
            }
        }
    }
    shape
}

/// Generate fixes along the route at a constant speed, one per interval,
/// with optional position jitter. The course follows the local shape.
pub fn simulate_drive(
    route: &Route,
    speed_mps: f64,
    interval_s: f64,
    noise_m: f64,
    start: DateTime<Utc>,
) -> Vec<LocationFix> {
    let shape = full_geometry(route);
    let total = spatial::polyline_length_m(&shape);
    let spacing = (speed_mps * interval_s).max(1.0);
    let mut rng = rand::thread_rng();

    let mut fixes = Vec::new();
    let mut traveled = 0.0;
    let mut tick = 0i64;
    while traveled <= total {
        let Some(position) = spatial::coordinate_at_distance(&shape, traveled) else {
            break;
        };
        let course = spatial::interpolated_course_deg(&shape, position, spacing / 2.0)
            .unwrap_or(0.0);
        let coordinate = if noise_m > 0.0 {
            spatial::offset_by_bearing(
                position,
                rng.gen_range(0.0..noise_m),
                rng.gen_range(0.0..360.0),
            )
        } else {
            position
        };

        fixes.push(LocationFix {
            coordinate,
            altitude_m: 0.0,
            course_deg: course,
            speed_mps,
            horizontal_accuracy_m: 5.0,
            vertical_accuracy_m: 5.0,
            timestamp: start + Duration::milliseconds((tick as f64 * interval_s * 1000.0) as i64),
        });

        traveled += spacing;
        tick += 1;
    }
    fixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use nav_core::models::{ManeuverType, RouteLeg, RouteStep};
    use nav_core::spatial::offset_by_bearing;

    fn straight_route() -> Route {
        let origin = Coordinate::new(0.0, 0.0);
        let end = offset_by_bearing(origin, 300.0, 0.0);
        let step = RouteStep {
            geometry: vec![origin, end],
            distance_m: 300.0,
            expected_travel_time_s: 30.0,
            maneuver_type: ManeuverType::Depart,
            maneuver_location: origin,
            initial_heading_deg: None,
            final_heading_deg: Some(0.0),
            instruction: "Head north".into(),
            intersections: vec![],
            spoken_instructions: vec![],
            visual_instructions: vec![],
        };
        Route {
            legs: vec![RouteLeg {
                steps: vec![step],
                distance_m: 300.0,
                expected_travel_time_s: 30.0,
                destination_name: None,
                segment_congestion_levels: None,
                expected_segment_travel_times: None,
            }],
            distance_m: 300.0,
            expected_travel_time_s: 30.0,
        }
    }

    #[test]
    fn fixes_span_the_route_at_the_requested_spacing() {
        let route = straight_route();
        let fixes = simulate_drive(&route, 10.0, 1.0, 0.0, Utc::now());

        // 300m at 10m per tick, endpoints included
        assert_eq!(fixes.len(), 31);
        let first = fixes.first().unwrap();
        let last = fixes.last().unwrap();
        assert!(spatial::haversine_distance(
            first.coordinate,
            Coordinate::new(0.0, 0.0)
        ) < 0.1);
        assert!(
            spatial::haversine_distance(last.coordinate, offset_by_bearing(first.coordinate, 300.0, 0.0))
                < 1.0
        );
        // Northbound course throughout
        assert!(fixes
            .iter()
            .all(|fix| fix.course_deg < 1.0 || fix.course_deg > 359.0));
    }

    #[test]
    fn timestamps_step_by_the_interval() {
        let start = Utc::now();
        let fixes = simulate_drive(&straight_route(), 10.0, 2.0, 0.0, start);
        assert_eq!(fixes[0].timestamp, start);
        assert_eq!(fixes[1].timestamp, start + Duration::seconds(2));
    }

    #[test]
    fn noise_stays_within_the_requested_radius() {
        let clean = simulate_drive(&straight_route(), 10.0, 1.0, 0.0, Utc::now());
        let noisy = simulate_drive(&straight_route(), 10.0, 1.0, 8.0, Utc::now());
        for (a, b) in clean.iter().zip(noisy.iter()) {
            assert!(spatial::haversine_distance(a.coordinate, b.coordinate) < 8.5);
        }
    }
}
