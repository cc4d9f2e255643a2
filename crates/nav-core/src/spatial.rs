//! Spatial math for polyline snapping, bearings and along-route distances.

use crate::models::Coordinate;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate distance between two points in meters using Haversine formula.
///
/// This is the standard formula for calculating great-circle distance
/// between two points on a sphere given their latitudes and longitudes.
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = (b.lat - a.lat).to_radians();
    let dlambda = (b.lon - a.lon).to_radians();
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

// ==== ENU (East-North-Up) Coordinate Conversion ====
// These functions convert between meters and degrees using latitude-aware scaling.

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// Convert degrees latitude to meters using local scaling.
pub fn lat_to_meters(deg: f64, ref_lat_deg: f64) -> f64 {
    deg * meters_per_deg_lat(ref_lat_deg)
}

/// Convert degrees longitude to meters at a given latitude.
pub fn lon_to_meters(deg: f64, ref_lat_deg: f64) -> f64 {
    deg * meters_per_deg_lon(ref_lat_deg)
}

/// Calculate bearing from one point to another, in degrees clockwise from
/// true north, normalized to `[0, 360)`.
pub fn bearing_deg(from: Coordinate, to: Coordinate) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let delta_lambda = (to.lon - from.lon).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    wrap_deg(x.atan2(y).to_degrees(), 0.0, 360.0)
}

/// Offset a position by distance and bearing (degrees clockwise from north).
pub fn offset_by_bearing(origin: Coordinate, distance_m: f64, bearing_deg: f64) -> Coordinate {
    if distance_m.abs() <= f64::EPSILON {
        return origin;
    }

    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lon.to_radians();
    let bearing_rad = bearing_deg.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let mut lon2 = lon1 + y.atan2(x);
    lon2 =
        (lon2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI;

    Coordinate::new(lat2.to_degrees(), lon2.to_degrees())
}

/// Wrap an angle into the half-open range `[min, max)`.
pub fn wrap_deg(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    (value - min).rem_euclid(span) + min
}

/// Smallest angular difference between two bearings, in `[0, 180]` degrees.
pub fn clockwise_difference_deg(a: f64, b: f64) -> f64 {
    let a_rad = a.to_radians();
    let b_rad = b.to_radians();
    // cos(a - b) collapses both winding directions onto the smaller arc
    (a_rad - b_rad).cos().clamp(-1.0, 1.0).acos().to_degrees()
}

/// Total length of a polyline in meters.
pub fn polyline_length_m(line: &[Coordinate]) -> f64 {
    line.windows(2)
        .map(|pair| haversine_distance(pair[0], pair[1]))
        .sum()
}

/// The nearest point on a polyline to some query coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoint {
    pub coordinate: Coordinate,
    /// Index of the segment the projection falls on.
    pub segment_index: usize,
    /// Perpendicular distance from the query point to the polyline, meters.
    pub distance_m: f64,
    /// Distance from the start of the polyline to the projection, meters.
    pub distance_along_m: f64,
}

/// Project a point onto a polyline.
///
/// Each segment is projected in a local ENU frame anchored at its start;
/// the earliest segment wins ties so projections never jump backwards on
/// self-approaching geometry.
pub fn closest_point_on_polyline(line: &[Coordinate], point: Coordinate) -> Option<ClosestPoint> {
    let first = *line.first()?;
    if line.len() == 1 {
        return Some(ClosestPoint {
            coordinate: first,
            segment_index: 0,
            distance_m: haversine_distance(first, point),
            distance_along_m: 0.0,
        });
    }

    let mut best: Option<ClosestPoint> = None;
    let mut traversed = 0.0;

    for (i, pair) in line.windows(2).enumerate() {
        let (start, end) = (pair[0], pair[1]);
        let ref_lat = start.lat;

        let px = lon_to_meters(point.lon - start.lon, ref_lat);
        let py = lat_to_meters(point.lat - start.lat, ref_lat);
        let sx = lon_to_meters(end.lon - start.lon, ref_lat);
        let sy = lat_to_meters(end.lat - start.lat, ref_lat);

        let seg_len_sq = sx * sx + sy * sy;
        let segment_length = haversine_distance(start, end);

        let (t, dist) = if seg_len_sq < 0.0001 {
            (0.0, (px * px + py * py).sqrt())
        } else {
            let t = ((px * sx + py * sy) / seg_len_sq).clamp(0.0, 1.0);
            let dx = px - t * sx;
            let dy = py - t * sy;
            (t, (dx * dx + dy * dy).sqrt())
        };

        if best.map_or(true, |b| dist < b.distance_m) {
            best = Some(ClosestPoint {
                coordinate: Coordinate::new(
                    start.lat + (end.lat - start.lat) * t,
                    start.lon + (end.lon - start.lon) * t,
                ),
                segment_index: i,
                distance_m: dist,
                distance_along_m: traversed + segment_length * t,
            });
        }

        traversed += segment_length;
    }

    best
}

/// Coordinate a given distance from the start of a polyline, clamped to its
/// endpoints.
pub fn coordinate_at_distance(line: &[Coordinate], distance_m: f64) -> Option<Coordinate> {
    let first = *line.first()?;
    if distance_m <= 0.0 || line.len() == 1 {
        return Some(first);
    }

    let mut remaining = distance_m;
    for pair in line.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let segment_length = haversine_distance(start, end);
        if remaining <= segment_length && segment_length > 0.0 {
            let t = remaining / segment_length;
            return Some(Coordinate::new(
                start.lat + (end.lat - start.lat) * t,
                start.lon + (end.lon - start.lon) * t,
            ));
        }
        remaining -= segment_length;
    }

    line.last().copied()
}

/// Distance from the start of a polyline to the projection of a point.
pub fn distance_along_polyline(line: &[Coordinate], point: Coordinate) -> Option<f64> {
    closest_point_on_polyline(line, point).map(|c| c.distance_along_m)
}

/// Along-line distance between the projections of two points. Zero when `b`
/// projects behind `a`.
pub fn along_line_distance(line: &[Coordinate], a: Coordinate, b: Coordinate) -> Option<f64> {
    let from = distance_along_polyline(line, a)?;
    let to = distance_along_polyline(line, b)?;
    Some((to - from).max(0.0))
}

/// Expected travel direction at the projection of a point onto a polyline.
///
/// Samples the line `buffer_m` behind and ahead of the projection and takes
/// the bearing between the samples, which averages out the kink at a vertex.
/// Returns `None` for degenerate geometry.
pub fn interpolated_course_deg(
    line: &[Coordinate],
    point: Coordinate,
    buffer_m: f64,
) -> Option<f64> {
    if line.len() < 2 {
        return None;
    }
    let total = polyline_length_m(line);
    if total <= f64::EPSILON {
        return None;
    }

    let closest = closest_point_on_polyline(line, point)?;
    let behind = coordinate_at_distance(line, (closest.distance_along_m - buffer_m).max(0.0))?;
    let ahead = coordinate_at_distance(line, (closest.distance_along_m + buffer_m).min(total))?;
    if haversine_distance(behind, ahead) <= f64::EPSILON {
        return None;
    }

    Some(bearing_deg(behind, ahead))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // ~111km between these points (1 degree latitude)
        let dist = haversine_distance(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0));
        assert!((dist - 111_194.0).abs() < 100.0);
    }

    #[test]
    fn test_haversine_same_point() {
        let p = Coordinate::new(33.6846, -117.8265);
        assert!(haversine_distance(p, p) < 0.001);
    }

    #[test]
    fn bearing_cardinal_directions() {
        let origin = Coordinate::new(0.0, 0.0);
        let north = offset_by_bearing(origin, 1000.0, 0.0);
        let east = offset_by_bearing(origin, 1000.0, 90.0);

        assert!(bearing_deg(origin, north) < 0.5 || bearing_deg(origin, north) > 359.5);
        assert!((bearing_deg(origin, east) - 90.0).abs() < 0.5);
    }

    #[test]
    fn offset_round_trips_through_haversine() {
        let origin = Coordinate::new(37.77, -122.42);
        let moved = offset_by_bearing(origin, 500.0, 45.0);
        assert!((haversine_distance(origin, moved) - 500.0).abs() < 0.5);
    }

    #[test]
    fn clockwise_difference_crosses_north() {
        assert!((clockwise_difference_deg(350.0, 10.0) - 20.0).abs() < 1e-6);
        assert!((clockwise_difference_deg(90.0, 270.0) - 180.0).abs() < 1e-6);
        assert!(clockwise_difference_deg(45.0, 45.0) < 1e-6);
    }

    #[test]
    fn wrap_into_range() {
        assert!((wrap_deg(370.0, 0.0, 360.0) - 10.0).abs() < 1e-9);
        assert!((wrap_deg(-90.0, 0.0, 360.0) - 270.0).abs() < 1e-9);
        assert!((wrap_deg(190.0, -180.0, 180.0) - -170.0).abs() < 1e-9);
    }

    #[test]
    fn closest_point_projects_onto_segment_interior() {
        let origin = Coordinate::new(0.0, 0.0);
        let line = vec![origin, offset_by_bearing(origin, 1000.0, 0.0)];
        // 400m up the line, 30m east of it
        let query = offset_by_bearing(offset_by_bearing(origin, 400.0, 0.0), 30.0, 90.0);

        let closest = closest_point_on_polyline(&line, query).unwrap();
        assert_eq!(closest.segment_index, 0);
        assert!((closest.distance_m - 30.0).abs() < 1.0);
        assert!((closest.distance_along_m - 400.0).abs() < 1.0);
    }

    #[test]
    fn closest_point_prefers_earliest_segment_on_tie() {
        let origin = Coordinate::new(0.0, 0.0);
        let turn = offset_by_bearing(origin, 200.0, 0.0);
        // Doubles back over itself
        let line = vec![origin, turn, origin];
        let query = offset_by_bearing(origin, 100.0, 0.0);

        let closest = closest_point_on_polyline(&line, query).unwrap();
        assert_eq!(closest.segment_index, 0);
        assert!((closest.distance_along_m - 100.0).abs() < 1.0);
    }

    #[test]
    fn coordinate_at_distance_walks_segments() {
        let origin = Coordinate::new(0.0, 0.0);
        let mid = offset_by_bearing(origin, 100.0, 0.0);
        let end = offset_by_bearing(mid, 100.0, 90.0);
        let line = vec![origin, mid, end];

        let at_150 = coordinate_at_distance(&line, 150.0).unwrap();
        let expected = offset_by_bearing(mid, 50.0, 90.0);
        assert!(haversine_distance(at_150, expected) < 1.0);

        // Clamps past the end
        let past = coordinate_at_distance(&line, 10_000.0).unwrap();
        assert!(haversine_distance(past, end) < 0.001);
    }

    #[test]
    fn interpolated_course_follows_straight_line() {
        let origin = Coordinate::new(0.0, 0.0);
        let line = vec![origin, offset_by_bearing(origin, 1000.0, 0.0)];
        let query = offset_by_bearing(offset_by_bearing(origin, 500.0, 0.0), 10.0, 90.0);

        let course = interpolated_course_deg(&line, query, 7.5).unwrap();
        assert!(course < 0.5 || course > 359.5, "course was {course}");
    }

    #[test]
    fn interpolated_course_averages_around_a_turn() {
        let origin = Coordinate::new(0.0, 0.0);
        let corner = offset_by_bearing(origin, 200.0, 0.0);
        let end = offset_by_bearing(corner, 200.0, 90.0);
        let line = vec![origin, corner, end];

        let course = interpolated_course_deg(&line, corner, 20.0).unwrap();
        assert!((course - 45.0).abs() < 2.0, "course was {course}");
    }
}
