//! Geometric fixtures shared by the unit tests. Routes are built with the
//! spatial helpers so expected distances stay consistent with the haversine
//! math used by the tracker.

use chrono::{DateTime, TimeZone, Utc};

use crate::models::{
    Coordinate, Intersection, LocationFix, ManeuverType, Route, RouteLeg, RouteStep,
    SpokenInstruction, VisualInstruction,
};
use crate::spatial::offset_by_bearing;

pub(crate) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// A qualified fix (5m accuracy) at a coordinate.
pub(crate) fn fix_at(coordinate: Coordinate, course_deg: f64, speed_mps: f64) -> LocationFix {
    LocationFix {
        coordinate,
        altitude_m: 0.0,
        course_deg,
        speed_mps,
        horizontal_accuracy_m: 5.0,
        vertical_accuracy_m: 5.0,
        timestamp: base_time(),
    }
}

/// Origin, the right-turn corner 400m north of it, and the point 200m east
/// of the corner.
pub(crate) fn turn_route_points() -> (Coordinate, Coordinate, Coordinate) {
    let origin = Coordinate::new(0.0, 0.0);
    let corner = offset_by_bearing(origin, 400.0, 0.0);
    let end = offset_by_bearing(corner, 200.0, 90.0);
    (origin, corner, end)
}

fn step(
    geometry: Vec<Coordinate>,
    distance_m: f64,
    expected_travel_time_s: f64,
    maneuver_type: ManeuverType,
    headings: (Option<f64>, Option<f64>),
    instruction: &str,
) -> RouteStep {
    let maneuver_location = geometry[0];
    RouteStep {
        geometry,
        distance_m,
        expected_travel_time_s,
        maneuver_type,
        maneuver_location,
        initial_heading_deg: headings.0,
        final_heading_deg: headings.1,
        instruction: instruction.to_string(),
        intersections: vec![Intersection {
            location: maneuver_location,
            road_classes: vec![],
        }],
        spoken_instructions: vec![],
        visual_instructions: vec![],
    }
}

fn leg(steps: Vec<RouteStep>, destination_name: Option<&str>) -> RouteLeg {
    let distance_m = steps.iter().map(|s| s.distance_m).sum();
    let expected_travel_time_s = steps.iter().map(|s| s.expected_travel_time_s).sum();
    RouteLeg {
        steps,
        distance_m,
        expected_travel_time_s,
        destination_name: destination_name.map(String::from),
        segment_congestion_levels: None,
        expected_segment_travel_times: None,
    }
}

fn route(legs: Vec<RouteLeg>) -> Route {
    let distance_m = legs.iter().map(|l| l.distance_m).sum();
    let expected_travel_time_s = legs.iter().map(|l| l.expected_travel_time_s).sum();
    Route {
        legs,
        distance_m,
        expected_travel_time_s,
    }
}

/// 400m north, then a right turn and 200m east. One leg, two steps.
pub(crate) fn route_with_turn() -> Route {
    let (origin, corner, end) = turn_route_points();
    route(vec![leg(
        vec![
            step(
                vec![origin, corner],
                400.0,
                40.0,
                ManeuverType::Depart,
                (None, Some(0.0)),
                "Head north",
            ),
            step(
                vec![corner, end],
                200.0,
                20.0,
                ManeuverType::Turn,
                (Some(0.0), Some(90.0)),
                "Turn right",
            ),
        ],
        None,
    )])
}

/// The turn route extended with a 100m arrive step carrying arrival
/// instructions.
pub(crate) fn arrival_route() -> Route {
    let (origin, corner, end) = turn_route_points();
    let destination = offset_by_bearing(end, 100.0, 90.0);
    let mut arrive = step(
        vec![end, destination],
        100.0,
        10.0,
        ManeuverType::Arrive,
        (Some(90.0), Some(90.0)),
        "You have arrived",
    );
    arrive.spoken_instructions = vec![SpokenInstruction {
        distance_along_step_m: 20.0,
        text: "You have arrived at your destination".into(),
    }];
    arrive.visual_instructions = vec![VisualInstruction {
        distance_along_step_m: 100.0,
        primary_text: "Destination".into(),
        secondary_text: None,
    }];

    route(vec![leg(
        vec![
            step(
                vec![origin, corner],
                400.0,
                40.0,
                ManeuverType::Depart,
                (None, Some(0.0)),
                "Head north",
            ),
            step(
                vec![corner, end],
                200.0,
                20.0,
                ManeuverType::Turn,
                (Some(0.0), Some(90.0)),
                "Turn right",
            ),
            arrive,
        ],
        Some("Destination"),
    )])
}

/// Long enough for proactive faster-route checks: 10km north then 1km east.
pub(crate) fn long_route() -> Route {
    let origin = Coordinate::new(0.0, 0.0);
    let corner = offset_by_bearing(origin, 10_000.0, 0.0);
    let end = offset_by_bearing(corner, 1_000.0, 90.0);
    route(vec![leg(
        vec![
            step(
                vec![origin, corner],
                10_000.0,
                1_000.0,
                ManeuverType::Depart,
                (None, Some(0.0)),
                "Head north",
            ),
            step(
                vec![corner, end],
                1_000.0,
                100.0,
                ManeuverType::Turn,
                (Some(0.0), Some(90.0)),
                "Turn right",
            ),
        ],
        None,
    )])
}

/// Two legs separated by a via waypoint, each a straight northbound step
/// followed by a short arrive step.
pub(crate) fn two_leg_route() -> Route {
    let origin = Coordinate::new(0.0, 0.0);
    let via = offset_by_bearing(origin, 500.0, 0.0);
    let via_stop = offset_by_bearing(via, 50.0, 0.0);
    let end = offset_by_bearing(via_stop, 500.0, 0.0);
    let end_stop = offset_by_bearing(end, 50.0, 0.0);

    let first = vec![
        step(
            vec![origin, via],
            500.0,
            50.0,
            ManeuverType::Depart,
            (None, Some(0.0)),
            "Head north",
        ),
        step(
            vec![via, via_stop],
            50.0,
            5.0,
            ManeuverType::Arrive,
            (Some(0.0), Some(0.0)),
            "Arrive at the stop",
        ),
    ];
    let second = vec![
        step(
            vec![via_stop, end],
            500.0,
            50.0,
            ManeuverType::Depart,
            (None, Some(0.0)),
            "Continue north",
        ),
        step(
            vec![end, end_stop],
            50.0,
            5.0,
            ManeuverType::Arrive,
            (Some(0.0), Some(0.0)),
            "Arrive at your destination",
        ),
    ];

    route(vec![
        leg(first, Some("Stop")),
        leg(second, Some("Destination")),
    ])
}
