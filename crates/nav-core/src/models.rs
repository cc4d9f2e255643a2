//! Route and location data models.
//!
//! A `Route` is immutable once constructed: legs contain steps, steps carry
//! polyline geometry, a maneuver, intersections and instruction lists.
//! `LocationFix` mirrors the raw sensor convention where negative course,
//! speed or accuracy values mean the reading is invalid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A single GPS fix as delivered by a location provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationFix {
    pub coordinate: Coordinate,
    #[serde(default)]
    pub altitude_m: f64,
    /// Course over ground in degrees clockwise from true north.
    #[serde(default = "invalid_reading")]
    pub course_deg: f64,
    /// Ground speed in meters per second.
    #[serde(default = "invalid_reading")]
    pub speed_mps: f64,
    #[serde(default = "invalid_reading")]
    pub horizontal_accuracy_m: f64,
    #[serde(default = "invalid_reading")]
    pub vertical_accuracy_m: f64,
    pub timestamp: DateTime<Utc>,
}

fn invalid_reading() -> f64 {
    -1.0
}

impl LocationFix {
    /// Whether the fix is accurate enough to drive navigation decisions.
    pub fn is_qualified(&self) -> bool {
        (0.0..=100.0).contains(&self.horizontal_accuracy_m)
    }

    pub fn has_qualified_course(&self) -> bool {
        self.course_deg >= 0.0
    }

    /// Copy of this fix with a different coordinate and course, keeping the
    /// sensor metadata. Used when idealizing a fix onto the route shape.
    pub fn with_position(&self, coordinate: Coordinate, course_deg: f64) -> Self {
        Self {
            coordinate,
            course_deg,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManeuverType {
    Depart,
    Turn,
    Merge,
    Continue,
    Arrive,
}

/// An instruction to be spoken at some distance before a step's maneuver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpokenInstruction {
    /// Distance to the maneuver at or below which the instruction fires.
    pub distance_along_step_m: f64,
    pub text: String,
}

/// A banner instruction displayed at some distance before a step's maneuver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualInstruction {
    pub distance_along_step_m: f64,
    pub primary_text: String,
    #[serde(default)]
    pub secondary_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intersection {
    pub location: Coordinate,
    /// Road classes of the segment leaving this intersection, e.g. "motorway"
    /// or "tunnel".
    #[serde(default)]
    pub road_classes: Vec<String>,
}

impl Intersection {
    pub fn is_tunnel(&self) -> bool {
        self.road_classes
            .iter()
            .any(|class| class.to_ascii_lowercase().contains("tunnel"))
    }
}

/// One step of a leg: a stretch of road ending at (conceptually, starting
/// with) a maneuver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    /// Polyline from this step's maneuver to the next step's maneuver.
    pub geometry: Vec<Coordinate>,
    pub distance_m: f64,
    pub expected_travel_time_s: f64,
    pub maneuver_type: ManeuverType,
    /// Where this step's maneuver occurs, at the start of the step.
    pub maneuver_location: Coordinate,
    /// Bearing entering the maneuver, degrees clockwise from north.
    #[serde(default)]
    pub initial_heading_deg: Option<f64>,
    /// Bearing leaving the maneuver.
    #[serde(default)]
    pub final_heading_deg: Option<f64>,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub intersections: Vec<Intersection>,
    #[serde(default)]
    pub spoken_instructions: Vec<SpokenInstruction>,
    #[serde(default)]
    pub visual_instructions: Vec<VisualInstruction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionLevel {
    Unknown,
    Low,
    Moderate,
    Heavy,
    Severe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub steps: Vec<RouteStep>,
    pub distance_m: f64,
    pub expected_travel_time_s: f64,
    #[serde(default)]
    pub destination_name: Option<String>,
    /// Congestion level per geometry segment of the whole leg, when the
    /// routing backend annotated it.
    #[serde(default)]
    pub segment_congestion_levels: Option<Vec<CongestionLevel>>,
    /// Expected travel time per geometry segment of the whole leg.
    #[serde(default)]
    pub expected_segment_travel_times: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub legs: Vec<RouteLeg>,
    pub distance_m: f64,
    pub expected_travel_time_s: f64,
}
