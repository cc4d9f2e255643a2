//! Thresholds and tunables for route tracking.

use serde::{Deserialize, Serialize};

/// Configuration for the tracking state machine.
///
/// The defaults are tuned for vehicular navigation with consumer-grade GPS;
/// every threshold can be overridden for testing or other travel profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingRules {
    /// Distance from the route at which a reroute is considered, and the
    /// minimum travel between consecutive reroute requests (meters).
    pub max_distance_before_recalculating_m: f64,
    /// Distance within which a fix is snapped onto the route shape (meters).
    pub user_location_snapping_distance_m: f64,
    /// Radius around a maneuver inside which step completion is evaluated
    /// and the reroute tolerance is tightened (meters).
    pub maneuver_zone_radius_m: f64,
    /// Max course deviation counted as having completed a turn (degrees).
    pub max_turn_completion_offset_deg: f64,
    /// Horizon used when sizing the course interpolation buffer (seconds).
    pub dead_reckoning_interval_s: f64,
    /// Consecutive implausible-course fixes before going off-route.
    pub min_incorrect_course_updates: u32,
    /// Divisor applied to horizontal accuracy when scaling the off-route
    /// debounce threshold.
    pub incorrect_course_multiplier: f64,
    /// Max deviation between fix course and route course for snapping (degrees).
    pub snapping_max_course_angle_deg: f64,
    /// Below this speed the course reading is too noisy to hold against the
    /// user (m/s).
    pub snapping_min_speed_mps: f64,
    /// Above this accuracy value the course reading is too noisy to hold
    /// against the user (meters).
    pub snapping_min_horizontal_accuracy_m: f64,
    /// Upper bound of horizontal accuracy for a fix to qualify (meters).
    pub max_qualified_horizontal_accuracy_m: f64,
    /// Leg duration remaining at which arrival latches (seconds).
    pub waypoint_arrival_threshold_s: f64,
    /// Minimum spacing between proactive faster-route checks (seconds).
    pub proactive_reroute_interval_s: f64,
    /// Route duration remaining below which proactive checks stop (seconds).
    pub min_duration_for_proactive_reroute_s: f64,
    /// A candidate faster route must keep the user on its first step at
    /// least this long (seconds).
    pub min_faster_route_buffer_s: f64,
    /// Minimum speed for tunnel entrance detection from a qualified fix (m/s).
    pub min_tunnel_entrance_speed_mps: f64,
    /// Distance to a tunnel intersection at which entrance is assumed (meters).
    pub tunnel_entrance_radius_m: f64,
    /// Qualified fixes outside a tunnel before the exit is confirmed.
    pub tunnel_exit_fix_count: u32,
}

impl Default for TrackingRules {
    fn default() -> Self {
        Self {
            max_distance_before_recalculating_m: 50.0,
            user_location_snapping_distance_m: 15.0,
            maneuver_zone_radius_m: 40.0,
            max_turn_completion_offset_deg: 30.0,
            dead_reckoning_interval_s: 1.0,
            min_incorrect_course_updates: 4,
            incorrect_course_multiplier: 4.0,
            snapping_max_course_angle_deg: 45.0,
            snapping_min_speed_mps: 3.0,
            snapping_min_horizontal_accuracy_m: 20.0,
            max_qualified_horizontal_accuracy_m: 100.0,
            waypoint_arrival_threshold_s: 5.0,
            proactive_reroute_interval_s: 120.0,
            min_duration_for_proactive_reroute_s: 600.0,
            min_faster_route_buffer_s: 70.0,
            min_tunnel_entrance_speed_mps: 5.0,
            tunnel_entrance_radius_m: 15.0,
            tunnel_exit_fix_count: 3,
        }
    }
}

impl TrackingRules {
    /// Buffer used when interpolating the expected course around a fix.
    pub fn course_interpolation_buffer_m(&self, speed_mps: f64) -> f64 {
        (speed_mps.max(0.0) * self.dead_reckoning_interval_s / 2.0)
            .max(self.user_location_snapping_distance_m / 2.0)
    }
}
