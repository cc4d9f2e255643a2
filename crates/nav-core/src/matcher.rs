//! On-route / off-route classification.
//!
//! The geometric matcher is the reference implementation: a radius check
//! against the current step, silent progression onto a later step, and a
//! debounced course-deviation counter. An external map matcher can take its
//! place by feeding status updates through `ExternalMatcher`.

use crate::models::LocationFix;
use crate::progress::RouteProgress;
use crate::rules::TrackingRules;
use crate::spatial;

/// Result of classifying one fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    pub on_route: bool,
    /// Set when the matcher silently moved progress onto a later step.
    pub advanced_to_step: Option<usize>,
}

impl MatchOutcome {
    pub fn on_route() -> Self {
        Self {
            on_route: true,
            advanced_to_step: None,
        }
    }

    pub fn off_route() -> Self {
        Self {
            on_route: false,
            advanced_to_step: None,
        }
    }
}

/// Status reported by an external map-matching engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherStatus {
    /// Actively matched onto the route.
    Tracking,
    /// Matched and the route is finished.
    Complete,
    OffRoute,
    /// The matcher could not produce a usable position.
    Invalid,
    /// The last matcher report is too old to act on.
    Stale,
}

/// Decides whether a fix keeps the user on the current route.
pub trait OnRouteMatcher: Send {
    fn check(
        &mut self,
        fix: &LocationFix,
        progress: &mut RouteProgress,
        rules: &TrackingRules,
    ) -> MatchOutcome;

    /// Called when the tracker advances a step through maneuver completion.
    fn note_step_advanced(&mut self) {}

    /// Called when a reroute replaced the route.
    fn note_route_replaced(&mut self) {}

    /// Feed of external matcher statuses; ignored by matchers that do their
    /// own geometry.
    fn observe_status(&mut self, _status: MatcherStatus) {}
}

/// Geometric classification against the route shape.
#[derive(Debug, Default)]
pub struct GeometricMatcher {
    /// Consecutive fixes whose course disagreed with the route.
    movements_away_from_route: u32,
}

impl GeometricMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distance from the route within which a fix still counts as on-route.
    /// Tightened to half near a maneuver intersection, where leaving the
    /// route is most likely, but never below the maneuver zone itself.
    pub(crate) fn effective_radius(
        fix: &LocationFix,
        progress: &RouteProgress,
        rules: &TrackingRules,
    ) -> f64 {
        let mut tolerance = rules.max_distance_before_recalculating_m;
        let near_intersection = progress
            .leg_progress
            .step_progress
            .intersections_with_upcoming()
            .iter()
            .any(|intersection| {
                spatial::haversine_distance(fix.coordinate, intersection.location)
                    <= rules.maneuver_zone_radius_m
            });
        if near_intersection {
            tolerance /= 2.0;
        }
        tolerance.max(rules.maneuver_zone_radius_m)
    }

    pub(crate) fn is_within_route_radius(
        fix: &LocationFix,
        progress: &RouteProgress,
        rules: &TrackingRules,
    ) -> bool {
        let radius = Self::effective_radius(fix, progress, rules);
        let step = progress.leg_progress.current_step();
        spatial::closest_point_on_polyline(&step.geometry, fix.coordinate)
            .map_or(false, |closest| {
                spatial::haversine_distance(closest.coordinate, fix.coordinate) <= radius
            })
    }

    /// Whether the fix's course could still belong to someone following the
    /// route. Low speed or poor accuracy make the course reading too noisy
    /// to hold against the user, except near the start of a leg where
    /// drivers genuinely point every which way.
    pub(crate) fn course_is_plausible(
        fix: &LocationFix,
        expected_course_deg: f64,
        progress: &RouteProgress,
        rules: &TrackingRules,
    ) -> bool {
        if !fix.has_qualified_course() {
            return true;
        }
        let near_leg_start = progress
            .leg_progress
            .leg()
            .steps
            .first()
            .and_then(|step| step.geometry.first())
            .map_or(false, |first| {
                spatial::haversine_distance(fix.coordinate, *first) < rules.maneuver_zone_radius_m
            });

        let speed_counts = fix.speed_mps >= rules.snapping_min_speed_mps || near_leg_start;
        let accuracy_counts = fix.horizontal_accuracy_m >= 0.0
            && (fix.horizontal_accuracy_m < rules.snapping_min_horizontal_accuracy_m
                || near_leg_start);
        let deviation = spatial::clockwise_difference_deg(
            expected_course_deg,
            spatial::wrap_deg(fix.course_deg, 0.0, 360.0),
        );

        !(speed_counts && accuracy_counts && deviation > rules.snapping_max_course_angle_deg)
    }
}

impl OnRouteMatcher for GeometricMatcher {
    fn check(
        &mut self,
        fix: &LocationFix,
        progress: &mut RouteProgress,
        rules: &TrackingRules,
    ) -> MatchOutcome {
        if Self::is_within_route_radius(fix, progress, rules) {
            return MatchOutcome::on_route();
        }

        // The user may have progressed onto a later step while the tracker
        // still points at an earlier one, e.g. after GPS dropout.
        if let Some(closest) = progress.leg_progress.closest_step(fix.coordinate) {
            if closest.index != progress.leg_progress.step_index()
                && closest.distance_m < rules.user_location_snapping_distance_m
            {
                tracing::debug!(step_index = closest.index, "snapping progress to later step");
                progress.leg_progress.set_step_index(closest.index);
                self.movements_away_from_route = 0;
                return MatchOutcome {
                    on_route: true,
                    advanced_to_step: Some(closest.index),
                };
            }
        }

        let buffer = rules.course_interpolation_buffer_m(fix.speed_mps);
        let nearby = progress.nearby_polyline();
        let Some(expected_course) =
            spatial::interpolated_course_deg(&nearby, fix.coordinate, buffer)
        else {
            return MatchOutcome::on_route();
        };

        let accuracy_scaled = if fix.horizontal_accuracy_m > 0.0 {
            (fix.horizontal_accuracy_m / rules.incorrect_course_multiplier) as u32
        } else {
            0
        };
        let max_updates = rules.min_incorrect_course_updates.max(accuracy_scaled);
        if self.movements_away_from_route >= max_updates {
            tracing::info!(
                updates = self.movements_away_from_route,
                "user is off route, course diverged from the route shape"
            );
            return MatchOutcome::off_route();
        }

        if Self::course_is_plausible(fix, expected_course, progress, rules) {
            self.movements_away_from_route = 0;
        } else {
            self.movements_away_from_route += 1;
        }
        MatchOutcome::on_route()
    }

    fn note_step_advanced(&mut self) {
        self.movements_away_from_route = 0;
    }

    fn note_route_replaced(&mut self) {
        self.movements_away_from_route = 0;
    }
}

/// Classification driven by an external map matcher. Anything short of a
/// definite `OffRoute` keeps the user on route; degraded matcher output must
/// never trigger a reroute on its own.
#[derive(Debug, Default)]
pub struct ExternalMatcher {
    status: Option<MatcherStatus>,
}

impl ExternalMatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OnRouteMatcher for ExternalMatcher {
    fn check(
        &mut self,
        _fix: &LocationFix,
        _progress: &mut RouteProgress,
        _rules: &TrackingRules,
    ) -> MatchOutcome {
        match self.status {
            Some(MatcherStatus::OffRoute) => MatchOutcome::off_route(),
            _ => MatchOutcome::on_route(),
        }
    }

    fn note_route_replaced(&mut self) {
        self.status = None;
    }

    fn observe_status(&mut self, status: MatcherStatus) {
        self.status = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinate, Intersection};
    use crate::spatial::offset_by_bearing;
    use crate::testutil::{fix_at, route_with_turn};
    use std::sync::Arc;

    fn progress() -> RouteProgress {
        RouteProgress::new(Arc::new(route_with_turn()), 0, 0)
    }

    /// A fix 200m east of the midpoint of the first (northbound) step,
    /// heading east: well off the shape, course 90 degrees off.
    fn deviating_fix() -> LocationFix {
        let origin = Coordinate::new(0.0, 0.0);
        let mid = offset_by_bearing(origin, 200.0, 0.0);
        fix_at(offset_by_bearing(mid, 200.0, 90.0), 90.0, 10.0)
    }

    #[test]
    fn off_route_after_debounce_threshold() {
        let rules = TrackingRules::default();
        let mut progress = progress();
        let mut matcher = GeometricMatcher::new();
        let fix = deviating_fix();

        for _ in 0..rules.min_incorrect_course_updates {
            assert!(matcher.check(&fix, &mut progress, &rules).on_route);
        }
        assert!(!matcher.check(&fix, &mut progress, &rules).on_route);
    }

    #[test]
    fn plausible_course_resets_the_counter() {
        let rules = TrackingRules::default();
        let mut progress = progress();
        let mut matcher = GeometricMatcher::new();
        let deviating = deviating_fix();
        // Same spot but pointing up the route
        let aligned = LocationFix {
            course_deg: 5.0,
            ..deviating.clone()
        };

        for _ in 0..3 {
            assert!(matcher.check(&deviating, &mut progress, &rules).on_route);
        }
        assert!(matcher.check(&aligned, &mut progress, &rules).on_route);
        // Counter restarted; another three deviations stay on route
        for _ in 0..4 {
            assert!(matcher.check(&deviating, &mut progress, &rules).on_route);
        }
    }

    #[test]
    fn unqualified_course_never_counts_against_the_user() {
        let rules = TrackingRules::default();
        let mut progress = progress();
        let mut matcher = GeometricMatcher::new();
        let mut fix = deviating_fix();
        fix.course_deg = -1.0;

        for _ in 0..20 {
            assert!(matcher.check(&fix, &mut progress, &rules).on_route);
        }
    }

    #[test]
    fn radius_tightens_near_a_maneuver_intersection() {
        let rules = TrackingRules::default();
        let origin = Coordinate::new(0.0, 0.0);
        let mid = offset_by_bearing(origin, 200.0, 0.0);
        // 45m off the shape: inside the plain 50m tolerance, outside the
        // tightened one
        let fix = fix_at(offset_by_bearing(mid, 45.0, 90.0), 0.0, 10.0);

        let plain = progress();
        assert!(GeometricMatcher::is_within_route_radius(&fix, &plain, &rules));

        let mut route = route_with_turn();
        route.legs[0].steps[0].intersections.insert(
            0,
            Intersection {
                location: offset_by_bearing(mid, 20.0, 90.0),
                road_classes: vec![],
            },
        );
        let near_intersection = RouteProgress::new(Arc::new(route), 0, 0);
        assert!(!GeometricMatcher::is_within_route_radius(
            &fix,
            &near_intersection,
            &rules
        ));
    }

    #[test]
    fn snaps_progress_onto_a_later_step() {
        let rules = TrackingRules::default();
        let mut progress = progress();
        let mut matcher = GeometricMatcher::new();
        let origin = Coordinate::new(0.0, 0.0);
        let corner = offset_by_bearing(origin, 400.0, 0.0);
        // 100m along the second (eastbound) step, 5m off its shape
        let on_second = offset_by_bearing(offset_by_bearing(corner, 100.0, 90.0), 5.0, 0.0);

        let outcome = matcher.check(&fix_at(on_second, 90.0, 10.0), &mut progress, &rules);
        assert!(outcome.on_route);
        assert_eq!(outcome.advanced_to_step, Some(1));
        assert_eq!(progress.leg_progress.step_index(), 1);
    }

    #[test]
    fn external_matcher_follows_status_feed() {
        let rules = TrackingRules::default();
        let mut progress = progress();
        let mut matcher = ExternalMatcher::new();
        let fix = deviating_fix();

        // No data yet: on route
        assert!(matcher.check(&fix, &mut progress, &rules).on_route);
        matcher.observe_status(MatcherStatus::OffRoute);
        assert!(!matcher.check(&fix, &mut progress, &rules).on_route);
        matcher.observe_status(MatcherStatus::Tracking);
        assert!(matcher.check(&fix, &mut progress, &rules).on_route);
        // Degraded data never flips to off-route
        matcher.observe_status(MatcherStatus::Stale);
        assert!(matcher.check(&fix, &mut progress, &rules).on_route);
        matcher.observe_status(MatcherStatus::Invalid);
        assert!(matcher.check(&fix, &mut progress, &rules).on_route);
    }
}
