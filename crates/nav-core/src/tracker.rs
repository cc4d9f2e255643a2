//! The per-fix update pipeline tying progress, classification, rerouting
//! and tunnel detection together.

use std::sync::Arc;

use crate::events::ProgressEvent;
use crate::matcher::{GeometricMatcher, MatcherStatus, OnRouteMatcher};
use crate::models::{LocationFix, Route};
use crate::progress::RouteProgress;
use crate::reroute::{RerouteCoordinator, RerouteError, RerouteReason, RerouteRequest};
use crate::rules::TrackingRules;
use crate::spatial;
use crate::tunnel::{TunnelDetector, TunnelState};

/// Snapped distance at which a near-straight maneuver counts as completed.
const STRAIGHT_COMPLETION_EPSILON_M: f64 = 0.001;

/// Consumer hooks vetoing tracker decisions. Everything defaults to
/// allowing the behavior.
pub struct TrackerPolicies {
    /// Whether an off-route classification may request a reroute.
    pub should_reroute: Box<dyn Fn(&LocationFix) -> bool + Send>,
    /// Whether a batch with no qualified fix should be dropped.
    pub should_discard_location: Box<dyn Fn(&LocationFix) -> bool + Send>,
    /// Whether arrival at the given leg suppresses rerouting afterwards.
    pub prevent_reroutes_on_arrival: Box<dyn Fn(usize) -> bool + Send>,
    /// Whether arrival at the given (non-final) leg moves on to the next.
    pub should_advance_leg_on_arrival: Box<dyn Fn(usize) -> bool + Send>,
}

impl Default for TrackerPolicies {
    fn default() -> Self {
        Self {
            should_reroute: Box::new(|_| true),
            should_discard_location: Box::new(|_| true),
            prevent_reroutes_on_arrival: Box::new(|_| true),
            should_advance_leg_on_arrival: Box::new(|_| true),
        }
    }
}

/// Tracks a user's progress along a route, one batch of fixes at a time.
///
/// The tracker is synchronous and runtime-agnostic. Reroutes surface as
/// [`ProgressEvent::RerouteRequested`]; the caller computes the route with
/// whatever backend it has and reports back through
/// [`RouteTracker::complete_reroute`].
pub struct RouteTracker {
    rules: TrackingRules,
    policies: TrackerPolicies,
    progress: RouteProgress,
    matcher: Box<dyn OnRouteMatcher>,
    reroute: RerouteCoordinator,
    tunnel: TunnelDetector,
    raw_location: Option<LocationFix>,
    /// Remaining shape length of the current step from the snapped position.
    snapped_distance_to_maneuver_m: Option<f64>,
    has_found_qualified_location: bool,
    is_first_location: bool,
    /// Leg index arrival has already fired for.
    arrived_leg_index: Option<usize>,
}

impl RouteTracker {
    pub fn new(route: Route, rules: TrackingRules) -> Self {
        Self::with_matcher(route, rules, Box::new(GeometricMatcher::new()))
    }

    pub fn with_matcher(
        route: Route,
        rules: TrackingRules,
        matcher: Box<dyn OnRouteMatcher>,
    ) -> Self {
        Self {
            rules,
            policies: TrackerPolicies::default(),
            progress: RouteProgress::new(Arc::new(route), 0, 0),
            matcher,
            reroute: RerouteCoordinator::new(),
            tunnel: TunnelDetector::new(),
            raw_location: None,
            snapped_distance_to_maneuver_m: None,
            has_found_qualified_location: false,
            is_first_location: true,
            arrived_leg_index: None,
        }
    }

    pub fn with_policies(mut self, policies: TrackerPolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn progress(&self) -> &RouteProgress {
        &self.progress
    }

    pub fn rules(&self) -> &TrackingRules {
        &self.rules
    }

    pub fn raw_location(&self) -> Option<&LocationFix> {
        self.raw_location.as_ref()
    }

    pub fn is_rerouting(&self) -> bool {
        self.reroute.is_rerouting()
    }

    pub fn tunnel_state(&self) -> TunnelState {
        self.tunnel.state()
    }

    /// Forward a status report from an external map matcher.
    pub fn observe_matcher_status(&mut self, status: MatcherStatus) {
        self.matcher.observe_status(status);
    }

    /// Process a batch of fixes, preferring the most recent qualified one.
    /// Returns the events the update produced, in order.
    pub fn update_location(&mut self, fixes: &[LocationFix]) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        let Some(fix) = self.select_fix(fixes) else {
            return events;
        };
        self.raw_location = Some(fix.clone());
        self.refresh_snapped_distance(&fix);

        self.update_intersection_index();
        self.update_distance_traveled(&fix, &mut events);
        self.update_distance_to_intersection(&fix);
        self.update_step_progress(&fix, &mut events);
        self.update_leg_progress(&fix, &mut events);
        self.update_visual_instruction(&mut events);

        let on_route = self.classify(&fix);
        if !on_route && (self.policies.should_reroute)(&fix) {
            if self.reroute.try_begin_off_route(&fix, &self.rules) {
                events.push(ProgressEvent::WillReroute {
                    location: fix.clone(),
                });
                events.push(ProgressEvent::RerouteRequested {
                    request: RerouteRequest {
                        origin: fix.clone(),
                        reason: RerouteReason::OffRoute,
                    },
                });
            }
            if let Some(event) = self.tunnel.update(&fix, &self.progress, &self.rules) {
                events.push(event);
            }
            self.is_first_location = false;
            return events;
        }

        self.update_spoken_instruction(&mut events);
        if self.reroute.try_begin_proactive(&fix, &self.progress, &self.rules) {
            events.push(ProgressEvent::RerouteRequested {
                request: RerouteRequest {
                    origin: fix.clone(),
                    reason: RerouteReason::Proactive,
                },
            });
        }
        if let Some(event) = self.tunnel.update(&fix, &self.progress, &self.rules) {
            events.push(event);
        }
        self.is_first_location = false;
        events
    }

    /// Feed back the outcome of a reroute request. Completions with no
    /// request in flight are ignored; otherwise the result is honored even
    /// if the user kept moving since the request went out.
    pub fn complete_reroute(
        &mut self,
        result: Result<Route, RerouteError>,
    ) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        let Some(reason) = self.reroute.finish() else {
            tracing::debug!("ignoring reroute completion with no request in flight");
            return events;
        };

        match (reason, result) {
            (RerouteReason::OffRoute, Ok(route)) => {
                self.install_route(route);
                events.push(ProgressEvent::DidReroute { proactive: false });
            }
            (RerouteReason::OffRoute, Err(error)) => {
                tracing::warn!(%error, "reroute failed, keeping the current route");
                events.push(ProgressEvent::RerouteFailed { error });
            }
            (RerouteReason::Proactive, Ok(route)) => {
                if self.is_route_meaningfully_faster(&route) {
                    self.install_route(route);
                    events.push(ProgressEvent::DidReroute { proactive: true });
                }
            }
            (RerouteReason::Proactive, Err(error)) => {
                // Nobody is waiting on a faster route; try again next interval.
                tracing::debug!(%error, "faster-route check failed");
            }
        }
        events
    }

    fn select_fix(&mut self, fixes: &[LocationFix]) -> Option<LocationFix> {
        let qualified = fixes.iter().rev().find(|fix| {
            (0.0..=self.rules.max_qualified_horizontal_accuracy_m)
                .contains(&fix.horizontal_accuracy_m)
        });
        if let Some(fix) = qualified {
            self.has_found_qualified_location = true;
            return Some(fix.clone());
        }

        let last = fixes.last()?.clone();
        if self.has_found_qualified_location && (self.policies.should_discard_location)(&last) {
            // Keep the displayed position moving but make no decisions on a
            // degraded fix.
            self.raw_location = Some(last);
            return None;
        }
        Some(last)
    }

    fn refresh_snapped_distance(&mut self, fix: &LocationFix) {
        let geometry = &self.progress.leg_progress.current_step().geometry;
        self.snapped_distance_to_maneuver_m =
            spatial::closest_point_on_polyline(geometry, fix.coordinate).map(|closest| {
                (spatial::polyline_length_m(geometry) - closest.distance_along_m).max(0.0)
            });
    }

    fn update_intersection_index(&mut self) {
        let index = {
            let step_progress = &self.progress.leg_progress.step_progress;
            let traveled = step_progress.distance_traveled_m();
            let distances = step_progress.intersection_distances();
            distances
                .iter()
                .position(|distance| *distance > traveled)
                .unwrap_or(distances.len())
                .saturating_sub(1)
        };
        let step_progress = &mut self.progress.leg_progress.step_progress;
        step_progress.intersection_index = step_progress.intersection_index.max(index);
    }

    fn update_distance_traveled(&mut self, fix: &LocationFix, events: &mut Vec<ProgressEvent>) {
        if let Some(snapped_remaining) = self.snapped_distance_to_maneuver_m {
            let step_distance = self.progress.leg_progress.current_step().distance_m;
            self.progress
                .leg_progress
                .step_progress
                .record_distance_traveled(step_distance - snapped_remaining);
        }
        events.push(ProgressEvent::ProgressChanged {
            progress: self.progress.clone(),
            location: self.idealized_location(fix),
            raw_location: fix.clone(),
        });
    }

    /// A display-friendly fix: position snapped to the route shape with the
    /// course following it, as long as the raw fix plausibly does.
    fn idealized_location(&self, fix: &LocationFix) -> LocationFix {
        let nearby = self.progress.nearby_polyline();
        let Some(closest) = spatial::closest_point_on_polyline(&nearby, fix.coordinate) else {
            return fix.clone();
        };
        let offset = spatial::haversine_distance(closest.coordinate, fix.coordinate);
        if offset
            > self.rules.user_location_snapping_distance_m + fix.horizontal_accuracy_m.max(0.0)
        {
            return fix.clone();
        }
        let buffer = self.rules.course_interpolation_buffer_m(fix.speed_mps);
        let Some(course) = spatial::interpolated_course_deg(&nearby, fix.coordinate, buffer)
        else {
            return fix.clone();
        };
        if !GeometricMatcher::course_is_plausible(fix, course, &self.progress, &self.rules) {
            return fix.clone();
        }
        fix.with_position(closest.coordinate, course)
    }

    fn update_distance_to_intersection(&mut self, fix: &LocationFix) {
        let distance = {
            let leg_progress = &self.progress.leg_progress;
            leg_progress
                .step_progress
                .upcoming_intersection()
                .and_then(|upcoming| {
                    spatial::along_line_distance(
                        &leg_progress.current_step().geometry,
                        fix.coordinate,
                        upcoming.location,
                    )
                })
        };
        self.progress
            .leg_progress
            .step_progress
            .user_distance_to_upcoming_intersection_m = distance;
    }

    /// Maneuver completion: inside the maneuver zone, either the course
    /// lines up with the road after the turn, or the user has started moving
    /// away from the maneuver point after closing in on it.
    fn update_step_progress(&mut self, fix: &LocationFix, events: &mut Vec<ProgressEvent>) {
        let Some(snapped) = self.snapped_distance_to_maneuver_m else {
            return;
        };
        let Some((course_matches, maneuver_location)) = ({
            self.progress.leg_progress.upcoming_step().map(|upcoming| {
                let course_matches = match (upcoming.initial_heading_deg, upcoming.final_heading_deg)
                {
                    (Some(initial), Some(final_heading)) => {
                        let turn_angle = spatial::clockwise_difference_deg(
                            spatial::wrap_deg(initial, 0.0, 360.0),
                            spatial::wrap_deg(final_heading, 0.0, 360.0),
                        );
                        if turn_angle <= self.rules.max_turn_completion_offset_deg {
                            // Nothing to turn through; completion is purely
                            // positional.
                            snapped <= STRAIGHT_COMPLETION_EPSILON_M
                        } else {
                            fix.has_qualified_course()
                                && spatial::clockwise_difference_deg(
                                    spatial::wrap_deg(final_heading, 0.0, 360.0),
                                    spatial::wrap_deg(fix.course_deg, 0.0, 360.0),
                                ) <= self.rules.max_turn_completion_offset_deg
                        }
                    }
                    _ => false,
                };
                (course_matches, upcoming.maneuver_location)
            })
        }) else {
            return;
        };

        let absolute = spatial::haversine_distance(maneuver_location, fix.coordinate);
        let last_known = self
            .progress
            .leg_progress
            .step_progress
            .user_distance_to_maneuver_m;

        if snapped <= self.rules.maneuver_zone_radius_m {
            let was_in_zone = last_known <= self.rules.maneuver_zone_radius_m;
            if course_matches || (absolute > last_known && was_in_zone) {
                self.advance_step(fix, events);
                return;
            }
        }
        if absolute < last_known {
            self.progress
                .leg_progress
                .step_progress
                .user_distance_to_maneuver_m = absolute;
        }
    }

    fn advance_step(&mut self, fix: &LocationFix, events: &mut Vec<ProgressEvent>) {
        self.progress.leg_progress.advance_step();
        self.matcher.note_step_advanced();
        self.refresh_snapped_distance(fix);
        let step_index = self.progress.leg_progress.step_index();
        tracing::debug!(step_index, "advanced to next step");
        events.push(ProgressEvent::StepAdvanced { step_index });
    }

    fn update_leg_progress(&mut self, fix: &LocationFix, events: &mut Vec<ProgressEvent>) {
        let leg_index = self.progress.leg_index();
        let (near_leg_end, can_latch, duration_remaining, distance_remaining) = {
            let leg_progress = &self.progress.leg_progress;
            let remaining_spoken = leg_progress
                .step_progress
                .remaining_spoken_instructions()
                .len();
            let near = leg_progress.remaining_step_count() <= 1
                && remaining_spoken <= 1
                && self.arrived_leg_index != Some(leg_index);
            (
                near,
                remaining_spoken == 0,
                leg_progress.duration_remaining(),
                leg_progress.distance_remaining(),
            )
        };
        if !near_leg_end {
            return;
        }

        if can_latch && duration_remaining <= self.rules.waypoint_arrival_threshold_s {
            self.arrived_leg_index = Some(leg_index);
            self.progress.leg_progress.user_has_arrived_at_waypoint = true;
            tracing::info!(leg_index, "arrived at waypoint");
            events.push(ProgressEvent::DidArriveAtWaypoint { leg_index });

            if !self.progress.is_final_leg()
                && (self.policies.should_advance_leg_on_arrival)(leg_index)
            {
                self.progress.advance_leg();
                self.matcher.note_step_advanced();
                self.refresh_snapped_distance(fix);
                events.push(ProgressEvent::LegAdvanced {
                    leg_index: self.progress.leg_index(),
                });
            }
        } else {
            events.push(ProgressEvent::WillArriveAtWaypoint {
                duration_remaining_s: duration_remaining,
                distance_remaining_m: distance_remaining,
            });
        }
    }

    fn update_visual_instruction(&mut self, events: &mut Vec<ProgressEvent>) {
        let Some(snapped) = self.snapped_distance_to_maneuver_m else {
            return;
        };
        let fire = self
            .progress
            .leg_progress
            .step_progress
            .remaining_visual_instructions()
            .iter()
            .enumerate()
            .find(|(_, instruction)| {
                instruction.distance_along_step_m >= snapped || self.is_first_location
            })
            .map(|(offset, instruction)| (offset, instruction.clone()));
        if let Some((offset, instruction)) = fire {
            // Entries scanned past are skipped for good; the index only moves
            // forward, so nothing ever fires twice or out of list order.
            self.progress.leg_progress.step_progress.visual_instruction_index += offset + 1;
            events.push(ProgressEvent::VisualInstructionPassed { instruction });
        }
    }

    fn update_spoken_instruction(&mut self, events: &mut Vec<ProgressEvent>) {
        let Some(snapped) = self.snapped_distance_to_maneuver_m else {
            return;
        };
        // The departure announcement plays no matter how long the first
        // step is.
        let first_on_first_step = self.progress.leg_progress.step_index() == 0
            && self.progress.leg_progress.step_progress.spoken_instruction_index() == 0;
        let fire = self
            .progress
            .leg_progress
            .step_progress
            .remaining_spoken_instructions()
            .iter()
            .enumerate()
            .find(|(_, instruction)| {
                instruction.distance_along_step_m >= snapped || first_on_first_step
            })
            .map(|(offset, instruction)| (offset, instruction.clone()));
        if let Some((offset, instruction)) = fire {
            tracing::debug!(text = %instruction.text, "passed spoken instruction");
            self.progress.leg_progress.step_progress.spoken_instruction_index += offset + 1;
            events.push(ProgressEvent::SpokenInstructionPassed { instruction });
        }
    }

    fn classify(&mut self, fix: &LocationFix) -> bool {
        if self.progress.leg_progress.user_has_arrived_at_waypoint
            && (self.policies.prevent_reroutes_on_arrival)(self.progress.leg_index())
        {
            return true;
        }
        let outcome = self.matcher.check(fix, &mut self.progress, &self.rules);
        if outcome.advanced_to_step.is_some() {
            self.refresh_snapped_distance(fix);
        }
        outcome.on_route
    }

    fn is_route_meaningfully_faster(&self, route: &Route) -> bool {
        let Some(first_step) = route.legs.first().and_then(|leg| leg.steps.first()) else {
            return false;
        };
        first_step.expected_travel_time_s >= self.rules.min_faster_route_buffer_s
            && route.expected_travel_time_s <= 0.9 * self.progress.duration_remaining()
    }

    fn install_route(&mut self, route: Route) {
        tracing::info!(
            distance_m = route.distance_m,
            duration_s = route.expected_travel_time_s,
            "installing new route"
        );
        self.progress = RouteProgress::new(Arc::new(route), 0, 0);
        self.matcher.note_route_replaced();
        self.reroute.reset_proactive_timer();
        self.arrived_leg_index = None;
        match self.raw_location.clone() {
            Some(fix) => self.refresh_snapped_distance(&fix),
            None => self.snapped_distance_to_maneuver_m = None,
        }
    }
}
