//! Reroute gating: debounce, in-flight tracking and proactive check timing.
//!
//! The coordinator never computes routes. It decides when a request should
//! go out; the tracker emits the request as an event and the caller answers
//! with `RouteTracker::complete_reroute` whenever its routing source
//! responds.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Coordinate, LocationFix};
use crate::progress::RouteProgress;
use crate::rules::TrackingRules;
use crate::spatial;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerouteReason {
    /// The user left the route.
    OffRoute,
    /// Periodic check for a faster alternative while still on route.
    Proactive,
}

/// A request for a new route from the user's position.
#[derive(Debug, Clone)]
pub struct RerouteRequest {
    pub origin: LocationFix,
    pub reason: RerouteReason,
}

#[derive(Debug, Clone, Error)]
pub enum RerouteError {
    #[error("routing backend failed: {0}")]
    Backend(String),
    #[error("no route found from the current position")]
    NoRouteFound,
}

/// Tracks reroute requests in flight and spaces them out.
#[derive(Debug, Default)]
pub struct RerouteCoordinator {
    in_flight: Option<RerouteReason>,
    last_reroute_location: Option<Coordinate>,
    last_proactive_check: Option<DateTime<Utc>>,
}

impl RerouteCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_rerouting(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Begin an off-route reroute unless one is already in flight or the
    /// user has not moved far enough from where the last one was requested.
    pub(crate) fn try_begin_off_route(
        &mut self,
        fix: &LocationFix,
        rules: &TrackingRules,
    ) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        if let Some(last) = self.last_reroute_location {
            if spatial::haversine_distance(fix.coordinate, last)
                < rules.max_distance_before_recalculating_m
            {
                return false;
            }
        }
        self.in_flight = Some(RerouteReason::OffRoute);
        self.last_reroute_location = Some(fix.coordinate);
        tracing::info!(
            lat = fix.coordinate.lat,
            lon = fix.coordinate.lon,
            "requesting reroute, user is off route"
        );
        true
    }

    /// Begin a proactive faster-route check when the trip is long enough and
    /// the check interval has elapsed between fix timestamps. The first
    /// eligible fix only arms the timer.
    pub(crate) fn try_begin_proactive(
        &mut self,
        fix: &LocationFix,
        progress: &RouteProgress,
        rules: &TrackingRules,
    ) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        if progress.upcoming_step().is_none() {
            return false;
        }
        if progress.duration_remaining() <= rules.min_duration_for_proactive_reroute_s {
            return false;
        }
        // Don't check close to a maneuver, a new route would likely diverge
        // right where the user is busy.
        if progress.leg_progress.step_progress.duration_remaining()
            <= rules.min_faster_route_buffer_s
        {
            return false;
        }

        let Some(last_check) = self.last_proactive_check else {
            self.last_proactive_check = Some(fix.timestamp);
            return false;
        };
        let elapsed = (fix.timestamp - last_check).num_milliseconds() as f64 / 1000.0;
        if elapsed < rules.proactive_reroute_interval_s {
            return false;
        }

        self.last_proactive_check = Some(fix.timestamp);
        self.in_flight = Some(RerouteReason::Proactive);
        tracing::debug!("checking for a faster route");
        true
    }

    /// Clear the in-flight request, returning its reason. `None` when no
    /// request was pending (a stale completion the tracker ignores).
    pub(crate) fn finish(&mut self) -> Option<RerouteReason> {
        self.in_flight.take()
    }

    /// Forget proactive timing after a route change so the next check waits
    /// a full interval on the new route.
    pub(crate) fn reset_proactive_timer(&mut self) {
        self.last_proactive_check = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::offset_by_bearing;
    use crate::testutil::{fix_at, long_route};
    use std::sync::Arc;

    #[test]
    fn off_route_requests_are_debounced_by_distance() {
        let rules = TrackingRules::default();
        let mut coordinator = RerouteCoordinator::new();
        let origin = Coordinate::new(0.0, 0.0);

        assert!(coordinator.try_begin_off_route(&fix_at(origin, 0.0, 10.0), &rules));
        assert!(coordinator.is_rerouting());
        coordinator.finish();

        // Still within 50m of the last request
        let nearby = offset_by_bearing(origin, 30.0, 90.0);
        assert!(!coordinator.try_begin_off_route(&fix_at(nearby, 90.0, 10.0), &rules));

        let far = offset_by_bearing(origin, 60.0, 90.0);
        assert!(coordinator.try_begin_off_route(&fix_at(far, 90.0, 10.0), &rules));
    }

    #[test]
    fn only_one_request_in_flight() {
        let rules = TrackingRules::default();
        let mut coordinator = RerouteCoordinator::new();
        let origin = Coordinate::new(0.0, 0.0);

        assert!(coordinator.try_begin_off_route(&fix_at(origin, 0.0, 10.0), &rules));
        let far = offset_by_bearing(origin, 500.0, 90.0);
        assert!(!coordinator.try_begin_off_route(&fix_at(far, 90.0, 10.0), &rules));

        assert_eq!(coordinator.finish(), Some(RerouteReason::OffRoute));
        assert_eq!(coordinator.finish(), None);
    }

    #[test]
    fn proactive_check_arms_then_fires_on_interval() {
        let rules = TrackingRules::default();
        let mut coordinator = RerouteCoordinator::new();
        let progress = RouteProgress::new(Arc::new(long_route()), 0, 0);
        let origin = Coordinate::new(0.0, 0.0);

        let first = fix_at(origin, 0.0, 10.0);
        // First eligible fix only arms the timer
        assert!(!coordinator.try_begin_proactive(&first, &progress, &rules));

        let mut soon = first.clone();
        soon.timestamp = first.timestamp + chrono::Duration::seconds(119);
        assert!(!coordinator.try_begin_proactive(&soon, &progress, &rules));

        let mut later = first.clone();
        later.timestamp = first.timestamp + chrono::Duration::seconds(121);
        assert!(coordinator.try_begin_proactive(&later, &progress, &rules));
        assert!(coordinator.is_rerouting());
    }

    #[test]
    fn proactive_check_skipped_on_short_trips() {
        let rules = TrackingRules::default();
        let mut coordinator = RerouteCoordinator::new();
        // Under ten minutes remaining
        let progress = RouteProgress::new(Arc::new(crate::testutil::route_with_turn()), 0, 0);
        let fix = fix_at(Coordinate::new(0.0, 0.0), 0.0, 10.0);

        assert!(!coordinator.try_begin_proactive(&fix, &progress, &rules));
        let mut later = fix.clone();
        later.timestamp = fix.timestamp + chrono::Duration::seconds(500);
        assert!(!coordinator.try_begin_proactive(&later, &progress, &rules));
        assert!(!coordinator.is_rerouting());
    }
}
