//! Core route-tracking engine for turn-by-turn navigation.
//!
//! [`RouteTracker`] consumes location fixes against a [`Route`] and emits
//! [`ProgressEvent`]s: progress statistics, maneuver and leg advancement,
//! instruction dispatch, arrival, reroute requests and tunnel transitions.
//! The crate is synchronous and runtime-agnostic; routing backends plug in
//! by answering [`RerouteRequest`]s through
//! [`RouteTracker::complete_reroute`].

pub mod events;
pub mod matcher;
pub mod models;
pub mod progress;
pub mod reroute;
pub mod rules;
pub mod spatial;
pub mod tracker;
pub mod tunnel;

#[cfg(test)]
pub(crate) mod testutil;

pub use events::ProgressEvent;
pub use matcher::{ExternalMatcher, GeometricMatcher, MatchOutcome, MatcherStatus, OnRouteMatcher};
pub use models::{
    CongestionLevel, Coordinate, Intersection, LocationFix, ManeuverType, Route, RouteLeg,
    RouteStep, SpokenInstruction, VisualInstruction,
};
pub use progress::{ClosestStep, LegProgress, RouteProgress, StepProgress};
pub use reroute::{RerouteError, RerouteReason, RerouteRequest};
pub use rules::TrackingRules;
pub use tracker::{RouteTracker, TrackerPolicies};
pub use tunnel::{TunnelDetector, TunnelState};
