//! Events produced by the tracker, one batch per processed location update.

use crate::models::{LocationFix, SpokenInstruction, VisualInstruction};
use crate::progress::RouteProgress;
use crate::reroute::{RerouteError, RerouteRequest};

/// What happened while processing a location update.
///
/// Consumers receive these from [`crate::RouteTracker::update_location`] and
/// [`crate::RouteTracker::complete_reroute`] in the order the state machine
/// produced them. Instruction events fire at most once per instruction, at
/// most one of each kind per update.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Progress statistics changed. `location` is the idealized (snapped)
    /// fix suitable for display; `raw_location` is what the sensor reported.
    ProgressChanged {
        progress: RouteProgress,
        location: LocationFix,
        raw_location: LocationFix,
    },
    /// The user completed the upcoming maneuver; `step_index` is the new
    /// current step.
    StepAdvanced { step_index: usize },
    SpokenInstructionPassed { instruction: SpokenInstruction },
    VisualInstructionPassed { instruction: VisualInstruction },
    /// The user is about to reach the end of the current leg.
    WillArriveAtWaypoint {
        duration_remaining_s: f64,
        distance_remaining_m: f64,
    },
    /// Arrival latched for the leg. Fires once per leg.
    DidArriveAtWaypoint { leg_index: usize },
    /// The tracker moved on to the next leg; `leg_index` is the new one.
    LegAdvanced { leg_index: usize },
    /// The user left the route and a reroute is about to be requested.
    WillReroute { location: LocationFix },
    /// The caller should compute a new route and feed the result back via
    /// `complete_reroute`.
    RerouteRequested { request: RerouteRequest },
    /// A replacement route was accepted and progress was reset onto it.
    DidReroute { proactive: bool },
    /// An off-route reroute attempt failed; the tracker keeps following the
    /// old route and will request again once the debounce allows.
    RerouteFailed { error: RerouteError },
    TunnelEntered,
    TunnelExited,
}
