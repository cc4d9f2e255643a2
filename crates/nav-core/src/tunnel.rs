//! Tunnel entrance/exit detection with hysteresis.
//!
//! GPS degrades inside tunnels, so the raw per-fix detection flaps. The
//! detector only leaves `InTunnel` after several qualified fixes in a row
//! outside tunnel geometry, while a single detected fix pulls it straight
//! back in.

use crate::events::ProgressEvent;
use crate::models::LocationFix;
use crate::progress::RouteProgress;
use crate::rules::TrackingRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    NotInTunnel,
    InTunnel,
    /// Counting qualified fixes outside tunnel geometry before confirming
    /// the exit.
    ExitingTunnel { good_fixes: u32 },
}

#[derive(Debug)]
pub struct TunnelDetector {
    state: TunnelState,
}

impl Default for TunnelDetector {
    fn default() -> Self {
        Self {
            state: TunnelState::NotInTunnel,
        }
    }
}

impl TunnelDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TunnelState {
        self.state
    }

    /// Whether consumers should treat the user as inside a tunnel. Stays
    /// true through the exit hysteresis window.
    pub fn is_in_tunnel(&self) -> bool {
        !matches!(self.state, TunnelState::NotInTunnel)
    }

    pub fn update(
        &mut self,
        fix: &LocationFix,
        progress: &RouteProgress,
        rules: &TrackingRules,
    ) -> Option<ProgressEvent> {
        let detected = Self::tunnel_detected(fix, progress, rules);
        self.apply(detected, fix.is_qualified(), rules.tunnel_exit_fix_count)
    }

    /// A fix counts as inside tunnel geometry when the last intersection it
    /// passed is a tunnel, or when it is about to enter one: close to an
    /// upcoming tunnel intersection and either moving at road speed or
    /// already losing GPS quality.
    fn tunnel_detected(fix: &LocationFix, progress: &RouteProgress, rules: &TrackingRules) -> bool {
        let step_progress = &progress.leg_progress.step_progress;
        if step_progress
            .current_intersection()
            .map_or(false, |intersection| intersection.is_tunnel())
        {
            return true;
        }

        let Some(upcoming) = step_progress.upcoming_intersection() else {
            return false;
        };
        if !upcoming.is_tunnel() {
            return false;
        }
        let Some(distance) = step_progress.user_distance_to_upcoming_intersection_m() else {
            return false;
        };
        let entering = fix.speed_mps >= rules.min_tunnel_entrance_speed_mps || !fix.is_qualified();
        entering && distance < rules.tunnel_entrance_radius_m
    }

    fn apply(
        &mut self,
        detected: bool,
        fix_is_qualified: bool,
        exit_threshold: u32,
    ) -> Option<ProgressEvent> {
        match (self.state, detected) {
            (TunnelState::NotInTunnel, true) => {
                self.state = TunnelState::InTunnel;
                tracing::info!("entered tunnel");
                Some(ProgressEvent::TunnelEntered)
            }
            (TunnelState::ExitingTunnel { .. }, true) => {
                self.state = TunnelState::InTunnel;
                None
            }
            (TunnelState::InTunnel, false) => {
                self.confirm_exit(fix_is_qualified as u32, exit_threshold)
            }
            (TunnelState::ExitingTunnel { good_fixes }, false) => {
                if !fix_is_qualified {
                    return None;
                }
                self.confirm_exit(good_fixes + 1, exit_threshold)
            }
            _ => None,
        }
    }

    fn confirm_exit(&mut self, good_fixes: u32, exit_threshold: u32) -> Option<ProgressEvent> {
        if good_fixes >= exit_threshold {
            self.state = TunnelState::NotInTunnel;
            tracing::info!("exited tunnel");
            Some(ProgressEvent::TunnelExited)
        } else {
            self.state = TunnelState::ExitingTunnel { good_fixes };
            None
        }
    }
}
