//! Progress along a route, a leg and a step.
//!
//! The three levels mirror the route structure: `RouteProgress` owns the
//! current leg index and a `LegProgress`, which owns the current step index
//! and a `StepProgress`. Advancing a step or leg replaces the level below,
//! so per-step state (instruction indices, intersection index, distance to
//! the maneuver) starts fresh after every maneuver.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{CongestionLevel, Coordinate, Intersection, ManeuverType, Route, RouteLeg, RouteStep};
use crate::spatial;

/// Progress along the whole route.
#[derive(Debug, Clone)]
pub struct RouteProgress {
    route: Arc<Route>,
    leg_index: usize,
    pub leg_progress: LegProgress,
    congestion: Arc<CongestionTables>,
}

impl RouteProgress {
    /// Panics when the route has no legs or an index is out of range; those
    /// are programmer errors, not runtime conditions.
    pub fn new(route: Arc<Route>, leg_index: usize, step_index: usize) -> Self {
        assert!(
            leg_index < route.legs.len(),
            "leg index {leg_index} out of range for route with {} legs",
            route.legs.len()
        );
        let congestion = Arc::new(CongestionTables::build(&route));
        let leg_progress = LegProgress::new(route.clone(), leg_index, step_index);
        Self {
            route,
            leg_index,
            leg_progress,
            congestion,
        }
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn leg_index(&self) -> usize {
        self.leg_index
    }

    pub fn current_leg(&self) -> &RouteLeg {
        &self.route.legs[self.leg_index]
    }

    pub fn is_final_leg(&self) -> bool {
        self.leg_index + 1 >= self.route.legs.len()
    }

    /// Move to the next leg. Panics on the final leg.
    pub fn advance_leg(&mut self) {
        assert!(
            !self.is_final_leg(),
            "cannot advance past the final leg of the route"
        );
        self.leg_index += 1;
        self.leg_progress = LegProgress::new(self.route.clone(), self.leg_index, 0);
    }

    pub fn distance_traveled(&self) -> f64 {
        let completed: f64 = self.route.legs[..self.leg_index]
            .iter()
            .map(|leg| leg.distance_m)
            .sum();
        completed + self.leg_progress.distance_traveled()
    }

    pub fn distance_remaining(&self) -> f64 {
        let upcoming: f64 = self.route.legs[self.leg_index + 1..]
            .iter()
            .map(|leg| leg.distance_m)
            .sum();
        upcoming + self.leg_progress.distance_remaining()
    }

    pub fn duration_remaining(&self) -> f64 {
        let upcoming: f64 = self.route.legs[self.leg_index + 1..]
            .iter()
            .map(|leg| leg.expected_travel_time_s)
            .sum();
        upcoming + self.leg_progress.duration_remaining()
    }

    pub fn fraction_traveled(&self) -> f64 {
        if self.route.distance_m <= 0.0 {
            return 1.0;
        }
        self.distance_traveled() / self.route.distance_m
    }

    /// The step after the current one, crossing into the next leg if needed.
    pub fn upcoming_step(&self) -> Option<&RouteStep> {
        self.leg_progress
            .upcoming_step()
            .or_else(|| self.route.legs.get(self.leg_index + 1)?.steps.first())
    }

    /// Concatenated shape of the prior, current and upcoming steps, used for
    /// snapping and course interpolation so a fix just past a maneuver still
    /// matches the route.
    pub fn nearby_polyline(&self) -> Vec<Coordinate> {
        let mut shape = Vec::new();
        if let Some(prior) = self.leg_progress.prior_step() {
            if let Some((_, head)) = prior.geometry.split_last() {
                shape.extend_from_slice(head);
            }
        }
        shape.extend_from_slice(&self.leg_progress.current_step().geometry);
        if let Some(upcoming) = self.leg_progress.upcoming_step() {
            if let Some((_, tail)) = upcoming.geometry.split_first() {
                shape.extend_from_slice(tail);
            }
        }
        shape
    }

    /// Congestion level carrying the most expected travel time over the rest
    /// of the current leg. `Unknown` when the leg has no congestion
    /// annotation, the annotation does not line up with the geometry, or the
    /// leg is nearly finished.
    pub fn average_congestion_level_remaining_on_leg(&self) -> CongestionLevel {
        let Some(leg_segments) = self.congestion.segments_by_step.get(self.leg_index) else {
            return CongestionLevel::Unknown;
        };
        let step_index = self.leg_progress.step_index();
        let Some(step_segments) = leg_segments.get(step_index) else {
            return CongestionLevel::Unknown;
        };
        if self.leg_progress.duration_remaining() < 60.0 {
            return CongestionLevel::Unknown;
        }

        let step = self.leg_progress.current_step();
        let coordinate_count = step.geometry.len() as f64;
        let segments_passed =
            (coordinate_count * self.leg_progress.step_progress.fraction_traveled()).floor() as usize;
        if segments_passed > step_segments.len() {
            return CongestionLevel::Unknown;
        }

        let mut totals: HashMap<CongestionLevel, f64> = HashMap::new();
        for (level, time) in &step_segments[segments_passed..] {
            *totals.entry(*level).or_default() += *time;
        }
        if let Some(leg_times) = self.congestion.times_per_step.get(self.leg_index) {
            for step_times in leg_times.iter().skip(step_index + 1) {
                for (level, time) in step_times {
                    *totals.entry(*level).or_default() += *time;
                }
            }
        }

        totals
            .into_iter()
            .filter(|(_, time)| *time > 0.0)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .map(|(level, _)| level)
            .unwrap_or(CongestionLevel::Unknown)
    }
}

/// Per-segment congestion sliced at step boundaries, computed once per route.
#[derive(Debug, Default)]
struct CongestionTables {
    /// legs -> steps -> (level, expected seconds) per geometry segment
    segments_by_step: Vec<Vec<Vec<(CongestionLevel, f64)>>>,
    /// legs -> steps -> expected seconds accumulated by congestion level
    times_per_step: Vec<Vec<HashMap<CongestionLevel, f64>>>,
}

impl CongestionTables {
    fn build(route: &Route) -> Self {
        let mut segments_by_step = Vec::with_capacity(route.legs.len());
        let mut times_per_step = Vec::with_capacity(route.legs.len());

        for leg in &route.legs {
            let mut leg_segments: Vec<Vec<(CongestionLevel, f64)>> = Vec::new();
            let mut leg_times: Vec<HashMap<CongestionLevel, f64>> = Vec::new();

            if let (Some(levels), Some(times)) = (
                &leg.segment_congestion_levels,
                &leg.expected_segment_travel_times,
            ) {
                let mut cursor = 0usize;
                for step in &leg.steps {
                    let mut step_segments = Vec::new();
                    let mut step_times: HashMap<CongestionLevel, f64> = HashMap::new();

                    // Steps share their last coordinate with the next step,
                    // so each owns one segment per geometry edge; the arrive
                    // step claims whatever annotation remains.
                    let segment_count = if step.maneuver_type == ManeuverType::Arrive {
                        levels.len().min(times.len()).saturating_sub(cursor)
                    } else {
                        step.geometry.len().saturating_sub(1)
                    };
                    let end = cursor + segment_count;

                    if end <= levels.len() && end <= times.len() {
                        for (level, time) in levels[cursor..end].iter().zip(times[cursor..end].iter())
                        {
                            step_segments.push((*level, *time));
                            *step_times.entry(*level).or_default() += *time;
                        }
                        cursor = end;
                    }

                    leg_segments.push(step_segments);
                    leg_times.push(step_times);
                }
            }

            segments_by_step.push(leg_segments);
            times_per_step.push(leg_times);
        }

        Self {
            segments_by_step,
            times_per_step,
        }
    }
}

/// A step index and the distance from a query point to that step's shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestStep {
    pub index: usize,
    pub distance_m: f64,
}

/// Progress along the current leg.
#[derive(Debug, Clone)]
pub struct LegProgress {
    route: Arc<Route>,
    leg_index: usize,
    step_index: usize,
    pub user_has_arrived_at_waypoint: bool,
    pub step_progress: StepProgress,
}

impl LegProgress {
    fn new(route: Arc<Route>, leg_index: usize, step_index: usize) -> Self {
        let steps = route.legs[leg_index].steps.len();
        assert!(
            step_index < steps,
            "step index {step_index} out of range for leg with {steps} steps"
        );
        let step_progress = StepProgress::new(route.clone(), leg_index, step_index);
        Self {
            route,
            leg_index,
            step_index,
            user_has_arrived_at_waypoint: false,
            step_progress,
        }
    }

    pub fn leg(&self) -> &RouteLeg {
        &self.route.legs[self.leg_index]
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn current_step(&self) -> &RouteStep {
        &self.leg().steps[self.step_index]
    }

    pub fn prior_step(&self) -> Option<&RouteStep> {
        self.leg().steps.get(self.step_index.checked_sub(1)?)
    }

    pub fn upcoming_step(&self) -> Option<&RouteStep> {
        self.leg().steps.get(self.step_index + 1)
    }

    /// The step two ahead of the current one.
    pub fn follow_on_step(&self) -> Option<&RouteStep> {
        self.leg().steps.get(self.step_index + 2)
    }

    /// Steps left after the current one.
    pub fn remaining_step_count(&self) -> usize {
        self.leg().steps.len() - self.step_index - 1
    }

    /// Jump to a step. Step indices never move backwards within a leg; a
    /// fresh `LegProgress` is built when the route or leg changes.
    pub fn set_step_index(&mut self, step_index: usize) {
        let steps = self.leg().steps.len();
        assert!(
            step_index < steps,
            "step index {step_index} out of range for leg with {steps} steps"
        );
        debug_assert!(step_index >= self.step_index, "step index moved backwards");
        self.step_index = step_index;
        self.step_progress = StepProgress::new(self.route.clone(), self.leg_index, step_index);
    }

    pub fn advance_step(&mut self) {
        self.set_step_index(self.step_index + 1);
    }

    pub fn distance_traveled(&self) -> f64 {
        let completed: f64 = self.leg().steps[..self.step_index]
            .iter()
            .map(|step| step.distance_m)
            .sum();
        completed + self.step_progress.distance_traveled_m()
    }

    pub fn distance_remaining(&self) -> f64 {
        let upcoming: f64 = self.leg().steps[self.step_index + 1..]
            .iter()
            .map(|step| step.distance_m)
            .sum();
        upcoming + self.step_progress.distance_remaining()
    }

    pub fn duration_remaining(&self) -> f64 {
        let upcoming: f64 = self.leg().steps[self.step_index + 1..]
            .iter()
            .map(|step| step.expected_travel_time_s)
            .sum();
        upcoming + self.step_progress.duration_remaining()
    }

    pub fn fraction_traveled(&self) -> f64 {
        if self.leg().distance_m <= 0.0 {
            return 1.0;
        }
        self.distance_traveled() / self.leg().distance_m
    }

    /// Nearest of the current and remaining steps to a coordinate. Earlier
    /// steps win ties so progression never skips ahead spuriously.
    pub fn closest_step(&self, coordinate: Coordinate) -> Option<ClosestStep> {
        let mut closest: Option<ClosestStep> = None;
        for (offset, step) in self.leg().steps[self.step_index..].iter().enumerate() {
            let Some(projected) = spatial::closest_point_on_polyline(&step.geometry, coordinate)
            else {
                continue;
            };
            let distance_m = spatial::haversine_distance(projected.coordinate, coordinate);
            if closest.map_or(true, |c| distance_m < c.distance_m) {
                closest = Some(ClosestStep {
                    index: self.step_index + offset,
                    distance_m,
                });
            }
        }
        closest
    }
}

/// Progress along the current step.
#[derive(Debug, Clone)]
pub struct StepProgress {
    route: Arc<Route>,
    leg_index: usize,
    step_index: usize,
    distance_traveled_m: f64,
    /// Smallest absolute distance to the upcoming maneuver seen so far;
    /// starts at the full step distance.
    pub(crate) user_distance_to_maneuver_m: f64,
    pub(crate) intersection_index: usize,
    pub(crate) spoken_instruction_index: usize,
    pub(crate) visual_instruction_index: usize,
    /// Current step's intersections plus the upcoming step's first, which
    /// belongs to the upcoming maneuver but is passed while on this step.
    intersections_with_upcoming: Vec<Intersection>,
    /// Distance from the step start to each entry of
    /// `intersections_with_upcoming`, along the step shape.
    intersection_distances: Vec<f64>,
    pub(crate) user_distance_to_upcoming_intersection_m: Option<f64>,
}

impl StepProgress {
    fn new(route: Arc<Route>, leg_index: usize, step_index: usize) -> Self {
        let step = &route.legs[leg_index].steps[step_index];
        let mut intersections_with_upcoming = step.intersections.clone();
        if let Some(upcoming) = route.legs[leg_index].steps.get(step_index + 1) {
            if let Some(first) = upcoming.intersections.first() {
                intersections_with_upcoming.push(first.clone());
            }
        }
        let intersection_distances = intersections_with_upcoming
            .iter()
            .map(|intersection| {
                spatial::distance_along_polyline(&step.geometry, intersection.location)
                    .unwrap_or(0.0)
            })
            .collect();
        let user_distance_to_maneuver_m = step.distance_m;

        Self {
            route,
            leg_index,
            step_index,
            distance_traveled_m: 0.0,
            user_distance_to_maneuver_m,
            intersection_index: 0,
            spoken_instruction_index: 0,
            visual_instruction_index: 0,
            intersections_with_upcoming,
            intersection_distances,
            user_distance_to_upcoming_intersection_m: None,
        }
    }

    pub fn step(&self) -> &RouteStep {
        &self.route.legs[self.leg_index].steps[self.step_index]
    }

    pub fn distance_traveled_m(&self) -> f64 {
        self.distance_traveled_m
    }

    /// Distance traveled never decreases within a step's lifetime; snapping
    /// jitter that would move it backwards is ignored.
    pub(crate) fn record_distance_traveled(&mut self, distance_m: f64) {
        self.distance_traveled_m = self.distance_traveled_m.max(distance_m.max(0.0));
    }

    pub fn distance_remaining(&self) -> f64 {
        (self.step().distance_m - self.distance_traveled_m).max(0.0)
    }

    pub fn fraction_traveled(&self) -> f64 {
        let distance = self.step().distance_m;
        if distance <= 0.0 {
            return 1.0;
        }
        (self.distance_traveled_m / distance).min(1.0)
    }

    pub fn duration_remaining(&self) -> f64 {
        (1.0 - self.fraction_traveled()) * self.step().expected_travel_time_s
    }

    pub fn user_distance_to_maneuver_m(&self) -> f64 {
        self.user_distance_to_maneuver_m
    }

    pub fn intersection_index(&self) -> usize {
        self.intersection_index
    }

    pub fn intersections_with_upcoming(&self) -> &[Intersection] {
        &self.intersections_with_upcoming
    }

    pub(crate) fn intersection_distances(&self) -> &[f64] {
        &self.intersection_distances
    }

    /// The intersection most recently passed.
    pub fn current_intersection(&self) -> Option<&Intersection> {
        self.intersections_with_upcoming.get(self.intersection_index)
    }

    /// The next intersection ahead, when one remains on this step.
    pub fn upcoming_intersection(&self) -> Option<&Intersection> {
        self.intersections_with_upcoming.get(self.intersection_index + 1)
    }

    pub fn user_distance_to_upcoming_intersection_m(&self) -> Option<f64> {
        self.user_distance_to_upcoming_intersection_m
    }

    pub fn spoken_instruction_index(&self) -> usize {
        self.spoken_instruction_index
    }

    pub fn visual_instruction_index(&self) -> usize {
        self.visual_instruction_index
    }

    pub fn remaining_spoken_instructions(&self) -> &[crate::models::SpokenInstruction] {
        let instructions = &self.step().spoken_instructions;
        &instructions[self.spoken_instruction_index.min(instructions.len())..]
    }

    pub fn remaining_visual_instructions(&self) -> &[crate::models::VisualInstruction] {
        let instructions = &self.step().visual_instructions;
        &instructions[self.visual_instruction_index.min(instructions.len())..]
    }
}
