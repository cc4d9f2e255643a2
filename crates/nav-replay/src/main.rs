//! Replay a GPS trace (or a simulated drive) against a route and log every
//! event the tracker produces.

mod sim;

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use nav_core::{
    LocationFix, ProgressEvent, RerouteError, Route, RouteTracker, TrackingRules,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Replay location fixes against a route and report tracker events
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Route JSON file
    #[arg(long)]
    route: PathBuf,

    /// GPS trace JSON file (array of fixes). When omitted, a clean drive
    /// along the route is simulated.
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Simulated speed in m/s
    #[arg(long, default_value_t = 15.0)]
    speed: f64,

    /// Seconds between simulated fixes
    #[arg(long, default_value_t = 1.0)]
    interval: f64,

    /// Max position jitter for simulated fixes, in meters
    #[arg(long, default_value_t = 0.0)]
    noise: f64,

    /// Sleep the fix interval between updates instead of replaying as fast
    /// as possible
    #[arg(long, default_value_t = false)]
    realtime: bool,
}

#[derive(Debug, Default)]
struct Summary {
    fixes: usize,
    step_advances: usize,
    spoken: usize,
    visual: usize,
    reroute_requests: usize,
    arrivals: usize,
    tunnel_entries: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nav_replay=info".parse()?)
                .add_directive("nav_core=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let route: Route = load_json(&args.route).context("loading route")?;
    println!(
        "Route: {:.1}km, {:.0}s expected, {} leg(s)",
        route.distance_m / 1000.0,
        route.expected_travel_time_s,
        route.legs.len()
    );

    let fixes: Vec<LocationFix> = match &args.trace {
        Some(path) => load_json(path).context("loading trace")?,
        None => sim::simulate_drive(&route, args.speed, args.interval, args.noise, Utc::now()),
    };
    println!("Replaying {} fixes...\n", fixes.len());

    let mut tracker = RouteTracker::new(route, TrackingRules::default());
    let mut summary = Summary::default();

    for fix in &fixes {
        if args.realtime {
            tokio::time::sleep(std::time::Duration::from_secs_f64(args.interval)).await;
        }
        summary.fixes += 1;

        let mut queue: VecDeque<ProgressEvent> =
            tracker.update_location(std::slice::from_ref(fix)).into();
        while let Some(event) = queue.pop_front() {
            handle_event(event, &mut tracker, &mut queue, &mut summary);
        }
    }

    println!("\nReplay complete.");
    println!("  Fixes processed:   {}", summary.fixes);
    println!("  Steps advanced:    {}", summary.step_advances);
    println!("  Spoken/visual:     {}/{}", summary.spoken, summary.visual);
    println!("  Reroute requests:  {}", summary.reroute_requests);
    println!("  Arrivals:          {}", summary.arrivals);
    println!("  Tunnels entered:   {}", summary.tunnel_entries);
    println!(
        "  Final position:    leg {}, step {}, {:.1}% of the route",
        tracker.progress().leg_index(),
        tracker.progress().leg_progress.step_index(),
        tracker.progress().fraction_traveled() * 100.0
    );
    Ok(())
}

fn handle_event(
    event: ProgressEvent,
    tracker: &mut RouteTracker,
    queue: &mut VecDeque<ProgressEvent>,
    summary: &mut Summary,
) {
    match event {
        ProgressEvent::ProgressChanged { progress, .. } => {
            tracing::debug!(
                distance_remaining_m = progress.distance_remaining(),
                duration_remaining_s = progress.duration_remaining(),
                "progress"
            );
        }
        ProgressEvent::StepAdvanced { step_index } => {
            summary.step_advances += 1;
            let instruction = &tracker.progress().leg_progress.current_step().instruction;
            tracing::info!(step_index, instruction = %instruction, "step advanced");
        }
        ProgressEvent::SpokenInstructionPassed { instruction } => {
            summary.spoken += 1;
            println!(">> {}", instruction.text);
        }
        ProgressEvent::VisualInstructionPassed { instruction } => {
            summary.visual += 1;
            tracing::info!(text = %instruction.primary_text, "banner updated");
        }
        ProgressEvent::WillArriveAtWaypoint {
            duration_remaining_s,
            ..
        } => {
            tracing::debug!(duration_remaining_s, "approaching waypoint");
        }
        ProgressEvent::DidArriveAtWaypoint { leg_index } => {
            summary.arrivals += 1;
            println!(">> Arrived at waypoint {leg_index}");
        }
        ProgressEvent::LegAdvanced { leg_index } => {
            tracing::info!(leg_index, "continuing to the next leg");
        }
        ProgressEvent::WillReroute { location } => {
            tracing::warn!(
                lat = location.coordinate.lat,
                lon = location.coordinate.lon,
                "user went off route"
            );
        }
        ProgressEvent::RerouteRequested { request } => {
            summary.reroute_requests += 1;
            // The replay tool has no routing backend; decline and keep
            // following the original route.
            tracing::warn!(reason = ?request.reason, "declining reroute request");
            queue.extend(tracker.complete_reroute(Err(RerouteError::NoRouteFound)));
        }
        ProgressEvent::DidReroute { proactive } => {
            tracing::info!(proactive, "switched to a new route");
        }
        ProgressEvent::RerouteFailed { error } => {
            tracing::warn!(%error, "reroute failed");
        }
        ProgressEvent::TunnelEntered => {
            summary.tunnel_entries += 1;
            tracing::info!("entered a tunnel, expect degraded GPS");
        }
        ProgressEvent::TunnelExited => {
            tracing::info!("exited the tunnel");
        }
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}
