//! Headless eye tracker session against the simulated tracker.
//!
//! Opens the device, runs a calibration (with an improvement pass if one is
//! offered), streams a number of samples and closes the session.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use eyetracker::{CalibrationOutcome, CalibrationRequest, EyeTracker, TrackerConfig};
use hardware::sim::{LoggingSurface, SimConfig, SimulatedTracker};
use shared::{EyeMode, PointLayout, SampleData, WaitTimeout};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Layout {
    Full,
    Center,
    Bottom,
}

impl From<Layout> for PointLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Full => PointLayout::Full,
            Layout::Center => PointLayout::Center,
            Layout::Bottom => PointLayout::Bottom,
        }
    }
}

/// Eye tracker session demo
#[derive(Parser, Debug)]
#[command(name = "et_session")]
#[command(about = "Calibrate and stream from a simulated eye tracker")]
#[command(version)]
struct Args {
    /// Number of calibration points (1, 2, 5, 9, 13 or 16)
    #[arg(short, long, default_value = "9")]
    points: usize,

    /// Point layout
    #[arg(short, long, value_enum, default_value = "full")]
    layout: Layout,

    /// Eye mode (0 = both, 1/2 = calibrate left/right track both, 3/4 = left/right only)
    #[arg(short, long, default_value = "0")]
    eye: i32,

    /// Present points in random order
    #[arg(long)]
    randomize: bool,

    /// Allow an improvement pass if too few points pass
    #[arg(long)]
    improve: bool,

    /// Samples to read after calibration
    #[arg(short, long, default_value = "20")]
    samples: usize,

    /// Tracker configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TrackerConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    let Some(eye) = EyeMode::from_raw(args.eye) else {
        bail!("eye mode must be 0..=4, got {}", args.eye);
    };

    let sim = SimConfig::default();
    let surface = LoggingSurface::new(sim.screen_width, sim.screen_height);
    let tracker = EyeTracker::new(Box::new(SimulatedTracker::new(sim)), Box::new(surface), config)?;

    let version = tracker.open()?;
    info!("Tracker version {version}");

    let request = CalibrationRequest {
        randomize: args.randomize,
        allow_improvement: args.improve,
        skip_bad_points: args.improve,
        ..CalibrationRequest::new(args.points, args.layout.into(), eye)
    };
    tracker.start_calibration(request)?;

    let mut result = tracker.wait_for_calibration(WaitTimeout::Infinite)?;
    if result.outcome == CalibrationOutcome::ImprovementOffered {
        info!("Improvement offered, re-running rejected points");
        tracker.improve_calibration()?;
        result = tracker.wait_for_calibration(WaitTimeout::Infinite)?;
    }
    info!(
        "Calibration {:?}, quality {}, {} points",
        result.outcome,
        result.quality,
        result.points.len()
    );
    if let Some(reason) = &result.failure {
        warn!("Calibration failed: {reason}");
    }

    tracker.set_streaming(true)?;
    let timeout = WaitTimeout::from(Duration::from_secs(1));
    for _ in 0..args.samples {
        let sample = tracker.wait_for_sample(timeout)?;
        match sample.data {
            SampleData::Raw(raw) => info!(
                "#{} raw t={} gaze=({:.1}, {:.1})",
                sample.sequence, raw.timestamp, raw.gaze_x, raw.gaze_y
            ),
            SampleData::Event(event) => info!(
                "#{} {} t={} dur={}ms at ({:.1}, {:.1})",
                sample.sequence,
                event.kind.describe(),
                event.timestamp,
                event.duration,
                event.x,
                event.y
            ),
        }
    }

    if tracker.dropped_samples() > 0 {
        warn!("{} samples dropped", tracker.dropped_samples());
    }
    tracker.close();
    info!("Session closed");
    Ok(())
}
