//! Host-side control and data acquisition for eye trackers.
//!
//! The engine sits between an application and a [`hardware::TrackingDevice`]:
//!
//! - [`session`] - open/close lifecycle of the device connection
//! - [`calibration`] - multi-point calibration workflow on a worker thread
//! - [`streaming`] - sampling thread feeding a bounded sample buffer
//! - [`overlay`] - status overlay toggle
//! - [`fixation`] - background listener for the latest fixation
//! - [`tracker`] - [`EyeTracker`], which ties the above to one device
//! - [`api`] - integer status-code entry points over [`EyeTracker`]
//!
//! # Example
//!
//! ```no_run
//! use eyetracker::{CalibrationRequest, EyeTracker, TrackerConfig};
//! use hardware::sim::{LoggingSurface, SimConfig, SimulatedTracker};
//! use shared::{EyeMode, PointLayout, WaitTimeout};
//!
//! let tracker = EyeTracker::new(
//!     Box::new(SimulatedTracker::new(SimConfig::default())),
//!     Box::new(LoggingSurface::new(1280, 1024)),
//!     TrackerConfig::default(),
//! )?;
//! tracker.open()?;
//! tracker.start_calibration(CalibrationRequest::new(9, PointLayout::Center, EyeMode::Both))?;
//! let result = tracker.wait_for_calibration(WaitTimeout::Infinite)?;
//! println!("calibration {:?}", result.outcome);
//!
//! tracker.set_streaming(true)?;
//! let sample = tracker.wait_for_sample(WaitTimeout::Millis(1000))?;
//! println!("sample at {}", sample.timestamp());
//! tracker.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod api;
pub mod calibration;
pub mod config;
pub mod decode;
pub mod error;
pub mod fixation;
pub mod overlay;
pub mod session;
pub mod streaming;
mod surface;
pub mod tracker;

pub use api::{CalibrationStatus, EtApi};
pub use calibration::{
    CalibrationController, CalibrationOutcome, CalibrationQuality, CalibrationRequest,
    CalibrationResult, CalibrationState, PointReport,
};
pub use config::{ConfigError, TrackerConfig};
pub use error::{StatusCode, TrackerError, TrackerResult};
pub use fixation::{Fixation, FixationMonitor};
pub use overlay::StatusOverlay;
pub use session::{DeviceSession, SessionObserver};
pub use streaming::StreamingController;
pub use tracker::EyeTracker;
