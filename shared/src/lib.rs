//! Shared components for the gaze-control crates.
//!
//! Nothing in here knows about hardware. The types describe what flows between
//! the tracking device, the acquisition engine and the consuming application:
//!
//! - [`sample`] - decoded gaze and event telemetry
//! - [`sample_queue`] - bounded, drop-oldest FIFO with blocking reads
//! - [`timeout`] - finite or infinite wait durations
//! - [`calibration`] - point layouts, eye modes and calibration point geometry

pub mod calibration;
pub mod sample;
pub mod sample_queue;
pub mod timeout;

pub use calibration::{CalibrationPoint, EyeMode, PointLayout, Rgb};
pub use sample::{EventKind, EventSample, EyeSample, RawSample, Sample, SampleData};
pub use sample_queue::{QueueReadError, QueueReadResult, SampleQueue};
pub use timeout::WaitTimeout;
