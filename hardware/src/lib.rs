//! Collaborator contracts for the eye-tracking engine.
//!
//! The engine never talks to a transport directly. It drives two collaborators:
//!
//! - [`TrackingDevice`] - the tracker itself: connection lifecycle, raw frames,
//!   calibration point acquisition and applying a finished calibration
//! - [`PresentationSurface`] - whatever draws calibration targets and the
//!   status overlay for the subject
//!
//! # Features
//!
//! - `sim` (default) - [`sim::SimulatedTracker`], [`sim::RecordingSurface`] and
//!   [`sim::LoggingSurface`] for tests and demos without hardware

pub mod presentation;
pub mod tracking_device;

#[cfg(feature = "sim")]
pub mod sim;

pub use presentation::{
    CalibrationStyle, OverlayGeometry, PresentationSurface, SurfaceError, SurfaceResult,
};
pub use tracking_device::{
    AcceptanceSample, AcceptedPoint, DeviceCalibration, DeviceError, DeviceResult, DeviceVersion,
    RawFrame, TrackingDevice,
};
