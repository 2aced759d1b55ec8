//! Tracking device interface.
//!
//! Abstracts the eye tracker hardware so the session, calibration and streaming
//! logic can run against real drivers and simulated devices alike.
//!
//! # Data Format
//!
//! The device reports one flat [`RawFrame`] per sample tick. Each frame carries
//! the raw binocular gaze measurement plus the fields of the most recent event
//! closed by the device's event detector. The event fields repeat on every
//! frame until a new event closes; the consumer is responsible for emitting
//! each event once.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared::{CalibrationPoint, EyeMode};
use thiserror::Error;

/// Errors reported by a tracking device.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// The device could not be reached or refused the connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation attempted without an established connection.
    #[error("Device not connected")]
    NotConnected,

    /// The connection dropped while in use.
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    /// Device response did not match the expected format.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Device refused a calibration.
    #[error("Calibration rejected: {0}")]
    CalibrationRejected(String),
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Firmware / API version reported by the device on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceVersion {
    pub major: i64,
    pub minor: i64,
    pub build: i64,
    /// Vendor device type code
    pub device_type: i64,
}

impl fmt::Display for DeviceVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}.{}.{} (device {})",
            self.major, self.minor, self.build, self.device_type
        )
    }
}

/// One sample tick as delivered by the device.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawFrame {
    // Raw data
    pub raw_timestamp: i64,
    pub gaze_x: f64,
    pub gaze_y: f64,
    pub left_x: f64,
    pub left_y: f64,
    pub left_confidence: f64,
    pub left_pupil_diameter: f64,
    pub right_x: f64,
    pub right_y: f64,
    pub right_confidence: f64,
    pub right_pupil_diameter: f64,
    // Most recent event
    pub event_id: i32,
    pub event_timestamp: i64,
    pub event_duration: i64,
    pub event_x: f64,
    pub event_y: f64,
    pub dispersion_x: f64,
    pub dispersion_y: f64,
    pub event_confidence: f64,
}

/// One measurement taken while the subject looks at a calibration target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceSample {
    /// Measurement confidence, 0.0 to 1.0
    pub confidence: f64,
    /// Raw gaze offset from the target, normalized screen units
    pub offset_x: f64,
    pub offset_y: f64,
}

/// A calibration point that passed acceptance, with its averaged measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcceptedPoint {
    pub point: CalibrationPoint,
    pub mean_offset_x: f64,
    pub mean_offset_y: f64,
    pub mean_confidence: f64,
}

/// Complete calibration handed to the device once a run has succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCalibration {
    pub eye: EyeMode,
    pub points: Vec<AcceptedPoint>,
}

/// Interface to eye tracker hardware.
///
/// Implementations are driven from more than one thread (sampling and
/// calibration) but never concurrently: the owning session serializes access.
pub trait TrackingDevice: Send {
    /// Establish the connection and report the device version.
    fn connect(&mut self) -> DeviceResult<DeviceVersion>;

    /// Release the connection. Must tolerate an already-dropped link.
    fn disconnect(&mut self) -> DeviceResult<()>;

    /// Wait up to `timeout` for the next frame.
    ///
    /// Returns `Ok(None)` if no frame arrived in time.
    fn read_frame(&mut self, timeout: Duration) -> DeviceResult<Option<RawFrame>>;

    /// Check whether the subject's gaze has settled on `point`.
    fn fixation_settled(&mut self, point: &CalibrationPoint) -> DeviceResult<bool>;

    /// Collect acceptance measurements for `point` over `window`.
    fn acquire_point(
        &mut self,
        point: &CalibrationPoint,
        eye: EyeMode,
        window: Duration,
    ) -> DeviceResult<Vec<AcceptanceSample>>;

    /// Make `calibration` the active calibration, replacing any previous one.
    fn apply_calibration(&mut self, calibration: &DeviceCalibration) -> DeviceResult<()>;
}

impl<T: TrackingDevice + ?Sized> TrackingDevice for Box<T> {
    fn connect(&mut self) -> DeviceResult<DeviceVersion> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> DeviceResult<()> {
        (**self).disconnect()
    }

    fn read_frame(&mut self, timeout: Duration) -> DeviceResult<Option<RawFrame>> {
        (**self).read_frame(timeout)
    }

    fn fixation_settled(&mut self, point: &CalibrationPoint) -> DeviceResult<bool> {
        (**self).fixation_settled(point)
    }

    fn acquire_point(
        &mut self,
        point: &CalibrationPoint,
        eye: EyeMode,
        window: Duration,
    ) -> DeviceResult<Vec<AcceptanceSample>> {
        (**self).acquire_point(point, eye, window)
    }

    fn apply_calibration(&mut self, calibration: &DeviceCalibration) -> DeviceResult<()> {
        (**self).apply_calibration(calibration)
    }
}
