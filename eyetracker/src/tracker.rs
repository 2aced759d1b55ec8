//! The eye tracker engine.
//!
//! [`EyeTracker`] wires one [`DeviceSession`] to its calibration, streaming and
//! overlay controllers. Dropping it closes the session.

use std::sync::Arc;

use hardware::{DeviceVersion, OverlayGeometry, PresentationSurface, TrackingDevice};
use shared::{Sample, WaitTimeout};

use crate::calibration::{
    CalibrationController, CalibrationOutcome, CalibrationRequest, CalibrationResult,
    CalibrationState,
};
use crate::config::{ConfigError, TrackerConfig};
use crate::error::TrackerResult;
use crate::fixation::FixationMonitor;
use crate::overlay::StatusOverlay;
use crate::session::DeviceSession;
use crate::streaming::StreamingController;
use crate::surface::SharedSurface;

/// Host-side control of one eye tracker.
pub struct EyeTracker {
    session: Arc<DeviceSession>,
    calibration: Arc<CalibrationController>,
    streaming: Arc<StreamingController>,
    overlay: Arc<StatusOverlay>,
}

impl EyeTracker {
    /// Build an engine around a device and a presentation surface.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if `config` does not validate.
    pub fn new(
        device: Box<dyn TrackingDevice>,
        surface: Box<dyn PresentationSurface>,
        config: TrackerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let session = Arc::new(DeviceSession::new(device));
        let surface = SharedSurface::new(surface);
        let streaming = StreamingController::new(session.clone(), &config);
        let calibration = CalibrationController::new(session.clone(), surface.clone(), config);
        let overlay = StatusOverlay::new(session.clone(), surface);

        Ok(Self {
            session,
            calibration,
            streaming,
            overlay,
        })
    }

    pub fn open(&self) -> TrackerResult<DeviceVersion> {
        self.session.open()
    }

    /// Stop streaming, cancel calibration, hide the overlay and release the
    /// device. Safe to call repeatedly.
    pub fn close(&self) {
        self.session.close();
    }

    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    pub fn version(&self) -> TrackerResult<DeviceVersion> {
        self.session.version()
    }

    pub fn start_calibration(&self, request: CalibrationRequest) -> TrackerResult<()> {
        self.calibration.start_calibration(request)
    }

    pub fn improve_calibration(&self) -> TrackerResult<()> {
        self.calibration.improve_calibration()
    }

    pub fn cancel_calibration(&self) -> TrackerResult<()> {
        self.calibration.cancel_calibration()
    }

    pub fn wait_for_calibration(&self, timeout: WaitTimeout) -> TrackerResult<CalibrationResult> {
        self.calibration.wait_for_result(timeout)
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration.state()
    }

    pub fn calibration_outcome(&self) -> CalibrationOutcome {
        self.calibration.outcome()
    }

    pub fn set_streaming(&self, enabled: bool) -> TrackerResult<()> {
        self.streaming.set_streaming(enabled)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_streaming()
    }

    pub fn clear_buffer(&self) -> TrackerResult<()> {
        self.streaming.clear_buffer()
    }

    pub fn wait_for_sample(&self, timeout: WaitTimeout) -> TrackerResult<Sample> {
        self.streaming.wait_for_sample(timeout)
    }

    /// Samples evicted from the full buffer since streaming first started.
    pub fn dropped_samples(&self) -> u64 {
        self.streaming.dropped_samples()
    }

    pub fn show_status_overlay(&self, x: i32, y: i32, size: u32, opacity: u8) -> TrackerResult<()> {
        self.overlay.show(x, y, size, opacity)
    }

    pub fn hide_status_overlay(&self) -> TrackerResult<()> {
        self.overlay.hide()
    }

    pub fn status_overlay(&self) -> Option<OverlayGeometry> {
        self.overlay.visible()
    }

    /// Start a listener that keeps the latest fixation from the stream.
    pub fn fixation_monitor(&self) -> TrackerResult<FixationMonitor> {
        FixationMonitor::spawn(self.streaming.clone())
    }
}

impl Drop for EyeTracker {
    fn drop(&mut self) {
        self.session.close();
    }
}
