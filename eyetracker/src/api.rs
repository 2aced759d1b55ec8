//! Flat entry points with integer status codes.
//!
//! Mirrors the vendor C interface: raw numeric parameters in, a
//! [`StatusCode`] out, results through out-values. Timeouts are raw
//! milliseconds where any negative value or `0xFFFF_FFFF` waits forever.

use std::path::PathBuf;

use hardware::{PresentationSurface, TrackingDevice};
use shared::{EyeMode, PointLayout, Rgb, Sample, WaitTimeout};
use tracing::debug;

use crate::calibration::{CalibrationQuality, CalibrationRequest};
use crate::config::{ConfigError, TrackerConfig};
use crate::error::{StatusCode, TrackerError, TrackerResult};
use crate::tracker::EyeTracker;

/// Calibration status written by [`EtApi::wait_for_calibration_result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationStatus {
    /// Quality grade as its numeric code (0 = Excellent .. 4 = Failed)
    pub status: i32,
    pub improve: bool,
}

/// Status-code interface over an [`EyeTracker`].
pub struct EtApi {
    tracker: EyeTracker,
}

fn status<T>(result: TrackerResult<T>) -> StatusCode {
    if let Err(e) = &result {
        debug!("API call failed: {e}");
    }
    StatusCode::of(&result)
}

impl EtApi {
    pub fn new(
        device: Box<dyn TrackingDevice>,
        surface: Box<dyn PresentationSurface>,
        config: TrackerConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            tracker: EyeTracker::new(device, surface, config)?,
        })
    }

    /// The engine behind the flat interface.
    pub fn tracker(&self) -> &EyeTracker {
        &self.tracker
    }

    pub fn open(&self) -> StatusCode {
        status(self.tracker.open())
    }

    pub fn close(&self) {
        self.tracker.close();
    }

    pub fn is_open(&self) -> bool {
        self.tracker.is_open()
    }

    /// Returns (major, minor, build, device type).
    pub fn version(&self) -> (StatusCode, Option<(i64, i64, i64, i64)>) {
        match self.tracker.version() {
            Ok(v) => (
                StatusCode::Success,
                Some((v.major, v.minor, v.build, v.device_type)),
            ),
            Err(e) => (e.status_code(), None),
        }
    }

    /// Start a calibration run. Colors are COLORREF values (0x00BBGGRR); an
    /// empty image name means no background image.
    #[allow(clippy::too_many_arguments)]
    pub fn perform_calibration(
        &self,
        point_count: i64,
        location: i32,
        randomize: bool,
        slow_mode: bool,
        audio_feedback: bool,
        eye: i32,
        improvement_allowed: bool,
        skip_bad_points: bool,
        auto_calibration: bool,
        background_color: u32,
        point_color: u32,
        image_name: &str,
    ) -> StatusCode {
        let request = (|| -> TrackerResult<CalibrationRequest> {
            let layout = PointLayout::from_raw(location).ok_or_else(|| {
                TrackerError::InvalidParameters(format!("location {location}"))
            })?;
            let eye = EyeMode::from_raw(eye)
                .ok_or_else(|| TrackerError::InvalidParameters(format!("eye {eye}")))?;
            let point_count = usize::try_from(point_count).map_err(|_| {
                TrackerError::InvalidParameters(format!("point count {point_count}"))
            })?;
            Ok(CalibrationRequest {
                point_count,
                layout,
                eye,
                randomize,
                shuffle_seed: None,
                slow_mode,
                audio_feedback,
                allow_improvement: improvement_allowed,
                skip_bad_points,
                auto_calibration,
                background: Rgb::from_colorref(background_color),
                point_color: Rgb::from_colorref(point_color),
                background_image: (!image_name.is_empty()).then(|| PathBuf::from(image_name)),
            })
        })();

        // Closed session takes precedence over bad parameters
        if !self.tracker.is_open() {
            return StatusCode::NotOpen;
        }
        status(request.and_then(|r| self.tracker.start_calibration(r)))
    }

    /// Wait for the calibration result.
    pub fn wait_for_calibration_result(
        &self,
        timeout_ms: i64,
    ) -> (StatusCode, Option<CalibrationStatus>) {
        match self
            .tracker
            .wait_for_calibration(WaitTimeout::from_raw_millis(timeout_ms))
        {
            Ok(result) => (
                StatusCode::Success,
                Some(CalibrationStatus {
                    status: result.quality.code(),
                    improve: result.improvement_offered,
                }),
            ),
            Err(TrackerError::Cancelled) => (
                StatusCode::Failure,
                Some(CalibrationStatus {
                    status: CalibrationQuality::Failed.code(),
                    improve: false,
                }),
            ),
            Err(e) => (e.status_code(), None),
        }
    }

    pub fn set_streaming(&self, enabled: bool) -> StatusCode {
        status(self.tracker.set_streaming(enabled))
    }

    pub fn clear_data_buffer(&self) -> StatusCode {
        status(self.tracker.clear_buffer())
    }

    pub fn wait_for_data(&self, timeout_ms: i64) -> (StatusCode, Option<Sample>) {
        match self
            .tracker
            .wait_for_sample(WaitTimeout::from_raw_millis(timeout_ms))
        {
            Ok(sample) => (StatusCode::Success, Some(sample)),
            Err(e) => (e.status_code(), None),
        }
    }

    pub fn show_status_overlay(&self, x: i64, y: i64, size: i64, opacity: i64) -> StatusCode {
        if !self.tracker.is_open() {
            return StatusCode::NotOpen;
        }
        let x = i32::try_from(x);
        let y = i32::try_from(y);
        let size = u32::try_from(size);
        let opacity = u8::try_from(opacity);
        match (x, y, size, opacity) {
            (Ok(x), Ok(y), Ok(size), Ok(opacity)) => {
                status(self.tracker.show_status_overlay(x, y, size, opacity))
            }
            _ => StatusCode::InvalidParameters,
        }
    }

    pub fn hide_status_overlay(&self) -> StatusCode {
        status(self.tracker.hide_status_overlay())
    }
}
