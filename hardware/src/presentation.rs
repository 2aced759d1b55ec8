//! Presentation surface interface.
//!
//! The surface draws what the subject sees during calibration (background,
//! targets, optional audio cue) and the small status overlay that shows the
//! tracker's view of the subject's eyes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use shared::{CalibrationPoint, Rgb};
use thiserror::Error;

/// Errors reported by a presentation surface.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("Display unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to load background image {path}: {reason}")]
    ImageLoad { path: PathBuf, reason: String },

    #[error("Rendering failed: {0}")]
    Render(String),
}

/// Result type for surface operations.
pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// Visual settings for one calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStyle {
    pub background: Rgb,
    pub point: Rgb,
    /// Image drawn instead of the plain background, if any
    pub background_image: Option<PathBuf>,
    /// Targets move and shrink more slowly
    pub slow_mode: bool,
    /// Play a cue when each point is accepted or rejected
    pub audio_feedback: bool,
}

/// Placement of the status overlay window in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayGeometry {
    pub x: i32,
    pub y: i32,
    pub size: u32,
    /// 0 (transparent) to 100 (opaque)
    pub opacity: u8,
}

/// Interface to whatever renders calibration visuals and the status overlay.
pub trait PresentationSurface: Send {
    /// Prepare the full-screen calibration view.
    fn begin_calibration(&mut self, style: &CalibrationStyle) -> SurfaceResult<()>;

    /// Draw the target for `point`. `ordinal` counts presentations from 1.
    fn show_point(
        &mut self,
        point: &CalibrationPoint,
        ordinal: usize,
        total: usize,
    ) -> SurfaceResult<()>;

    /// Audio cue after a point has been evaluated.
    fn play_feedback(&mut self, accepted: bool) -> SurfaceResult<()>;

    /// Tear down the calibration view.
    fn end_calibration(&mut self) -> SurfaceResult<()>;

    fn show_status_overlay(&mut self, geometry: &OverlayGeometry) -> SurfaceResult<()>;

    fn hide_status_overlay(&mut self) -> SurfaceResult<()>;
}

impl<T: PresentationSurface + ?Sized> PresentationSurface for Box<T> {
    fn begin_calibration(&mut self, style: &CalibrationStyle) -> SurfaceResult<()> {
        (**self).begin_calibration(style)
    }

    fn show_point(
        &mut self,
        point: &CalibrationPoint,
        ordinal: usize,
        total: usize,
    ) -> SurfaceResult<()> {
        (**self).show_point(point, ordinal, total)
    }

    fn play_feedback(&mut self, accepted: bool) -> SurfaceResult<()> {
        (**self).play_feedback(accepted)
    }

    fn end_calibration(&mut self) -> SurfaceResult<()> {
        (**self).end_calibration()
    }

    fn show_status_overlay(&mut self, geometry: &OverlayGeometry) -> SurfaceResult<()> {
        (**self).show_status_overlay(geometry)
    }

    fn hide_status_overlay(&mut self) -> SurfaceResult<()> {
        (**self).hide_status_overlay()
    }
}
