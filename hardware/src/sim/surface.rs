//! Presentation surfaces that draw nothing.
//!
//! [`RecordingSurface`] keeps every call for later inspection; [`LoggingSurface`]
//! reports calls through `tracing` so a headless demo shows what a subject
//! would have seen.

use std::sync::{Arc, Mutex, PoisonError};

use shared::CalibrationPoint;
use tracing::{debug, info};

use crate::presentation::{CalibrationStyle, OverlayGeometry, PresentationSurface, SurfaceResult};

/// One call received by a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    BeginCalibration(CalibrationStyle),
    ShowPoint {
        index: usize,
        ordinal: usize,
        total: usize,
    },
    Feedback {
        accepted: bool,
    },
    EndCalibration,
    ShowOverlay(OverlayGeometry),
    HideOverlay,
}

/// Shared log of calls made to a [`RecordingSurface`].
#[derive(Debug, Clone, Default)]
pub struct SurfaceLog {
    events: Arc<Mutex<Vec<SurfaceEvent>>>,
}

impl SurfaceLog {
    pub fn snapshot(&self) -> Vec<SurfaceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Point indices in the order they were shown.
    pub fn shown_points(&self) -> Vec<usize> {
        self.snapshot()
            .into_iter()
            .filter_map(|event| match event {
                SurfaceEvent::ShowPoint { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &SurfaceEvent) -> usize {
        self.snapshot().iter().filter(|e| *e == wanted).count()
    }

    fn push(&self, event: SurfaceEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Surface that records every call.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    log: SurfaceLog,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the call log, usable after the surface has been handed off.
    pub fn log(&self) -> SurfaceLog {
        self.log.clone()
    }
}

impl PresentationSurface for RecordingSurface {
    fn begin_calibration(&mut self, style: &CalibrationStyle) -> SurfaceResult<()> {
        self.log.push(SurfaceEvent::BeginCalibration(style.clone()));
        Ok(())
    }

    fn show_point(
        &mut self,
        point: &CalibrationPoint,
        ordinal: usize,
        total: usize,
    ) -> SurfaceResult<()> {
        self.log.push(SurfaceEvent::ShowPoint {
            index: point.index,
            ordinal,
            total,
        });
        Ok(())
    }

    fn play_feedback(&mut self, accepted: bool) -> SurfaceResult<()> {
        self.log.push(SurfaceEvent::Feedback { accepted });
        Ok(())
    }

    fn end_calibration(&mut self) -> SurfaceResult<()> {
        self.log.push(SurfaceEvent::EndCalibration);
        Ok(())
    }

    fn show_status_overlay(&mut self, geometry: &OverlayGeometry) -> SurfaceResult<()> {
        self.log.push(SurfaceEvent::ShowOverlay(*geometry));
        Ok(())
    }

    fn hide_status_overlay(&mut self) -> SurfaceResult<()> {
        self.log.push(SurfaceEvent::HideOverlay);
        Ok(())
    }
}

/// Surface that logs every call.
#[derive(Debug, Default)]
pub struct LoggingSurface {
    width: u32,
    height: u32,
}

impl LoggingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl PresentationSurface for LoggingSurface {
    fn begin_calibration(&mut self, style: &CalibrationStyle) -> SurfaceResult<()> {
        info!(
            "Calibration screen: background {:?}, point {:?}, image {:?}",
            style.background, style.point, style.background_image
        );
        Ok(())
    }

    fn show_point(
        &mut self,
        point: &CalibrationPoint,
        ordinal: usize,
        total: usize,
    ) -> SurfaceResult<()> {
        let (px, py) = point.to_pixels(self.width, self.height);
        info!("Target {ordinal}/{total} at ({px:.0}, {py:.0})");
        Ok(())
    }

    fn play_feedback(&mut self, accepted: bool) -> SurfaceResult<()> {
        debug!("Feedback tone: {}", if accepted { "accept" } else { "reject" });
        Ok(())
    }

    fn end_calibration(&mut self) -> SurfaceResult<()> {
        info!("Calibration screen closed");
        Ok(())
    }

    fn show_status_overlay(&mut self, geometry: &OverlayGeometry) -> SurfaceResult<()> {
        info!(
            "Status overlay at ({}, {}) size {} opacity {}%",
            geometry.x, geometry.y, geometry.size, geometry.opacity
        );
        Ok(())
    }

    fn hide_status_overlay(&mut self) -> SurfaceResult<()> {
        info!("Status overlay hidden");
        Ok(())
    }
}
