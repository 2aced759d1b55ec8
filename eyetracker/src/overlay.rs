//! Status overlay toggle.

use std::sync::{Arc, Mutex, PoisonError};

use hardware::OverlayGeometry;
use tracing::{debug, warn};

use crate::error::{TrackerError, TrackerResult};
use crate::session::{DeviceSession, SessionObserver};
use crate::surface::SharedSurface;

/// Shows and hides the tracker status window on the presentation surface.
pub struct StatusOverlay {
    session: Arc<DeviceSession>,
    surface: SharedSurface,
    visible: Mutex<Option<OverlayGeometry>>,
}

impl StatusOverlay {
    pub(crate) fn new(session: Arc<DeviceSession>, surface: SharedSurface) -> Arc<Self> {
        let overlay = Arc::new(Self {
            session: session.clone(),
            surface,
            visible: Mutex::new(None),
        });
        let observer: Arc<dyn SessionObserver> = overlay.clone();
        session.register(&observer);
        overlay
    }

    /// Show the overlay at (`x`, `y`) with edge length `size` and `opacity`
    /// in percent.
    ///
    /// # Errors
    /// `NotOpen`, `InvalidParameters` for a zero size or opacity above 100,
    /// `InternalFailure` if the surface cannot draw it.
    pub fn show(&self, x: i32, y: i32, size: u32, opacity: u8) -> TrackerResult<()> {
        self.session.ensure_open()?;
        if size == 0 {
            return Err(TrackerError::InvalidParameters(
                "overlay size must be > 0".to_string(),
            ));
        }
        if opacity > 100 {
            return Err(TrackerError::InvalidParameters(format!(
                "overlay opacity {opacity} outside 0..=100"
            )));
        }

        let geometry = OverlayGeometry {
            x,
            y,
            size,
            opacity,
        };
        let mut visible = self.visible.lock().unwrap_or_else(PoisonError::into_inner);
        // Close may have hidden the overlay since the first check
        self.session.ensure_open()?;
        self.surface
            .with(|s| s.show_status_overlay(&geometry))
            .map_err(|e| TrackerError::InternalFailure(e.to_string()))?;
        *visible = Some(geometry);
        debug!("Status overlay shown: {geometry:?}");
        Ok(())
    }

    pub fn hide(&self) -> TrackerResult<()> {
        self.session.ensure_open()?;
        self.surface
            .with(|s| s.hide_status_overlay())
            .map_err(|e| TrackerError::InternalFailure(e.to_string()))?;
        *self.visible.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    /// Geometry of the overlay if it is showing.
    pub fn visible(&self) -> Option<OverlayGeometry> {
        *self.visible.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionObserver for StatusOverlay {
    fn session_closing(&self) {
        let was_visible = self
            .visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if was_visible {
            if let Err(e) = self.surface.with(|s| s.hide_status_overlay()) {
                warn!("Failed to hide status overlay on close: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardware::sim::{RecordingSurface, SimConfig, SimulatedTracker, SurfaceEvent, SurfaceLog};

    fn overlay() -> (Arc<DeviceSession>, Arc<StatusOverlay>, SurfaceLog) {
        let session = Arc::new(DeviceSession::new(Box::new(SimulatedTracker::new(
            SimConfig::default(),
        ))));
        let surface = RecordingSurface::new();
        let log = surface.log();
        let overlay = StatusOverlay::new(session.clone(), SharedSurface::new(Box::new(surface)));
        (session, overlay, log)
    }

    #[test]
    fn test_requires_open_session() {
        let (_session, overlay, log) = overlay();
        assert_eq!(overlay.show(0, 0, 100, 50), Err(TrackerError::NotOpen));
        assert_eq!(overlay.hide(), Err(TrackerError::NotOpen));
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn test_parameter_validation() {
        let (session, overlay, log) = overlay();
        session.open().unwrap();
        assert!(matches!(
            overlay.show(0, 0, 0, 50),
            Err(TrackerError::InvalidParameters(_))
        ));
        assert!(matches!(
            overlay.show(0, 0, 100, 101),
            Err(TrackerError::InvalidParameters(_))
        ));
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn test_show_and_hide() {
        let (session, overlay, log) = overlay();
        session.open().unwrap();
        overlay.show(10, 20, 200, 80).unwrap();
        assert_eq!(overlay.visible().map(|g| g.size), Some(200));
        overlay.hide().unwrap();
        assert_eq!(overlay.visible(), None);

        let events = log.snapshot();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SurfaceEvent::ShowOverlay(g) if g.x == 10 && g.opacity == 80));
        assert_eq!(events[1], SurfaceEvent::HideOverlay);
    }

    #[test]
    fn test_close_hides_visible_overlay() {
        let (session, overlay, log) = overlay();
        session.open().unwrap();
        overlay.show(0, 0, 100, 100).unwrap();
        session.close();
        assert_eq!(overlay.visible(), None);
        assert_eq!(log.count(&SurfaceEvent::HideOverlay), 1);

        session.open().unwrap();
        session.close();
        assert_eq!(log.count(&SurfaceEvent::HideOverlay), 1);
    }

    #[test]
    fn test_show_racing_close_never_left_visible() {
        let (session, overlay, _) = overlay();
        for _ in 0..50 {
            session.open().unwrap();
            let shower = {
                let overlay = overlay.clone();
                std::thread::spawn(move || overlay.show(0, 0, 100, 50))
            };
            session.close();
            let _ = shower.join().unwrap();
            assert_eq!(overlay.visible(), None);
        }
    }
}
