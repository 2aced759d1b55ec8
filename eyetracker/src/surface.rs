//! Presentation surface shared between the calibration worker and the overlay.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use hardware::{PresentationSurface, SurfaceResult};

/// Cloneable handle to the single presentation surface.
#[derive(Clone)]
pub(crate) struct SharedSurface {
    inner: Arc<Mutex<Box<dyn PresentationSurface>>>,
}

impl SharedSurface {
    pub(crate) fn new(surface: Box<dyn PresentationSurface>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(surface)),
        }
    }

    /// Run `f` with exclusive access to the surface.
    pub(crate) fn with<R>(
        &self,
        f: impl FnOnce(&mut dyn PresentationSurface) -> SurfaceResult<R>,
    ) -> SurfaceResult<R> {
        let mut surface = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(surface.as_mut())
    }
}

impl fmt::Debug for SharedSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSurface")
    }
}
