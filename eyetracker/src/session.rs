//! Device session lifecycle.
//!
//! [`DeviceSession`] owns the tracking device and is the only place the
//! open/closed state changes. Controllers that run background work register as
//! [`SessionObserver`]s and are told to stop before the device is released, so
//! once `close` returns nothing is still talking to the hardware.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use hardware::{DeviceVersion, TrackingDevice};
use tracing::{debug, info, warn};

use crate::error::{TrackerError, TrackerResult};

/// Something that must wind down before the device is released.
pub trait SessionObserver: Send + Sync {
    /// Called by `close` before the device is disconnected.
    ///
    /// Must not return while a thread owned by the observer can still reach
    /// the device.
    fn session_closing(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Closed,
    Open(DeviceVersion),
    /// Teardown in progress; device access is refused
    Closing,
}

struct SessionInner {
    device: Box<dyn TrackingDevice>,
    state: SessionState,
}

/// Owned session with a tracking device.
pub struct DeviceSession {
    /// Serializes open and close against each other
    lifecycle: Mutex<()>,
    inner: Mutex<SessionInner>,
    observers: Mutex<Vec<Weak<dyn SessionObserver>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DeviceSession {
    /// Wrap a device. The session starts closed.
    pub fn new(device: Box<dyn TrackingDevice>) -> Self {
        Self {
            lifecycle: Mutex::new(()),
            inner: Mutex::new(SessionInner {
                device,
                state: SessionState::Closed,
            }),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Register an observer to be notified on close.
    ///
    /// Only a weak reference is kept; dropped observers are skipped.
    pub fn register(&self, observer: &Arc<dyn SessionObserver>) {
        let mut observers = lock(&self.observers);
        observers.retain(|o| o.strong_count() > 0);
        observers.push(Arc::downgrade(observer));
    }

    /// Connect to the device.
    ///
    /// # Errors
    /// `AlreadyOpen` if the session is open, `DeviceUnavailable` if the device
    /// cannot be reached.
    pub fn open(&self) -> TrackerResult<DeviceVersion> {
        let _lifecycle = lock(&self.lifecycle);
        let mut inner = lock(&self.inner);

        if inner.state != SessionState::Closed {
            return Err(TrackerError::AlreadyOpen);
        }

        let version = inner
            .device
            .connect()
            .map_err(|e| TrackerError::DeviceUnavailable(e.to_string()))?;
        inner.state = SessionState::Open(version);
        info!("Session opened, tracker version {version}");
        Ok(version)
    }

    /// Stop all background work, release the device and mark the session closed.
    ///
    /// Idempotent and fail-safe: a device that refuses to disconnect is logged
    /// and the session still ends up closed.
    pub fn close(&self) {
        let _lifecycle = lock(&self.lifecycle);

        {
            let mut inner = lock(&self.inner);
            if inner.state == SessionState::Closed {
                debug!("Close on a closed session ignored");
                return;
            }
            inner.state = SessionState::Closing;
        }

        // Observers join their threads, which may be waiting on the device lock
        let observers: Vec<_> = lock(&self.observers)
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for observer in observers {
            observer.session_closing();
        }

        let mut inner = lock(&self.inner);
        if let Err(e) = inner.device.disconnect() {
            warn!("Device disconnect failed during close: {e}");
        }
        inner.state = SessionState::Closed;
        info!("Session closed");
    }

    /// Never fails.
    pub fn is_open(&self) -> bool {
        matches!(lock(&self.inner).state, SessionState::Open(_))
    }

    /// Version reported by the device when the session was opened.
    pub fn version(&self) -> TrackerResult<DeviceVersion> {
        match lock(&self.inner).state {
            SessionState::Open(version) => Ok(version),
            _ => Err(TrackerError::NotOpen),
        }
    }

    /// Fail with `NotOpen` unless the session is open.
    pub fn ensure_open(&self) -> TrackerResult<()> {
        self.version().map(|_| ())
    }

    /// Run `f` with exclusive access to the device.
    ///
    /// Device errors are converted to [`TrackerError::Device`].
    pub fn with_device<R>(
        &self,
        f: impl FnOnce(&mut dyn TrackingDevice) -> hardware::DeviceResult<R>,
    ) -> TrackerResult<R> {
        let mut inner = lock(&self.inner);
        match inner.state {
            SessionState::Open(_) => Ok(f(inner.device.as_mut())?),
            _ => Err(TrackerError::NotOpen),
        }
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("state", &lock(&self.inner).state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardware::sim::{SimConfig, SimulatedTracker};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session(config: SimConfig) -> (DeviceSession, hardware::sim::SimProbe) {
        let sim = SimulatedTracker::new(config);
        let probe = sim.probe();
        (DeviceSession::new(Box::new(sim)), probe)
    }

    #[derive(Default)]
    struct CountingObserver {
        calls: AtomicUsize,
    }

    impl SessionObserver for CountingObserver {
        fn session_closing(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_open_and_version() {
        let (session, probe) = session(SimConfig::default());
        assert!(!session.is_open());
        assert_eq!(session.version(), Err(TrackerError::NotOpen));

        let version = session.open().unwrap();
        assert!(session.is_open());
        assert_eq!(session.version().unwrap(), version);
        assert!(probe.is_connected());
    }

    #[test]
    fn test_open_twice_is_rejected() {
        let (session, probe) = session(SimConfig::default());
        session.open().unwrap();
        assert_eq!(session.open(), Err(TrackerError::AlreadyOpen));
        assert_eq!(probe.stats().connects, 1);
    }

    #[test]
    fn test_unreachable_device() {
        let (session, _) = session(SimConfig {
            unreachable: true,
            ..SimConfig::default()
        });
        assert!(matches!(
            session.open(),
            Err(TrackerError::DeviceUnavailable(_))
        ));
        assert!(!session.is_open());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (session, probe) = session(SimConfig::default());
        session.close();
        session.open().unwrap();
        session.close();
        session.close();
        assert!(!session.is_open());
        assert_eq!(probe.stats().disconnects, 1);
    }

    #[test]
    fn test_device_access_requires_open() {
        let (session, _) = session(SimConfig::default());
        let result = session.with_device(|dev| dev.read_frame(std::time::Duration::ZERO));
        assert_eq!(result, Err(TrackerError::NotOpen));
    }

    #[test]
    fn test_observers_notified_once_per_close() {
        let (session, _) = session(SimConfig::default());
        let counter = Arc::new(CountingObserver::default());
        let observer: Arc<dyn SessionObserver> = counter.clone();
        session.register(&observer);

        session.open().unwrap();
        session.close();
        session.close();
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);

        drop(observer);
        drop(counter);
        session.open().unwrap();
        session.close();
    }

    #[test]
    fn test_reopen_after_close() {
        let (session, probe) = session(SimConfig::default());
        session.open().unwrap();
        session.close();
        session.open().unwrap();
        assert!(session.is_open());
        assert_eq!(probe.stats().connects, 2);
    }
}
