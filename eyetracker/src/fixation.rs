//! Background fixation listener.
//!
//! Feedback applications usually only care where the subject last fixated.
//! [`FixationMonitor`] drains the sample stream on its own thread and keeps the
//! most recent fixation event for polling.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crossbeam_channel::{Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use shared::{EventKind, WaitTimeout};
use tracing::{debug, info, warn};

use crate::error::{TrackerError, TrackerResult};
use crate::streaming::StreamingController;

/// Default per-read wait of the listener thread
pub const DEFAULT_LISTEN_WAIT: Duration = Duration::from_secs(1);

/// Most recent fixation seen on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fixation {
    pub x: f64,
    pub y: f64,
    /// Fixation duration in milliseconds
    pub duration: i64,
    /// Device timestamp of the fixation in milliseconds
    pub timestamp: i64,
    /// Wall-clock time the fixation was received
    pub received_at: SystemTime,
}

#[derive(Debug, Default)]
struct MonitorState {
    latest: Option<Fixation>,
    fixations: u64,
    error: Option<TrackerError>,
}

/// Keeps the latest fixation from a streaming controller.
///
/// The listener thread stops on [`FixationMonitor::stop`], on drop, or when
/// the stream reports an error other than a timeout.
pub struct FixationMonitor {
    state: Arc<Mutex<MonitorState>>,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

fn lock(state: &Mutex<MonitorState>) -> MutexGuard<'_, MonitorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FixationMonitor {
    /// Start listening with [`DEFAULT_LISTEN_WAIT`] per read.
    pub fn spawn(streaming: Arc<StreamingController>) -> TrackerResult<Self> {
        Self::spawn_with_wait(streaming, DEFAULT_LISTEN_WAIT)
    }

    /// Start listening. `wait` bounds each read and so how long `stop` takes.
    pub fn spawn_with_wait(
        streaming: Arc<StreamingController>,
        wait: Duration,
    ) -> TrackerResult<Self> {
        let state = Arc::new(Mutex::new(MonitorState::default()));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let thread_state = state.clone();

        let handle = thread::Builder::new()
            .name("fixation-monitor".to_string())
            .spawn(move || {
                debug!("Fixation monitor listening");
                while let Err(TryRecvError::Empty) = stop_rx.try_recv() {
                    match streaming.wait_for_sample(WaitTimeout::from(wait)) {
                        Ok(sample) => {
                            let Some(event) = sample.as_event() else {
                                continue;
                            };
                            if event.kind != EventKind::Fixation {
                                continue;
                            }
                            let mut s = lock(&thread_state);
                            s.latest = Some(Fixation {
                                x: event.x,
                                y: event.y,
                                duration: event.duration,
                                timestamp: event.timestamp,
                                received_at: SystemTime::now(),
                            });
                            s.fixations += 1;
                        }
                        Err(TrackerError::TimedOut) => {}
                        Err(e) => {
                            warn!("Fixation monitor stopped: {e}");
                            lock(&thread_state).error = Some(e);
                            break;
                        }
                    }
                }
                debug!("Fixation monitor exiting");
            })
            .map_err(|e| TrackerError::InternalFailure(format!("spawn fixation monitor: {e}")))?;

        info!("Fixation monitor started");
        Ok(Self {
            state,
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn latest(&self) -> Option<Fixation> {
        lock(&self.state).latest
    }

    /// Number of fixations received so far.
    pub fn fixation_count(&self) -> u64 {
        lock(&self.state).fixations
    }

    /// Error that ended the listener, if any.
    pub fn last_error(&self) -> Option<TrackerError> {
        lock(&self.state).error.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop listening and wait for the thread to exit.
    pub fn stop(&mut self) {
        self.stop = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Fixation monitor thread panicked");
            }
        }
    }
}

impl Drop for FixationMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
