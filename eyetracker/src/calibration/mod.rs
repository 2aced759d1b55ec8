//! Calibration workflow.
//!
//! [`CalibrationController`] runs one calibration at a time on a worker thread
//! and publishes its progress as a [`CalibrationState`]:
//!
//! ```text
//! Idle -> PointPresentation -> Evaluating -> Completed
//!                   |               |------> ImprovementOffered
//!                   |               `------> Failed
//!                   `-----------> Failed | Cancelled
//! ```
//!
//! States only move forward within a run. A terminal result stays observable
//! until the next run is started, and every waiter sees the same result.

mod quality;
mod request;
mod run;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use shared::WaitTimeout;
use tracing::{debug, info, warn};

pub use quality::{CalibrationQuality, PointMeasurement, PointReport};
pub use request::CalibrationRequest;

use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::session::{DeviceSession, SessionObserver};
use crate::surface::SharedSurface;
use run::{CalibrationRun, RunContext};

/// Progress of the current or most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CalibrationState {
    Idle,
    PointPresentation,
    Evaluating,
    Completed,
    ImprovementOffered,
    Failed,
    Cancelled,
}

impl CalibrationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CalibrationState::Completed
                | CalibrationState::ImprovementOffered
                | CalibrationState::Failed
                | CalibrationState::Cancelled
        )
    }

    /// A run is in progress.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            CalibrationState::PointPresentation | CalibrationState::Evaluating
        )
    }
}

/// Final outcome of a run. `Pending` while it is still in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationOutcome {
    Pending,
    Succeeded,
    Failed,
    ImprovementOffered,
    Cancelled,
}

impl CalibrationOutcome {
    fn terminal_state(self) -> CalibrationState {
        match self {
            CalibrationOutcome::Pending => CalibrationState::Evaluating,
            CalibrationOutcome::Succeeded => CalibrationState::Completed,
            CalibrationOutcome::Failed => CalibrationState::Failed,
            CalibrationOutcome::ImprovementOffered => CalibrationState::ImprovementOffered,
            CalibrationOutcome::Cancelled => CalibrationState::Cancelled,
        }
    }
}

/// Result of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub outcome: CalibrationOutcome,
    pub quality: CalibrationQuality,
    pub improvement_offered: bool,
    /// Per-point reports in layout order, including points carried over from
    /// an improved run
    pub points: Vec<PointReport>,
    /// Why the run failed, if it did
    pub failure: Option<String>,
}

struct ControllerStatus {
    state: CalibrationState,
    /// Incremented for every run started
    run_id: u64,
    /// Incremented whenever a session close discards the run
    epoch: u64,
    result: Option<CalibrationResult>,
    request: Option<CalibrationRequest>,
    /// Dropped to cancel the running worker
    cancel: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    status: Mutex<ControllerStatus>,
    finished: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, run_id: u64, state: CalibrationState) {
        let mut status = self.lock();
        if status.run_id == run_id && state > status.state && !status.state.is_terminal() {
            debug!("Calibration run {run_id}: {:?} -> {state:?}", status.state);
            status.state = state;
        }
    }

    fn complete(&self, run_id: u64, result: CalibrationResult) {
        let mut status = self.lock();
        if status.run_id != run_id || status.state.is_terminal() {
            return;
        }
        status.state = result.outcome.terminal_state();
        status.result = Some(result);
        status.cancel = None;
        drop(status);
        self.finished.notify_all();
    }
}

/// Runs calibrations against an open session.
pub struct CalibrationController {
    session: Arc<DeviceSession>,
    surface: SharedSurface,
    config: TrackerConfig,
    shared: Arc<Shared>,
}

impl CalibrationController {
    /// Create a controller and register it to be cancelled on session close.
    pub(crate) fn new(
        session: Arc<DeviceSession>,
        surface: SharedSurface,
        config: TrackerConfig,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            session: session.clone(),
            surface,
            config,
            shared: Arc::new(Shared {
                status: Mutex::new(ControllerStatus {
                    state: CalibrationState::Idle,
                    run_id: 0,
                    epoch: 0,
                    result: None,
                    request: None,
                    cancel: None,
                    worker: None,
                }),
                finished: Condvar::new(),
            }),
        });
        let observer: Arc<dyn SessionObserver> = controller.clone();
        session.register(&observer);
        controller
    }

    /// Start a run in the background.
    ///
    /// # Errors
    /// `NotOpen`, `InvalidParameters` for a bad request, `SessionBusy` while
    /// another run is in progress.
    pub fn start_calibration(&self, request: CalibrationRequest) -> TrackerResult<()> {
        self.session.ensure_open()?;
        let points = request.validate()?;

        let mut status = self.shared.lock();
        if status.state.is_running() {
            return Err(TrackerError::SessionBusy);
        }
        let run = CalibrationRun::new(request.clone(), points);
        self.launch(&mut status, run, request)
    }

    /// Re-run the rejected points of a run that ended with an improvement offer.
    ///
    /// # Errors
    /// `NotOpen`, `SessionBusy` while a run is in progress, `InvalidParameters`
    /// when the last run did not offer an improvement.
    pub fn improve_calibration(&self) -> TrackerResult<()> {
        self.session.ensure_open()?;

        let mut status = self.shared.lock();
        if status.state.is_running() {
            return Err(TrackerError::SessionBusy);
        }
        let (request, previous) = match (&status.state, &status.request, &status.result) {
            (CalibrationState::ImprovementOffered, Some(request), Some(result)) => {
                (request.clone(), result.points.clone())
            }
            _ => {
                return Err(TrackerError::InvalidParameters(
                    "no calibration improvement on offer".to_string(),
                ))
            }
        };
        let run = CalibrationRun::improvement(request.clone(), &previous);
        self.launch(&mut status, run, request)
    }

    fn launch(
        &self,
        status: &mut ControllerStatus,
        run: CalibrationRun,
        request: CalibrationRequest,
    ) -> TrackerResult<()> {
        // Close may have reset the controller since the caller's check
        self.session.ensure_open()?;

        // The previous worker has already published its result
        if let Some(handle) = status.worker.take() {
            if handle.join().is_err() {
                warn!("Calibration worker panicked");
            }
        }

        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);
        let run_id = status.run_id + 1;
        let ctx = RunContext {
            session: self.session.clone(),
            surface: self.surface.clone(),
            config: self.config.clone(),
            cancel: cancel_rx,
        };
        let shared = self.shared.clone();

        let handle = thread::Builder::new()
            .name("calibration".to_string())
            .spawn(move || {
                let result = run.execute(&ctx, |state| shared.advance(run_id, state));
                shared.complete(run_id, result);
            })
            .map_err(|e| TrackerError::InternalFailure(format!("spawn calibration: {e}")))?;

        status.run_id = run_id;
        status.state = CalibrationState::PointPresentation;
        status.result = None;
        status.request = Some(request);
        status.cancel = Some(cancel_tx);
        status.worker = Some(handle);
        info!("Calibration run {run_id} launched");
        Ok(())
    }

    /// Block until the current run finishes or `timeout` elapses.
    ///
    /// Returns the same result on every call once the run has finished.
    ///
    /// # Errors
    /// `NotOpen`, `NoCalibration` if no run was ever started, `TimedOut`,
    /// `Cancelled` if the run was cancelled.
    pub fn wait_for_result(&self, timeout: WaitTimeout) -> TrackerResult<CalibrationResult> {
        self.session.ensure_open()?;
        let deadline = timeout.as_duration().map(|d| Instant::now() + d);

        let mut status = self.shared.lock();
        let epoch = status.epoch;
        loop {
            if status.epoch != epoch {
                return Err(TrackerError::Cancelled);
            }
            if status.state.is_terminal() {
                return match &status.result {
                    Some(result) if result.outcome == CalibrationOutcome::Cancelled => {
                        Err(TrackerError::Cancelled)
                    }
                    Some(result) => Ok(result.clone()),
                    None => Err(TrackerError::InternalFailure(
                        "terminal calibration without result".to_string(),
                    )),
                };
            }
            if status.state == CalibrationState::Idle {
                return Err(TrackerError::NoCalibration);
            }

            status = match deadline {
                None => self
                    .shared
                    .finished
                    .wait(status)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TrackerError::TimedOut);
                    }
                    self.shared
                        .finished
                        .wait_timeout(status, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Cancel the running calibration and wait for its worker to stop.
    ///
    /// A no-op when nothing is running.
    pub fn cancel_calibration(&self) -> TrackerResult<()> {
        self.session.ensure_open()?;
        self.stop_worker();
        Ok(())
    }

    pub fn state(&self) -> CalibrationState {
        self.shared.lock().state
    }

    /// Outcome of the current or most recent run.
    pub fn outcome(&self) -> CalibrationOutcome {
        self.shared
            .lock()
            .result
            .as_ref()
            .map_or(CalibrationOutcome::Pending, |r| r.outcome)
    }

    pub fn last_result(&self) -> Option<CalibrationResult> {
        self.shared.lock().result.clone()
    }

    fn stop_worker(&self) {
        let handle = {
            let mut status = self.shared.lock();
            if status.cancel.take().is_some() {
                debug!("Cancelling calibration run {}", status.run_id);
            }
            status.worker.take()
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Calibration worker panicked");
            }
        }
    }
}

impl SessionObserver for CalibrationController {
    fn session_closing(&self) {
        self.stop_worker();

        let mut status = self.shared.lock();
        if status.state != CalibrationState::Idle {
            status.state = CalibrationState::Idle;
            status.result = None;
            status.request = None;
            status.epoch += 1;
        }
        drop(status);
        self.shared.finished.notify_all();
    }
}
