//! One calibration run, executed on the calibration worker thread.
//!
//! A run presents its points in order, measures each one through the device
//! and decides what to do with rejected points:
//!
//! - without skipping, a rejected point is shown again in place, and the run
//!   fails once it has used up its attempts
//! - with skipping, a rejected point moves to the end of the sequence, and is
//!   recorded as rejected once it has used up its deferrals
//!
//! Every point is therefore presented a bounded number of times and a run
//! always terminates. The device calibration is only replaced when the run
//! succeeds.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use hardware::DeviceCalibration;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use shared::CalibrationPoint;
use tracing::{debug, info, warn};

use super::quality::{accepted_fraction, overall_quality, PointMeasurement, PointReport};
use super::{
    CalibrationOutcome, CalibrationQuality, CalibrationRequest, CalibrationResult,
    CalibrationState,
};
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::session::DeviceSession;
use crate::surface::SharedSurface;

/// Everything a run needs from its surroundings.
pub(crate) struct RunContext {
    pub session: Arc<DeviceSession>,
    pub surface: SharedSurface,
    pub config: TrackerConfig,
    /// Disconnects when the run is cancelled
    pub cancel: Receiver<()>,
}

/// Why a run stopped before evaluation.
#[derive(Debug)]
enum Interrupt {
    Cancelled,
    Failed(String),
}

impl RunContext {
    fn is_cancelled(&self) -> bool {
        matches!(self.cancel.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `duration`, waking early on cancellation.
    fn pause(&self, duration: Duration) -> Result<(), Interrupt> {
        match self.cancel.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            _ => Err(Interrupt::Cancelled),
        }
    }

    fn check_cancelled(&self) -> Result<(), Interrupt> {
        if self.is_cancelled() {
            Err(Interrupt::Cancelled)
        } else {
            Ok(())
        }
    }

    /// A closed session during a cancelled run is part of the cancellation.
    fn interrupt(&self, err: TrackerError) -> Interrupt {
        if self.is_cancelled() {
            Interrupt::Cancelled
        } else {
            Interrupt::Failed(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingPoint {
    point: CalibrationPoint,
    /// 1-based position among the distinct points of this run
    ordinal: usize,
    presentations: u32,
    deferrals: u32,
}

/// Mutable state of one run.
#[derive(Debug)]
pub(crate) struct CalibrationRun {
    request: CalibrationRequest,
    pending: VecDeque<PendingPoint>,
    /// Accepted points kept from the run being improved
    carried: Vec<PointReport>,
    reports: Vec<PointReport>,
    total: usize,
}

impl CalibrationRun {
    /// Plan a fresh run over `points`, shuffled once if the request asks for it.
    pub(crate) fn new(request: CalibrationRequest, mut points: Vec<CalibrationPoint>) -> Self {
        if request.randomize {
            let seed = request.shuffle_seed.unwrap_or_else(rand::random);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            points.shuffle(&mut rng);
            debug!("Shuffled calibration points with seed {seed:#x}");
        }
        Self::plan(request, points, Vec::new())
    }

    /// Plan an improvement pass that re-presents the rejected points of a
    /// previous run, in the order they were reported, and keeps its accepted
    /// measurements.
    pub(crate) fn improvement(request: CalibrationRequest, previous: &[PointReport]) -> Self {
        let (carried, rejected): (Vec<PointReport>, Vec<PointReport>) =
            previous.iter().copied().partition(|r| r.accepted);
        let points = rejected.iter().map(|r| r.point).collect();
        Self::plan(request, points, carried)
    }

    fn plan(
        request: CalibrationRequest,
        points: Vec<CalibrationPoint>,
        carried: Vec<PointReport>,
    ) -> Self {
        let total = points.len();
        let pending = points
            .into_iter()
            .enumerate()
            .map(|(i, point)| PendingPoint {
                point,
                ordinal: i + 1,
                presentations: 0,
                deferrals: 0,
            })
            .collect();
        Self {
            request,
            pending,
            carried,
            reports: Vec::with_capacity(total),
            total,
        }
    }

    /// Point indices in planned presentation order.
    pub(crate) fn presentation_order(&self) -> Vec<usize> {
        self.pending.iter().map(|p| p.point.index).collect()
    }

    /// Drive the run to a terminal result, reporting state changes through
    /// `on_state`.
    pub(crate) fn execute(
        mut self,
        ctx: &RunContext,
        mut on_state: impl FnMut(CalibrationState),
    ) -> CalibrationResult {
        info!(
            "Calibration started: {} points ({:?}, {:?}), {} carried over",
            self.total,
            self.request.layout,
            self.request.eye,
            self.carried.len()
        );
        on_state(CalibrationState::PointPresentation);

        let style = self.request.style();
        let presented = ctx
            .surface
            .with(|s| s.begin_calibration(&style))
            .map_err(|e| Interrupt::Failed(e.to_string()))
            .and_then(|()| self.present_all(ctx));

        if let Err(e) = ctx.surface.with(|s| s.end_calibration()) {
            warn!("Failed to close calibration screen: {e}");
        }

        let result = match presented {
            Ok(()) => {
                on_state(CalibrationState::Evaluating);
                self.evaluate(ctx)
            }
            Err(Interrupt::Cancelled) => self.finish(CalibrationOutcome::Cancelled, None),
            Err(Interrupt::Failed(reason)) => {
                self.finish(CalibrationOutcome::Failed, Some(reason))
            }
        };

        info!(
            "Calibration finished: {:?}, quality {}",
            result.outcome, result.quality
        );
        result
    }

    fn present_all(&mut self, ctx: &RunContext) -> Result<(), Interrupt> {
        let min_confidence = ctx.config.min_point_confidence;

        while let Some(mut entry) = self.pending.pop_front() {
            ctx.check_cancelled()?;

            let total = self.total;
            ctx.surface
                .with(|s| s.show_point(&entry.point, entry.ordinal, total))
                .map_err(|e| Interrupt::Failed(e.to_string()))?;
            entry.presentations += 1;

            let measurement = self.measure(ctx, &entry.point)?;
            let accepted = measurement.is_acceptable(min_confidence);

            if self.request.audio_feedback {
                if let Err(e) = ctx.surface.with(|s| s.play_feedback(accepted)) {
                    warn!("Audio feedback failed: {e}");
                }
            }

            debug!(
                "Point {} ({}/{}) presentation {}: {} samples, quality {}, {}",
                entry.point.index,
                entry.ordinal,
                total,
                entry.presentations,
                measurement.usable_samples,
                measurement.quality(),
                if accepted { "accepted" } else { "rejected" }
            );

            if accepted {
                self.record(&entry, &measurement, true);
            } else if self.request.skip_bad_points {
                if entry.deferrals < ctx.config.max_deferrals {
                    entry.deferrals += 1;
                    self.pending.push_back(entry);
                } else {
                    self.record(&entry, &measurement, false);
                }
            } else if entry.presentations < ctx.config.max_point_attempts {
                self.pending.push_front(entry);
            } else {
                self.record(&entry, &measurement, false);
                return Err(Interrupt::Failed(format!(
                    "point {} rejected after {} attempts",
                    entry.point.index, entry.presentations
                )));
            }
        }
        Ok(())
    }

    /// Wait for the subject, then collect acceptance samples for `point`.
    fn measure(
        &self,
        ctx: &RunContext,
        point: &CalibrationPoint,
    ) -> Result<PointMeasurement, Interrupt> {
        if self.request.auto_calibration {
            if !self.await_fixation(ctx, point)? {
                debug!("No settled fixation on point {}", point.index);
                return Ok(PointMeasurement::from_samples(&[]));
            }
        } else {
            ctx.pause(ctx.config.point_dwell(self.request.slow_mode))?;
        }

        let eye = self.request.eye;
        let window = ctx.config.acceptance_window();
        let samples = ctx
            .session
            .with_device(|dev| dev.acquire_point(point, eye, window))
            .map_err(|e| ctx.interrupt(e))?;
        Ok(PointMeasurement::from_samples(&samples))
    }

    /// Poll the device until the gaze settles on `point` or the fixation
    /// timeout passes. Returns whether it settled.
    fn await_fixation(&self, ctx: &RunContext, point: &CalibrationPoint) -> Result<bool, Interrupt> {
        let deadline = Instant::now() + ctx.config.fixation_timeout();
        loop {
            let settled = ctx
                .session
                .with_device(|dev| dev.fixation_settled(point))
                .map_err(|e| ctx.interrupt(e))?;
            if settled {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            ctx.pause(ctx.config.fixation_poll())?;
        }
    }

    fn record(&mut self, entry: &PendingPoint, measurement: &PointMeasurement, accepted: bool) {
        self.reports.push(PointReport::new(
            entry.point,
            measurement,
            entry.presentations,
            accepted,
        ));
    }

    fn evaluate(self, ctx: &RunContext) -> CalibrationResult {
        let fraction = accepted_fraction(&self.all_reports());
        let any_accepted = self.all_reports().iter().any(|r| r.accepted);
        debug!("Accepted fraction {fraction:.2}");

        if any_accepted && fraction >= ctx.config.min_accepted_fraction {
            if ctx.is_cancelled() {
                return self.finish(CalibrationOutcome::Cancelled, None);
            }
            let calibration = DeviceCalibration {
                eye: self.request.eye,
                points: self
                    .all_reports()
                    .iter()
                    .filter_map(PointReport::to_accepted)
                    .collect(),
            };
            return match ctx
                .session
                .with_device(|dev| dev.apply_calibration(&calibration))
            {
                Ok(()) => self.finish(CalibrationOutcome::Succeeded, None),
                Err(e) => match ctx.interrupt(e) {
                    Interrupt::Cancelled => self.finish(CalibrationOutcome::Cancelled, None),
                    Interrupt::Failed(reason) => {
                        self.finish(CalibrationOutcome::Failed, Some(reason))
                    }
                },
            };
        }

        if self.request.allow_improvement {
            self.finish(CalibrationOutcome::ImprovementOffered, None)
        } else {
            let reason = format!(
                "accepted fraction {:.2} below {:.2}",
                fraction, ctx.config.min_accepted_fraction
            );
            self.finish(CalibrationOutcome::Failed, Some(reason))
        }
    }

    /// Reports of this run merged with carried points, in layout order.
    fn all_reports(&self) -> Vec<PointReport> {
        let mut all: Vec<PointReport> = self
            .carried
            .iter()
            .chain(self.reports.iter())
            .copied()
            .collect();
        all.sort_by_key(|r| r.point.index);
        all
    }

    fn finish(self, outcome: CalibrationOutcome, failure: Option<String>) -> CalibrationResult {
        let points = self.all_reports();
        let quality = match outcome {
            CalibrationOutcome::Succeeded | CalibrationOutcome::ImprovementOffered => {
                overall_quality(&points)
            }
            _ => CalibrationQuality::Failed,
        };
        CalibrationResult {
            outcome,
            quality,
            improvement_offered: outcome == CalibrationOutcome::ImprovementOffered,
            points,
            failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{EyeMode, PointLayout};

    fn request(randomize: bool, seed: Option<u64>) -> CalibrationRequest {
        CalibrationRequest {
            randomize,
            shuffle_seed: seed,
            ..CalibrationRequest::new(9, PointLayout::Center, EyeMode::Both)
        }
    }

    fn points(req: &CalibrationRequest) -> Vec<CalibrationPoint> {
        req.validate().unwrap()
    }

    #[test]
    fn test_layout_order_without_randomize() {
        let req = request(false, Some(7));
        let run = CalibrationRun::new(req.clone(), points(&req));
        assert_eq!(run.presentation_order(), (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_is_deterministic_for_seed() {
        let req = request(true, Some(42));
        let first = CalibrationRun::new(req.clone(), points(&req)).presentation_order();
        let second = CalibrationRun::new(req.clone(), points(&req)).presentation_order();
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_improvement_plans_rejected_points_only() {
        let req = request(false, None);
        let pts = points(&req);
        let measurement = PointMeasurement::from_samples(&[]);
        let previous: Vec<PointReport> = pts
            .iter()
            .map(|p| PointReport::new(*p, &measurement, 1, p.index % 3 != 0))
            .collect();

        let run = CalibrationRun::improvement(req, &previous);
        assert_eq!(run.presentation_order(), vec![0, 3, 6]);
        assert_eq!(run.carried.len(), 6);
        assert_eq!(run.all_reports().len(), 9);
    }
}
