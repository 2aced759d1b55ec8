//! Simulated eye tracker.
//!
//! Produces frames at a fixed cadence with a gaze target that jumps around the
//! screen, closes a synthetic event every `event_every` frames, and answers
//! calibration acquisitions from a per-point confidence script. All randomness
//! comes from a seeded ChaCha8 generator so runs are reproducible.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use shared::{CalibrationPoint, EventKind, EyeMode};
use tracing::{debug, info};

use crate::tracking_device::{
    AcceptanceSample, DeviceCalibration, DeviceError, DeviceResult, DeviceVersion, RawFrame,
    TrackingDevice,
};

/// Frames between gaze target jumps
const TARGET_HOLD_FRAMES: u64 = 100;

/// Upper bound on acceptance samples returned per acquisition
const MAX_ACCEPTANCE_SAMPLES: usize = 250;

/// Behaviour of a [`SimulatedTracker`].
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub version: DeviceVersion,
    /// Time between frames
    pub sample_interval: Duration,
    pub screen_width: u32,
    pub screen_height: u32,
    pub seed: u64,
    /// Refuse every connection attempt
    pub unreachable: bool,
    /// Acquisition confidence for points without a script entry
    pub default_confidence: f64,
    /// Acquisition confidence per point index, one entry per attempt.
    /// The last entry repeats for further attempts.
    pub point_confidence: HashMap<usize, Vec<f64>>,
    /// How long a point must be shown before fixation is reported settled
    pub fixation_delay: Duration,
    /// Never report a settled fixation
    pub never_settles: bool,
    /// Fail `read_frame` with a disconnect after this many frames
    pub fail_frames_after: Option<u64>,
    /// Fail `acquire_point` for this point index
    pub fail_acquire_at: Option<usize>,
    /// Frames between synthetic events
    pub event_every: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            version: DeviceVersion {
                major: 1,
                minor: 0,
                build: 0,
                device_type: 0,
            },
            sample_interval: Duration::from_millis(4),
            screen_width: 1280,
            screen_height: 1024,
            seed: 0x5eed,
            unreachable: false,
            default_confidence: 0.95,
            point_confidence: HashMap::new(),
            fixation_delay: Duration::ZERO,
            never_settles: false,
            fail_frames_after: None,
            fail_acquire_at: None,
            event_every: 50,
        }
    }
}

impl SimConfig {
    /// Script the acquisition confidence of one point, attempt by attempt.
    pub fn with_point_confidence(mut self, index: usize, attempts: Vec<f64>) -> Self {
        self.point_confidence.insert(index, attempts);
        self
    }

    /// Set the confidence used for every unscripted point.
    pub fn with_default_confidence(mut self, confidence: f64) -> Self {
        self.default_confidence = confidence;
        self
    }
}

/// Counters and records kept by the simulator, readable from tests.
#[derive(Debug, Clone, Default)]
pub struct SimStats {
    pub connected: bool,
    pub connects: u32,
    pub disconnects: u32,
    pub frames_served: u64,
    /// Point indices in the order they were acquired
    pub acquisitions: Vec<usize>,
    /// Every calibration the device was told to apply
    pub applied: Vec<DeviceCalibration>,
}

/// Shared view of a simulator's [`SimStats`].
#[derive(Debug, Clone, Default)]
pub struct SimProbe {
    inner: Arc<Mutex<SimStats>>,
}

impl SimProbe {
    pub fn stats(&self) -> SimStats {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_connected(&self) -> bool {
        self.stats().connected
    }

    pub fn acquisitions(&self) -> Vec<usize> {
        self.stats().acquisitions
    }

    pub fn applied_calibrations(&self) -> Vec<DeviceCalibration> {
        self.stats().applied
    }

    fn update(&self, f: impl FnOnce(&mut SimStats)) {
        f(&mut self.inner.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

#[derive(Debug, Clone, Copy)]
struct LastEvent {
    kind: EventKind,
    timestamp: i64,
    duration: i64,
    x: f64,
    y: f64,
    dispersion_x: f64,
    dispersion_y: f64,
    confidence: f64,
}

impl LastEvent {
    fn none() -> Self {
        Self {
            kind: EventKind::NoEvent,
            timestamp: 0,
            duration: 0,
            x: 0.0,
            y: 0.0,
            dispersion_x: 0.0,
            dispersion_y: 0.0,
            confidence: 0.0,
        }
    }
}

/// Simulated tracking device.
pub struct SimulatedTracker {
    config: SimConfig,
    rng: ChaCha8Rng,
    probe: SimProbe,
    connected_at: Option<Instant>,
    next_frame_at: Instant,
    frame_count: u64,
    last_timestamp: i64,
    target: (f64, f64),
    last_event: LastEvent,
    attempts: HashMap<usize, usize>,
    settling: Option<(usize, Instant)>,
}

impl SimulatedTracker {
    pub fn new(config: SimConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let target = (
            config.screen_width as f64 / 2.0,
            config.screen_height as f64 / 2.0,
        );
        Self {
            config,
            rng,
            probe: SimProbe::default(),
            connected_at: None,
            next_frame_at: Instant::now(),
            frame_count: 0,
            last_timestamp: 0,
            target,
            last_event: LastEvent::none(),
            attempts: HashMap::new(),
            settling: None,
        }
    }

    /// Handle for inspecting the simulator after it has been handed off.
    pub fn probe(&self) -> SimProbe {
        self.probe.clone()
    }

    fn ensure_connected(&self) -> DeviceResult<Instant> {
        self.connected_at.ok_or(DeviceError::NotConnected)
    }

    fn next_timestamp(&mut self, connected_at: Instant) -> i64 {
        let elapsed = connected_at.elapsed().as_millis() as i64;
        self.last_timestamp = elapsed.max(self.last_timestamp + 1);
        self.last_timestamp
    }

    fn build_frame(&mut self, timestamp: i64) -> RawFrame {
        let width = self.config.screen_width as f64;
        let height = self.config.screen_height as f64;

        if self.frame_count % TARGET_HOLD_FRAMES == 0 {
            self.target = (
                self.rng.random_range(0.1..0.9) * width,
                self.rng.random_range(0.1..0.9) * height,
            );
        }

        let event_every = self.config.event_every.max(1);
        if self.frame_count % event_every == 0 {
            let kind = match (self.frame_count / event_every) % 4 {
                1 => EventKind::Saccade,
                3 => EventKind::Blink,
                _ => EventKind::Fixation,
            };
            let interval_ms = self.config.sample_interval.as_millis() as i64;
            self.last_event = LastEvent {
                kind,
                timestamp,
                duration: event_every as i64 * interval_ms,
                x: self.target.0,
                y: self.target.1,
                dispersion_x: self.rng.random_range(1.0..5.0),
                dispersion_y: self.rng.random_range(1.0..5.0),
                confidence: self.rng.random_range(0.8..1.0),
            };
        }

        let gaze_x = self.target.0 + self.rng.random_range(-5.0..5.0);
        let gaze_y = self.target.1 + self.rng.random_range(-5.0..5.0);
        let event = self.last_event;

        RawFrame {
            raw_timestamp: timestamp,
            gaze_x,
            gaze_y,
            left_x: gaze_x - 2.0,
            left_y: gaze_y,
            left_confidence: self.rng.random_range(0.9..1.0),
            left_pupil_diameter: self.rng.random_range(3.0..4.0),
            right_x: gaze_x + 2.0,
            right_y: gaze_y,
            right_confidence: self.rng.random_range(0.9..1.0),
            right_pupil_diameter: self.rng.random_range(3.0..4.0),
            event_id: event.kind.id(),
            event_timestamp: event.timestamp,
            event_duration: event.duration,
            event_x: event.x,
            event_y: event.y,
            dispersion_x: event.dispersion_x,
            dispersion_y: event.dispersion_y,
            event_confidence: event.confidence,
        }
    }

    fn scripted_confidence(&mut self, index: usize) -> f64 {
        let attempt = self.attempts.entry(index).or_insert(0);
        let current = *attempt;
        *attempt += 1;

        self.config
            .point_confidence
            .get(&index)
            .and_then(|script| script.get(current).or_else(|| script.last()))
            .copied()
            .unwrap_or(self.config.default_confidence)
    }
}

impl TrackingDevice for SimulatedTracker {
    fn connect(&mut self) -> DeviceResult<DeviceVersion> {
        if self.config.unreachable {
            return Err(DeviceError::ConnectionFailed(
                "simulated tracker unreachable".to_string(),
            ));
        }

        let now = Instant::now();
        self.connected_at = Some(now);
        self.next_frame_at = now + self.config.sample_interval;
        self.frame_count = 0;
        self.last_timestamp = 0;
        self.last_event = LastEvent::none();
        self.attempts.clear();
        self.settling = None;
        self.probe.update(|s| {
            s.connected = true;
            s.connects += 1;
        });

        info!("Simulated tracker connected: {}", self.config.version);
        Ok(self.config.version)
    }

    fn disconnect(&mut self) -> DeviceResult<()> {
        self.connected_at = None;
        self.probe.update(|s| {
            s.connected = false;
            s.disconnects += 1;
        });
        debug!("Simulated tracker disconnected");
        Ok(())
    }

    fn read_frame(&mut self, timeout: Duration) -> DeviceResult<Option<RawFrame>> {
        let connected_at = self.ensure_connected()?;

        if let Some(limit) = self.config.fail_frames_after {
            if self.frame_count >= limit {
                return Err(DeviceError::Disconnected(format!(
                    "simulated link loss after {limit} frames"
                )));
            }
        }

        let now = Instant::now();
        if now < self.next_frame_at {
            let wait = self.next_frame_at - now;
            if wait > timeout {
                thread::sleep(timeout);
                return Ok(None);
            }
            thread::sleep(wait);
        }

        // Do not burst to catch up after a stall
        let now = Instant::now();
        self.next_frame_at = if self.next_frame_at + self.config.sample_interval < now {
            now + self.config.sample_interval
        } else {
            self.next_frame_at + self.config.sample_interval
        };

        let timestamp = self.next_timestamp(connected_at);
        let frame = self.build_frame(timestamp);
        self.frame_count += 1;
        self.probe.update(|s| s.frames_served += 1);
        Ok(Some(frame))
    }

    fn fixation_settled(&mut self, point: &CalibrationPoint) -> DeviceResult<bool> {
        self.ensure_connected()?;
        if self.config.never_settles {
            return Ok(false);
        }

        match self.settling {
            Some((index, since)) if index == point.index => {
                Ok(since.elapsed() >= self.config.fixation_delay)
            }
            _ => {
                self.settling = Some((point.index, Instant::now()));
                Ok(self.config.fixation_delay.is_zero())
            }
        }
    }

    fn acquire_point(
        &mut self,
        point: &CalibrationPoint,
        eye: EyeMode,
        window: Duration,
    ) -> DeviceResult<Vec<AcceptanceSample>> {
        self.ensure_connected()?;
        if self.config.fail_acquire_at == Some(point.index) {
            return Err(DeviceError::Protocol(format!(
                "no response while acquiring point {}",
                point.index
            )));
        }

        let base = self.scripted_confidence(point.index);
        let interval = self.config.sample_interval.max(Duration::from_millis(1));
        let count = ((window.as_micros() / interval.as_micros()) as usize)
            .clamp(1, MAX_ACCEPTANCE_SAMPLES);

        thread::sleep(window);

        let samples = (0..count)
            .map(|_| AcceptanceSample {
                confidence: (base + self.rng.random_range(-0.02..0.02)).clamp(0.0, 1.0),
                offset_x: self.rng.random_range(-0.01..0.01),
                offset_y: self.rng.random_range(-0.01..0.01),
            })
            .collect();

        debug!(
            "Acquired point {} ({:?}) at base confidence {:.2}",
            point.index, eye, base
        );
        self.probe.update(|s| s.acquisitions.push(point.index));
        Ok(samples)
    }

    fn apply_calibration(&mut self, calibration: &DeviceCalibration) -> DeviceResult<()> {
        self.ensure_connected()?;
        info!(
            "Simulated tracker applied {}-point calibration",
            calibration.points.len()
        );
        let calibration = calibration.clone();
        self.probe.update(|s| s.applied.push(calibration));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> SimConfig {
        SimConfig {
            sample_interval: Duration::from_millis(1),
            ..SimConfig::default()
        }
    }

    fn point(index: usize) -> CalibrationPoint {
        CalibrationPoint {
            index,
            x: 0.5,
            y: 0.5,
        }
    }

    #[test]
    fn test_unreachable_refuses_connection() {
        let mut sim = SimulatedTracker::new(SimConfig {
            unreachable: true,
            ..SimConfig::default()
        });
        assert!(matches!(
            sim.connect(),
            Err(DeviceError::ConnectionFailed(_))
        ));
        assert!(!sim.probe().is_connected());
    }

    #[test]
    fn test_requires_connection() {
        let mut sim = SimulatedTracker::new(fast_config());
        assert_eq!(
            sim.read_frame(Duration::from_millis(5)),
            Err(DeviceError::NotConnected)
        );
        assert_eq!(sim.fixation_settled(&point(0)), Err(DeviceError::NotConnected));
    }

    #[test]
    fn test_frame_timestamps_increase() {
        let mut sim = SimulatedTracker::new(fast_config());
        sim.connect().unwrap();

        let mut last = i64::MIN;
        let mut frames = 0;
        while frames < 20 {
            if let Some(frame) = sim.read_frame(Duration::from_millis(50)).unwrap() {
                assert!(frame.raw_timestamp > last);
                last = frame.raw_timestamp;
                frames += 1;
            }
        }
        assert_eq!(sim.probe().stats().frames_served, 20);
    }

    #[test]
    fn test_link_loss_after_limit() {
        let mut sim = SimulatedTracker::new(SimConfig {
            fail_frames_after: Some(2),
            ..fast_config()
        });
        sim.connect().unwrap();

        let mut served = 0;
        loop {
            match sim.read_frame(Duration::from_millis(50)) {
                Ok(Some(_)) => served += 1,
                Ok(None) => {}
                Err(e) => {
                    assert!(matches!(e, DeviceError::Disconnected(_)));
                    break;
                }
            }
        }
        assert_eq!(served, 2);
    }

    #[test]
    fn test_confidence_script_per_attempt() {
        let mut sim = SimulatedTracker::new(
            fast_config().with_point_confidence(3, vec![0.2, 0.9]),
        );
        sim.connect().unwrap();

        let mean = |samples: &[AcceptanceSample]| {
            samples.iter().map(|s| s.confidence).sum::<f64>() / samples.len() as f64
        };

        let window = Duration::from_millis(5);
        let first = sim.acquire_point(&point(3), EyeMode::Both, window).unwrap();
        let second = sim.acquire_point(&point(3), EyeMode::Both, window).unwrap();
        let third = sim.acquire_point(&point(3), EyeMode::Both, window).unwrap();
        let other = sim.acquire_point(&point(4), EyeMode::Both, window).unwrap();

        approx::assert_abs_diff_eq!(mean(&first), 0.2, epsilon = 0.03);
        approx::assert_abs_diff_eq!(mean(&second), 0.9, epsilon = 0.03);
        approx::assert_abs_diff_eq!(mean(&third), 0.9, epsilon = 0.03);
        approx::assert_abs_diff_eq!(mean(&other), 0.95, epsilon = 0.03);
        assert_eq!(sim.probe().acquisitions(), vec![3, 3, 3, 4]);
    }

    #[test]
    fn test_fixation_delay() {
        let mut sim = SimulatedTracker::new(SimConfig {
            fixation_delay: Duration::from_millis(20),
            ..fast_config()
        });
        sim.connect().unwrap();

        assert!(!sim.fixation_settled(&point(0)).unwrap());
        thread::sleep(Duration::from_millis(30));
        assert!(sim.fixation_settled(&point(0)).unwrap());
        // A new point restarts the settle timer
        assert!(!sim.fixation_settled(&point(1)).unwrap());
    }
}
