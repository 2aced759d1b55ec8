//! Sample streaming.
//!
//! While enabled, a sampling thread reads frames from the device, decodes them
//! and pushes the samples into a bounded [`SampleQueue`]. Consumers drain the
//! queue with [`StreamingController::wait_for_sample`].
//!
//! The queue evicts its oldest sample when full, so a consumer that falls
//! behind loses old data rather than stalling the device.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use shared::{QueueReadError, Sample, SampleQueue, WaitTimeout};
use tracing::{debug, info, trace, warn};

use crate::config::TrackerConfig;
use crate::decode::FrameDecoder;
use crate::error::{TrackerError, TrackerResult};
use crate::session::{DeviceSession, SessionObserver};

#[derive(Default)]
struct StreamState {
    /// Set by the first enable; distinguishes "never enabled" from "drained"
    ever_enabled: bool,
    /// Dropped to stop the sampling thread
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

/// Starts and stops the sampling thread and hands out samples.
pub struct StreamingController {
    session: Arc<DeviceSession>,
    queue: Arc<SampleQueue<Sample>>,
    poll: Duration,
    state: Mutex<StreamState>,
    /// Device error that ended the sampling loop
    fault: Arc<Mutex<Option<String>>>,
    /// Outlives each sampling thread so sequence numbers and event
    /// deduplication carry across disable/enable
    decoder: Arc<Mutex<FrameDecoder>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StreamingController {
    /// Create a controller and register it to stop on session close.
    pub(crate) fn new(session: Arc<DeviceSession>, config: &TrackerConfig) -> Arc<Self> {
        let controller = Arc::new(Self {
            session: session.clone(),
            queue: Arc::new(SampleQueue::new(config.queue_capacity)),
            poll: config.sample_poll(),
            state: Mutex::new(StreamState::default()),
            fault: Arc::new(Mutex::new(None)),
            decoder: Arc::new(Mutex::new(FrameDecoder::new())),
        });
        let observer: Arc<dyn SessionObserver> = controller.clone();
        session.register(&observer);
        controller
    }

    /// Enable or disable streaming.
    ///
    /// Disabling returns only once the sampling thread has exited; no sample is
    /// pushed after that. Samples already buffered stay available.
    pub fn set_streaming(&self, enabled: bool) -> TrackerResult<()> {
        self.session.ensure_open()?;
        if enabled {
            self.start()
        } else {
            self.stop();
            Ok(())
        }
    }

    /// Whether the sampling thread is running.
    pub fn is_streaming(&self) -> bool {
        lock(&self.state)
            .worker
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn start(&self) -> TrackerResult<()> {
        let mut state = lock(&self.state);
        // Close may have run since the caller's check
        self.session.ensure_open()?;
        if state.worker.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }
        // A loop that ended on a device error is restarted
        if let Some(handle) = state.worker.take() {
            if handle.join().is_err() {
                warn!("Sampling thread panicked");
            }
        }

        if self.queue.is_closed() {
            self.queue.reopen();
        }
        *lock(&self.fault) = None;

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let session = self.session.clone();
        let queue = self.queue.clone();
        let fault = self.fault.clone();
        let decoder = self.decoder.clone();
        let poll = self.poll;

        let handle = thread::Builder::new()
            .name("sampler".to_string())
            .spawn(move || sample_loop(&session, &queue, &decoder, &stop_rx, poll, &fault))
            .map_err(|e| TrackerError::InternalFailure(format!("spawn sampler: {e}")))?;

        state.ever_enabled = true;
        state.stop = Some(stop_tx);
        state.worker = Some(handle);
        info!("Streaming enabled");
        Ok(())
    }

    fn stop(&self) {
        let handle = {
            let mut state = lock(&self.state);
            state.stop = None;
            state.worker.take()
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Sampling thread panicked");
            }
            info!("Streaming disabled");
        }
    }

    /// Discard every buffered sample. Streaming continues.
    pub fn clear_buffer(&self) -> TrackerResult<()> {
        self.session.ensure_open()?;
        let cleared = self.queue.clear();
        debug!("Cleared {cleared} buffered samples");
        Ok(())
    }

    /// Take the oldest buffered sample, waiting up to `timeout` for one.
    ///
    /// # Errors
    /// `NotOpen` if the session is closed (also while waiting),
    /// `StreamingDisabled` if streaming was never enabled, `TimedOut`, and
    /// `InternalFailure` once the buffer is drained after the device failed.
    pub fn wait_for_sample(&self, timeout: WaitTimeout) -> TrackerResult<Sample> {
        self.session.ensure_open()?;
        if !lock(&self.state).ever_enabled {
            return Err(TrackerError::StreamingDisabled);
        }

        if let Some(sample) = self.queue.try_pop() {
            return Ok(sample);
        }
        if let Some(reason) = lock(&self.fault).clone() {
            return Err(TrackerError::InternalFailure(reason));
        }

        match self.queue.pop(timeout) {
            Ok(sample) => Ok(sample),
            Err(QueueReadError::Closed) => Err(TrackerError::NotOpen),
            Err(QueueReadError::Timeout) => match lock(&self.fault).clone() {
                Some(reason) => Err(TrackerError::InternalFailure(reason)),
                None => Err(TrackerError::TimedOut),
            },
        }
    }

    /// Number of samples waiting to be read.
    pub fn buffered(&self) -> usize {
        self.queue.len()
    }

    /// Samples evicted because the buffer was full.
    pub fn dropped_samples(&self) -> u64 {
        self.queue.dropped()
    }
}

impl SessionObserver for StreamingController {
    fn session_closing(&self) {
        self.stop();
        self.queue.close();
        *lock(&self.fault) = None;
        lock(&self.decoder).reset();
        lock(&self.state).ever_enabled = false;
    }
}

fn sample_loop(
    session: &DeviceSession,
    queue: &SampleQueue<Sample>,
    decoder: &Mutex<FrameDecoder>,
    stop: &Receiver<()>,
    poll: Duration,
    fault: &Mutex<Option<String>>,
) {
    debug!("Sampling thread started");

    while let Err(TryRecvError::Empty) = stop.try_recv() {
        match session.with_device(|dev| dev.read_frame(poll)) {
            Ok(Some(frame)) => {
                let samples = lock(decoder).decode(&frame);
                for sample in samples {
                    trace!("sample {} at {}", sample.sequence, sample.timestamp());
                    queue.push(sample);
                }
            }
            Ok(None) => {}
            Err(TrackerError::NotOpen) => break,
            Err(e) => {
                warn!("Sampling stopped on device error: {e}");
                *lock(fault) = Some(e.to_string());
                break;
            }
        }
    }
    debug!("Sampling thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardware::sim::{SimConfig, SimulatedTracker};

    fn streaming(sim: SimConfig) -> (Arc<DeviceSession>, Arc<StreamingController>) {
        let tracker = SimulatedTracker::new(SimConfig {
            sample_interval: Duration::from_millis(1),
            ..sim
        });
        let session = Arc::new(DeviceSession::new(Box::new(tracker)));
        let controller = StreamingController::new(session.clone(), &TrackerConfig::default());
        (session, controller)
    }

    #[test]
    fn test_requires_open_session() {
        let (_session, ctl) = streaming(SimConfig::default());
        assert_eq!(ctl.set_streaming(true), Err(TrackerError::NotOpen));
        assert_eq!(ctl.clear_buffer(), Err(TrackerError::NotOpen));
        assert_eq!(
            ctl.wait_for_sample(WaitTimeout::Millis(0)),
            Err(TrackerError::NotOpen)
        );
    }

    #[test]
    fn test_disabled_until_enabled() {
        let (session, ctl) = streaming(SimConfig::default());
        session.open().unwrap();
        assert_eq!(
            ctl.wait_for_sample(WaitTimeout::Millis(0)),
            Err(TrackerError::StreamingDisabled)
        );
    }

    #[test]
    fn test_samples_in_production_order() {
        let (session, ctl) = streaming(SimConfig::default());
        session.open().unwrap();
        ctl.set_streaming(true).unwrap();

        let mut last_sequence = None;
        let mut last_raw = i64::MIN;
        for _ in 0..50 {
            let sample = ctl.wait_for_sample(WaitTimeout::Millis(1000)).unwrap();
            if let Some(prev) = last_sequence {
                assert!(sample.sequence > prev);
            }
            last_sequence = Some(sample.sequence);
            if let Some(raw) = sample.as_raw() {
                assert!(raw.timestamp > last_raw);
                last_raw = raw.timestamp;
            }
        }
        session.close();
    }

    #[test]
    fn test_disable_stops_pushes() {
        let (session, ctl) = streaming(SimConfig::default());
        session.open().unwrap();
        ctl.set_streaming(true).unwrap();
        ctl.wait_for_sample(WaitTimeout::Millis(1000)).unwrap();

        ctl.set_streaming(false).unwrap();
        assert!(!ctl.is_streaming());
        let buffered = ctl.buffered();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ctl.buffered(), buffered);

        // Buffered samples stay readable, then the wait times out
        for _ in 0..buffered {
            ctl.wait_for_sample(WaitTimeout::Millis(0)).unwrap();
        }
        assert_eq!(
            ctl.wait_for_sample(WaitTimeout::Millis(0)),
            Err(TrackerError::TimedOut)
        );
    }

    #[test]
    fn test_clear_then_poll_times_out() {
        let (session, ctl) = streaming(SimConfig::default());
        session.open().unwrap();
        ctl.set_streaming(true).unwrap();
        ctl.wait_for_sample(WaitTimeout::Millis(1000)).unwrap();
        ctl.set_streaming(false).unwrap();

        ctl.clear_buffer().unwrap();
        assert_eq!(ctl.buffered(), 0);
        assert_eq!(
            ctl.wait_for_sample(WaitTimeout::Millis(0)),
            Err(TrackerError::TimedOut)
        );
    }

    #[test]
    fn test_device_failure_after_buffered_samples() {
        let (session, ctl) = streaming(SimConfig {
            fail_frames_after: Some(3),
            event_every: 1000,
            ..SimConfig::default()
        });
        session.open().unwrap();
        ctl.set_streaming(true).unwrap();

        // The first frame also carries the opening fixation event
        let mut delivered = 0;
        let err = loop {
            match ctl.wait_for_sample(WaitTimeout::Millis(1000)) {
                Ok(_) => delivered += 1,
                Err(e) => break e,
            }
        };
        assert_eq!(delivered, 4);
        assert!(matches!(err, TrackerError::InternalFailure(_)));
        thread::sleep(Duration::from_millis(50));
        assert!(!ctl.is_streaming());
    }

    #[test]
    fn test_close_wakes_blocked_waiter() {
        let (session, ctl) = streaming(SimConfig::default());
        session.open().unwrap();
        ctl.set_streaming(true).unwrap();
        ctl.set_streaming(false).unwrap();
        ctl.clear_buffer().unwrap();

        let waiter = {
            let ctl = ctl.clone();
            thread::spawn(move || ctl.wait_for_sample(WaitTimeout::Infinite))
        };
        thread::sleep(Duration::from_millis(20));
        session.close();
        assert_eq!(waiter.join().unwrap(), Err(TrackerError::NotOpen));
    }

    #[test]
    fn test_reenable_continues_stream() {
        let (session, ctl) = streaming(SimConfig {
            event_every: 5,
            ..SimConfig::default()
        });
        session.open().unwrap();
        for _ in 0..2 {
            ctl.set_streaming(true).unwrap();
            thread::sleep(Duration::from_millis(30));
            ctl.set_streaming(false).unwrap();
        }

        let mut sequences = Vec::new();
        let mut event_times = Vec::new();
        while let Ok(sample) = ctl.wait_for_sample(WaitTimeout::Millis(0)) {
            sequences.push(sample.sequence);
            if let Some(event) = sample.as_event() {
                event_times.push(event.timestamp);
            }
        }
        assert!(sequences.len() > 2);
        assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1), "{sequences:?}");
        assert!(event_times.windows(2).all(|w| w[1] > w[0]), "{event_times:?}");
    }

    #[test]
    fn test_close_restarts_numbering() {
        let (session, ctl) = streaming(SimConfig::default());
        session.open().unwrap();
        ctl.set_streaming(true).unwrap();
        for _ in 0..5 {
            ctl.wait_for_sample(WaitTimeout::Millis(1000)).unwrap();
        }
        session.close();

        session.open().unwrap();
        ctl.set_streaming(true).unwrap();
        let first = ctl.wait_for_sample(WaitTimeout::Millis(1000)).unwrap();
        assert_eq!(first.sequence, 0);
    }

    #[test]
    fn test_enable_racing_close_leaves_stream_disabled() {
        let (session, ctl) = streaming(SimConfig::default());
        for _ in 0..50 {
            session.open().unwrap();
            let enabler = {
                let ctl = ctl.clone();
                thread::spawn(move || ctl.set_streaming(true))
            };
            session.close();
            let _ = enabler.join().unwrap();

            assert!(!ctl.is_streaming());
            session.open().unwrap();
            assert_eq!(
                ctl.wait_for_sample(WaitTimeout::Millis(0)),
                Err(TrackerError::StreamingDisabled)
            );
            session.close();
        }
    }

    #[test]
    fn test_reopen_requires_enable_again() {
        let (session, ctl) = streaming(SimConfig::default());
        session.open().unwrap();
        ctl.set_streaming(true).unwrap();
        session.close();
        assert!(!ctl.is_streaming());

        session.open().unwrap();
        assert_eq!(
            ctl.wait_for_sample(WaitTimeout::Millis(0)),
            Err(TrackerError::StreamingDisabled)
        );
        ctl.set_streaming(true).unwrap();
        ctl.wait_for_sample(WaitTimeout::Millis(1000)).unwrap();
    }
}
