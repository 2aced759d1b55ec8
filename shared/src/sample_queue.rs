//! Bounded sample queue shared between the sampling thread and consumers.
//!
//! A fixed-capacity FIFO that drops the oldest element when a push would exceed
//! capacity, so a producer never blocks on a consumer that stopped reading.
//! Readers can block with a timeout until an element arrives.
//!
//! All state lives behind one mutex, so a `clear` and a concurrent `pop` never
//! observe a half-modified queue: the pop either returns the element it removed
//! before the clear, or sees the emptied queue.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::trace;

use crate::timeout::WaitTimeout;

/// Error type for queue read operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueReadError {
    /// Timeout expired with nothing to read
    Timeout,
    /// Queue was closed while empty or while the reader was waiting
    Closed,
}

impl fmt::Display for QueueReadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueueReadError::Timeout => write!(f, "Timeout waiting for sample"),
            QueueReadError::Closed => write!(f, "Sample queue closed"),
        }
    }
}

impl Error for QueueReadError {}

/// Result type for queue read operations
pub type QueueReadResult<T> = Result<T, QueueReadError>;

#[derive(Debug)]
struct QueueState<T> {
    data: VecDeque<T>,
    /// Elements evicted by pushes into a full queue
    dropped: u64,
    closed: bool,
}

/// Thread-safe bounded FIFO with drop-oldest overflow.
#[derive(Debug)]
pub struct SampleQueue<T> {
    state: Mutex<QueueState<T>>,
    readable: Condvar,
    capacity: usize,
}

impl<T> SampleQueue<T> {
    /// Create an empty, open queue.
    ///
    /// # Panics
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "SampleQueue capacity must be > 0");
        Self {
            state: Mutex::new(QueueState {
                data: VecDeque::with_capacity(capacity),
                dropped: 0,
                closed: false,
            }),
            readable: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push a value, evicting the oldest element if the queue is full.
    ///
    /// Returns false (and discards the value) if the queue is closed.
    pub fn push(&self, value: T) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        if state.data.len() >= self.capacity {
            state.data.pop_front();
            state.dropped += 1;
            trace!("sample queue full, evicted oldest ({} total)", state.dropped);
        }
        state.data.push_back(value);
        drop(state);

        self.readable.notify_one();
        true
    }

    /// Remove the oldest element, blocking up to `timeout` for one to arrive.
    ///
    /// Buffered elements are always returned before a closed queue reports
    /// [`QueueReadError::Closed`].
    pub fn pop(&self, timeout: WaitTimeout) -> QueueReadResult<T> {
        let deadline = timeout.as_duration().map(|d| Instant::now() + d);
        let mut state = self.lock();

        loop {
            if let Some(value) = state.data.pop_front() {
                return Ok(value);
            }
            if state.closed {
                return Err(QueueReadError::Closed);
            }

            state = match deadline {
                None => self
                    .readable
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(QueueReadError::Timeout);
                    }
                    let (guard, _) = self
                        .readable
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    guard
                }
            };
        }
    }

    /// Remove the oldest element without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().data.pop_front()
    }

    /// Discard every buffered element. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.data.len();
        state.data.clear();
        removed
    }

    /// Close the queue: buffered elements are discarded, later pushes are
    /// ignored and every blocked reader wakes with [`QueueReadError::Closed`].
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.data.clear();
        drop(state);

        self.readable.notify_all();
    }

    /// Re-open a closed queue, empty and with the drop counter reset.
    pub fn reopen(&self) {
        let mut state = self.lock();
        state.closed = false;
        state.data.clear();
        state.dropped = 0;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Returns the number of buffered elements.
    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().data.is_empty()
    }

    /// Returns the maximum capacity of the queue.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of elements evicted by overflow since creation or last reopen.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = SampleQueue::new(16);
        for i in 0..10 {
            assert!(queue.push(i));
        }
        let popped: Vec<_> = (0..10)
            .map(|_| queue.pop(WaitTimeout::Millis(0)).unwrap())
            .collect();
        assert_eq!(popped, (0..10).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queue = SampleQueue::new(3);
        for i in 1..=5 {
            queue.push(i);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), Some(4));
        assert_eq!(queue.try_pop(), Some(5));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_clear_then_poll_times_out() {
        let queue = SampleQueue::new(8);
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.clear(), 2);
        assert_eq!(
            queue.pop(WaitTimeout::Millis(0)),
            Err(QueueReadError::Timeout)
        );
    }

    #[test]
    fn test_pop_times_out_after_deadline() {
        let queue: SampleQueue<u32> = SampleQueue::new(4);
        let start = Instant::now();
        assert_eq!(
            queue.pop(WaitTimeout::Millis(50)),
            Err(QueueReadError::Timeout)
        );
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_blocked_reader_wakes_on_push() {
        let queue = Arc::new(SampleQueue::new(4));
        let reader = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop(WaitTimeout::Infinite))
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(42u32);
        assert_eq!(reader.join().unwrap(), Ok(42));
    }

    #[test]
    fn test_close_wakes_infinite_waiters() {
        let queue: Arc<SampleQueue<u32>> = Arc::new(SampleQueue::new(4));
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.pop(WaitTimeout::Infinite))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        queue.close();

        for reader in readers {
            assert_eq!(reader.join().unwrap(), Err(QueueReadError::Closed));
        }
        assert!(!queue.push(1));
        assert!(queue.is_closed());

        queue.reopen();
        assert!(queue.push(7));
        assert_eq!(queue.try_pop(), Some(7));
    }

    #[test]
    fn test_concurrent_producer_preserves_order() {
        let queue = Arc::new(SampleQueue::new(10_000));
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..1000u32 {
                    queue.push(i);
                }
            })
        };

        let mut received = Vec::with_capacity(1000);
        while received.len() < 1000 {
            received.push(queue.pop(WaitTimeout::Millis(1000)).unwrap());
        }
        producer.join().unwrap();

        assert!(received.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn test_zero_capacity_panics() {
        let _queue: SampleQueue<u8> = SampleQueue::new(0);
    }
}
