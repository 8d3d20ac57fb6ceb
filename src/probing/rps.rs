//! Request-Rate Window
//!
//! Fixed-capacity sliding window of request instants used to estimate
//! current RPS. Kept behind its own mutex so recording a request never
//! contends with selection bookkeeping.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

const MAX_SAMPLES: usize = 8192;

/// Sliding window of request timestamps.
pub struct RpsWindow {
    window: Duration,
    samples: Mutex<VecDeque<Instant>>,
}

impl RpsWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: Mutex::new(VecDeque::with_capacity(MAX_SAMPLES)),
        }
    }

    /// Record one request at the current instant, pruning entries that
    /// fell out of the window.
    pub fn record(&self) {
        let now = Instant::now();
        let mut samples = self.samples.lock();
        Self::prune(&mut samples, now, self.window);
        if samples.len() == MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(now);
    }

    /// Requests observed inside the window (whole-second count: the
    /// window defaults to one second, so this is the RPS estimate).
    pub fn current_rps(&self) -> f64 {
        let now = Instant::now();
        let mut samples = self.samples.lock();
        Self::prune(&mut samples, now, self.window);
        samples.len() as f64
    }

    fn prune(samples: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(front) = samples.front() {
            if now.duration_since(*front) >= window {
                samples.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for RpsWindow {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
