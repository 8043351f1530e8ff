//! r2d2 event and error hooks.
//!
//! [`WaitTimeRecorder`] keeps checkout statistics that feed
//! [`PoolStatus`](nebula_datasource::PoolStatus) and the wait-time health
//! check. Pool errors are routed into `tracing` instead of r2d2's `log`
//! default.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// Number of most recent checkout wait times kept for percentiles.
pub const WAIT_SAMPLE_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// WaitTimeRecorder
// ---------------------------------------------------------------------------

/// Checkout counters plus a bounded window of recent wait times.
#[derive(Debug, Default)]
pub struct WaitTimeRecorder {
    checkouts: AtomicU64,
    timeouts: AtomicU64,
    samples: Mutex<VecDeque<Duration>>,
}

impl WaitTimeRecorder {
    /// Record a successful checkout that waited `wait`.
    pub fn record_checkout(&self, wait: Duration) {
        self.checkouts.fetch_add(1, Ordering::Relaxed);
        let mut samples = self.samples.lock();
        if samples.len() == WAIT_SAMPLE_CAPACITY {
            samples.pop_front();
        }
        samples.push_back(wait);
    }

    /// Record a checkout that gave up waiting.
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Successful checkouts so far.
    pub fn checkouts(&self) -> u64 {
        self.checkouts.load(Ordering::Relaxed)
    }

    /// Timed-out checkouts so far.
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Nearest-rank percentile of the recorded wait times.
    ///
    /// `quantile` is clamped to `0.0..=1.0`. Returns `None` before the first
    /// checkout.
    pub fn percentile(&self, quantile: f64) -> Option<Duration> {
        let mut sorted: Vec<Duration> = self.samples.lock().iter().copied().collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_unstable();

        let n = sorted.len();
        let rank = (quantile.clamp(0.0, 1.0) * n as f64).ceil() as usize;
        Some(sorted[rank.clamp(1, n) - 1])
    }
}

// ---------------------------------------------------------------------------
// r2d2 adapters
// ---------------------------------------------------------------------------

/// Forwards r2d2 pool events into a shared [`WaitTimeRecorder`].
#[derive(Debug)]
pub(crate) struct EventBridge {
    data_source: String,
    recorder: Arc<WaitTimeRecorder>,
}

impl EventBridge {
    pub(crate) fn new(data_source: &str, recorder: Arc<WaitTimeRecorder>) -> Self {
        Self {
            data_source: data_source.to_owned(),
            recorder,
        }
    }
}

impl r2d2::HandleEvent for EventBridge {
    fn handle_acquire(&self, event: r2d2::event::AcquireEvent) {
        tracing::trace!(data_source = %self.data_source, connection = event.connection_id(), "Connection opened");
    }

    fn handle_release(&self, event: r2d2::event::ReleaseEvent) {
        tracing::trace!(
            data_source = %self.data_source,
            connection = event.connection_id(),
            age_ms = event.age().as_millis() as u64,
            "Connection closed"
        );
    }

    fn handle_checkout(&self, event: r2d2::event::CheckoutEvent) {
        self.recorder.record_checkout(event.duration());
    }

    fn handle_timeout(&self, event: r2d2::event::TimeoutEvent) {
        self.recorder.record_timeout();
        tracing::warn!(
            data_source = %self.data_source,
            timeout_ms = event.timeout().as_millis() as u64,
            "Connection checkout timed out"
        );
    }
}

/// Logs connection errors reported by r2d2 through `tracing`.
#[derive(Debug)]
pub(crate) struct TracingErrorHandler {
    data_source: String,
}

impl TracingErrorHandler {
    pub(crate) fn new(data_source: &str) -> Self {
        Self {
            data_source: data_source.to_owned(),
        }
    }
}

impl<E: std::fmt::Display> r2d2::HandleError<E> for TracingErrorHandler {
    fn handle_error(&self, error: E) {
        tracing::warn!(data_source = %self.data_source, error = %error, "Connection error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_is_none_without_samples() {
        let recorder = WaitTimeRecorder::default();
        assert_eq!(recorder.percentile(0.99), None);
    }

    #[test]
    fn percentile_uses_nearest_rank() {
        let recorder = WaitTimeRecorder::default();
        for ms in 1..=100 {
            recorder.record_checkout(Duration::from_millis(ms));
        }
        assert_eq!(recorder.percentile(0.99), Some(Duration::from_millis(99)));
        assert_eq!(recorder.percentile(0.5), Some(Duration::from_millis(50)));
        assert_eq!(recorder.percentile(0.0), Some(Duration::from_millis(1)));
        assert_eq!(recorder.percentile(1.0), Some(Duration::from_millis(100)));
        assert_eq!(recorder.checkouts(), 100);
    }

    #[test]
    fn window_keeps_most_recent_samples() {
        let recorder = WaitTimeRecorder::default();
        for _ in 0..WAIT_SAMPLE_CAPACITY {
            recorder.record_checkout(Duration::from_secs(10));
        }
        for _ in 0..WAIT_SAMPLE_CAPACITY {
            recorder.record_checkout(Duration::from_millis(1));
        }
        assert_eq!(recorder.percentile(1.0), Some(Duration::from_millis(1)));
        assert_eq!(recorder.checkouts(), 2 * WAIT_SAMPLE_CAPACITY as u64);
    }

    #[test]
    fn timeouts_are_counted() {
        let recorder = WaitTimeRecorder::default();
        recorder.record_timeout();
        recorder.record_timeout();
        assert_eq!(recorder.timeouts(), 2);
    }
}
