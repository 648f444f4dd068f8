//! Job progress reporting.

use clipforge_common::clock::OperationClock;
use tokio::sync::watch;

use crate::job::JobState;

/// Highest percentage published before the terminal event.
pub const MAX_RECORDING_PERCENT: f64 = 99.0;

/// A progress sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobProgress {
    /// Completion in `[0, 100]`.
    pub percent: f64,
    pub state: JobState,
    /// Estimated seconds until the recording reaches its end.
    pub eta_secs: f64,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            percent: 0.0,
            state: JobState::Idle,
            eta_secs: 0.0,
        }
    }
}

/// `clamp((t - start) / (end - start) x 100, 0, 99)`.
pub fn range_percent(current_secs: f64, start_secs: f64, end_secs: f64) -> f64 {
    let span = end_secs - start_secs;
    if span.is_nan() || span <= 0.0 || !current_secs.is_finite() {
        return 0.0;
    }
    ((current_secs - start_secs) / span * 100.0).clamp(0.0, MAX_RECORDING_PERCENT)
}

/// Publishes non-decreasing progress on a watch channel.
///
/// Values stay at or below 99 until [`ProgressTracker::complete`] is called
/// by the terminal event.
#[derive(Debug)]
pub struct ProgressTracker {
    tx: watch::Sender<JobProgress>,
    current: JobProgress,
    clock: OperationClock,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let current = JobProgress::default();
        let (tx, _rx) = watch::channel(current);
        Self {
            tx,
            current,
            clock: OperationClock::start(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<JobProgress> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> JobProgress {
        self.current
    }

    /// Publish a recording percentage; never moves backwards.
    pub fn update(&mut self, percent: f64) {
        let capped = percent.clamp(0.0, MAX_RECORDING_PERCENT);
        if capped > self.current.percent {
            self.current.percent = capped;
            self.current.eta_secs = self.clock.eta_secs(capped / 100.0);
            self.publish();
        }
    }

    pub fn set_state(&mut self, state: JobState) {
        if self.current.state != state {
            self.current.state = state;
            self.publish();
        }
    }

    /// Terminal success: 100%.
    pub fn complete(&mut self) {
        self.current = JobProgress {
            percent: 100.0,
            state: JobState::Done,
            eta_secs: 0.0,
        };
        self.publish();
    }

    fn publish(&self) {
        self.tx.send_replace(self.current);
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
