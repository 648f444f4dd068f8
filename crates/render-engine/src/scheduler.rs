//! Display-refresh scheduler backed by a tokio interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::host::{DisplayScheduler, EventSender, HostEvent};

/// Emits one `FrameReady` per requested frame, on refresh ticks at `fps`.
///
/// Unrequested ticks are dropped, so a slow consumer never builds a
/// backlog of frame signals.
#[derive(Debug, Default)]
pub struct IntervalScheduler {
    requested: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplayScheduler for IntervalScheduler {
    fn start(&mut self, events: EventSender, fps: u32) {
        self.stop();
        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        let requested = Arc::clone(&self.requested);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if requested.swap(false, Ordering::SeqCst)
                    && events.send(HostEvent::FrameReady).is_err()
                {
                    break;
                }
            }
        }));
        tracing::debug!(fps, "Display scheduler started");
    }

    fn request_frame(&mut self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Display scheduler stopped");
        }
        self.requested.store(false, Ordering::SeqCst);
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_one_frame_per_request() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = IntervalScheduler::new();
        scheduler.start(tx, 1000);

        scheduler.request_frame();
        assert_eq!(rx.recv().await, Some(HostEvent::FrameReady));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());

        scheduler.request_frame();
        assert_eq!(rx.recv().await, Some(HostEvent::FrameReady));
        scheduler.stop();
    }
}
