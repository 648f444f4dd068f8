//! Clock and timing utilities for playback and job bookkeeping.
//!
//! Two clocks live here:
//! - [`OperationClock`] anchors a job to a monotonic epoch for elapsed-time
//!   reporting and ETA estimates.
//! - [`MediaClock`] is a frame-stepped media position used by sources that
//!   present one decoded frame per display tick.

use std::time::Instant;

/// A wall/monotonic clock pair recorded when an operation starts.
#[derive(Debug, Clone)]
pub struct OperationClock {
    /// The instant the operation started.
    epoch: Instant,

    /// Wall-clock time at epoch (ISO 8601 string).
    epoch_wall: String,
}

impl OperationClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get seconds elapsed since the operation started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at operation start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Estimated seconds remaining given a completion fraction in `[0, 1]`.
    pub fn eta_secs(&self, fraction: f64) -> f64 {
        let elapsed = self.elapsed_secs();
        if fraction <= 0.0 {
            return 0.0;
        }
        ((elapsed / fraction) - elapsed).max(0.0)
    }
}

/// Frame-stepped media position.
///
/// Position only moves when a frame is presented or on seek; it never
/// follows the wall clock.
#[derive(Debug, Clone)]
pub struct MediaClock {
    fps: u32,
    origin_secs: f64,
    frames_presented: u64,
}

impl MediaClock {
    /// Create a clock at position zero.
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.max(1),
            origin_secs: 0.0,
            frames_presented: 0,
        }
    }

    /// Current media position in seconds.
    ///
    /// This is the presentation time of the most recently presented frame,
    /// or the seek origin if no frame was presented since the last seek.
    pub fn current_secs(&self) -> f64 {
        if self.frames_presented == 0 {
            return self.origin_secs;
        }
        self.origin_secs + (self.frames_presented - 1) as f64 * self.frame_interval_secs()
    }

    /// Presentation time of the next frame.
    pub fn next_frame_secs(&self) -> f64 {
        self.origin_secs + self.frames_presented as f64 * self.frame_interval_secs()
    }

    /// Mark one more frame as presented.
    pub fn advance_frame(&mut self) {
        self.frames_presented += 1;
    }

    /// Jump to a new origin; frame counting restarts there.
    pub fn seek(&mut self, secs: f64) {
        self.origin_secs = secs.max(0.0);
        self.frames_presented = 0;
    }

    /// Frames presented since the last seek.
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Duration of one frame.
    pub fn frame_interval_secs(&self) -> f64 {
        frame_interval_secs(self.fps)
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }
}

/// Duration of one frame at the given rate.
pub fn frame_interval_secs(fps: u32) -> f64 {
    1.0 / fps.max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_clock_elapsed() {
        let clock = OperationClock::start();
        assert!(clock.elapsed_secs() < 1.0);
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn test_eta_is_zero_without_progress() {
        let clock = OperationClock::start();
        assert_eq!(clock.eta_secs(0.0), 0.0);
    }

    #[test]
    fn test_media_clock_steps_per_frame() {
        let mut clock = MediaClock::new(30);
        clock.seek(3.0);
        assert!((clock.current_secs() - 3.0).abs() < 1e-9);

        clock.advance_frame();
        assert!((clock.current_secs() - 3.0).abs() < 1e-9);

        clock.advance_frame();
        assert!((clock.current_secs() - (3.0 + 1.0 / 30.0)).abs() < 1e-9);
        assert!((clock.next_frame_secs() - (3.0 + 2.0 / 30.0)).abs() < 1e-9);
    }

    #[test]
    fn test_seek_restarts_frame_count() {
        let mut clock = MediaClock::new(25);
        clock.advance_frame();
        clock.advance_frame();
        clock.seek(1.0);
        assert_eq!(clock.frames_presented(), 0);
        assert!((clock.current_secs() - 1.0).abs() < 1e-9);
    }
}
