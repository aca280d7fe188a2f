//! Frame timing statistics.

use std::time::{Duration, Instant};

/// Smoothing factor for the exponential moving average of the frame rate.
const FPS_SMOOTHING: f32 = 0.1;

/// Tracks frame deltas, total frame count and a smoothed frame rate.
///
/// Call [`FrameClock::tick`] once per presented frame.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_tick: Instant,
    delta: Duration,
    total_frames: u64,
    smoothed_fps: f32,
}

impl FrameClock {
    /// Create a new clock, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            delta: Duration::ZERO,
            total_frames: 0,
            smoothed_fps: 0.0,
        }
    }

    /// Record the end of a frame and return the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        self.record(now - self.last_tick);
        self.last_tick = now;
        self.delta
    }

    fn record(&mut self, delta: Duration) {
        self.delta = delta;
        self.total_frames += 1;

        let secs = delta.as_secs_f32();
        if secs > 0.0 {
            let instant_fps = 1.0 / secs;
            self.smoothed_fps = if self.smoothed_fps == 0.0 {
                instant_fps
            } else {
                self.smoothed_fps + (instant_fps - self.smoothed_fps) * FPS_SMOOTHING
            };
        }
    }

    /// Duration of the most recent frame.
    #[inline]
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Number of ticks recorded so far.
    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Exponentially smoothed frames per second.
    #[inline]
    pub fn fps(&self) -> f32 {
        self.smoothed_fps
    }

    /// Time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clock_is_empty() {
        let clock = FrameClock::new();
        assert_eq!(clock.total_frames(), 0);
        assert_eq!(clock.delta(), Duration::ZERO);
        assert_eq!(clock.fps(), 0.0);
    }

    #[test]
    fn test_record_counts_frames() {
        let mut clock = FrameClock::new();
        clock.record(Duration::from_millis(16));
        clock.record(Duration::from_millis(16));
        assert_eq!(clock.total_frames(), 2);
        assert_eq!(clock.delta(), Duration::from_millis(16));
    }

    #[test]
    fn test_first_sample_sets_fps() {
        let mut clock = FrameClock::new();
        clock.record(Duration::from_millis(10));
        assert!((clock.fps() - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_fps_is_smoothed() {
        let mut clock = FrameClock::new();
        clock.record(Duration::from_millis(10));
        clock.record(Duration::from_millis(20));
        // 100 + (50 - 100) * 0.1
        assert!((clock.fps() - 95.0).abs() < 0.01);
    }

    #[test]
    fn test_zero_delta_keeps_fps() {
        let mut clock = FrameClock::new();
        clock.record(Duration::from_millis(10));
        clock.record(Duration::ZERO);
        assert!((clock.fps() - 100.0).abs() < 0.01);
        assert_eq!(clock.total_frames(), 2);
    }
}
