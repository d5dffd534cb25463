//! Frame timing.

use std::time::{Duration, Instant};

/// Deltas above this are clamped so a long stall (debugger, window drag)
/// does not hand a huge step to the frame loop.
const MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

/// Measures per-frame delta time and total run time.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    frames: u64,
}

impl FrameTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frames: 0,
        }
    }

    /// Time since the timer was created or last reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Advances one frame and returns the clamped delta in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        self.tick_at(now)
    }

    fn tick_at(&mut self, now: Instant) -> f32 {
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.frames += 1;
        delta.min(MAX_FRAME_DELTA).as_secs_f32()
    }

    /// Number of ticks since creation or last reset.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Average frames per second over the timer's lifetime.
    pub fn average_fps(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
        self.frames = 0;
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames() {
        let mut timer = FrameTimer::new();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frames(), 2);

        timer.reset();
        assert_eq!(timer.frames(), 0);
    }

    #[test]
    fn test_tick_clamps_long_stalls() {
        let mut timer = FrameTimer::new();
        let later = timer.last_tick + Duration::from_secs(5);
        let delta = timer.tick_at(later);
        assert!((delta - MAX_FRAME_DELTA.as_secs_f32()).abs() < f32::EPSILON);
    }

    #[test]
    fn test_tick_reports_short_deltas_unchanged() {
        let mut timer = FrameTimer::new();
        let later = timer.last_tick + Duration::from_millis(16);
        let delta = timer.tick_at(later);
        assert!((delta - 0.016).abs() < 1e-6);
    }
}
