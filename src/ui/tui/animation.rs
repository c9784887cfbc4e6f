//! Easing and frame bookkeeping for the card animations.
//!
//! Nothing here reads a clock. Callers feed elapsed time in, so the same
//! sequence of `advance` calls always produces the same frames.

use std::time::Duration;

/// Quadratic ease-out: fast start, slow end.
pub fn ease_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * (2.0 - t)
}

/// Linear progress of `elapsed` through `total`, clamped to 1.0.
///
/// A zero-length transition is always complete.
pub fn progress(elapsed: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / total.as_secs_f64()).min(1.0)
}

/// Values that can be interpolated.
pub trait Tweenable: Clone {
    fn lerp(&self, other: &Self, t: f64) -> Self;
}

impl Tweenable for u16 {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        let from = *self as f64;
        let to = *other as f64;
        (from + (to - from) * t).round() as u16
    }
}

const CURSOR_BLINK: Duration = Duration::from_millis(500);

/// Frame counter and cursor blink driven by elapsed time.
#[derive(Debug, Clone)]
pub struct AnimationState {
    /// Frames rendered so far
    pub frame: u64,
    /// Time since start
    pub elapsed: Duration,
}

impl Default for AnimationState {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationState {
    pub fn new() -> Self {
        Self {
            frame: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Account for one rendered frame after `dt`.
    pub fn tick(&mut self, dt: Duration) {
        self.frame = self.frame.wrapping_add(1);
        self.elapsed += dt;
    }

    /// Get a spinner character based on the current frame.
    pub fn spinner_char<'a>(&self, chars: &'a [&'a str]) -> &'a str {
        if chars.is_empty() {
            return "";
        }
        chars[(self.frame as usize) % chars.len()]
    }

    /// Whether the input cursor is in the visible half of its blink.
    pub fn cursor_visible(&self) -> bool {
        (self.elapsed.as_millis() / CURSOR_BLINK.as_millis()) % 2 == 0
    }
}
