//! Sample-accurate engine time.
//!
//! The engine does not consult wall time. [`AudioClock`] counts frames the
//! graph has rendered and exposes them as seconds, so transport timing is
//! exact, deterministic, and advanceable from tests without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic clock driven by rendered frames.
///
/// Shared between the render path (which advances it) and control code
/// (which reads it), so all access is atomic.
#[derive(Debug)]
pub struct AudioClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl AudioClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate,
        }
    }

    /// Total frames rendered since the clock was created.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Current time in seconds.
    pub fn now_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Advance by a rendered block.
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }
}
