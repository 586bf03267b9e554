//! Time sources for the driver runtime.
//!
//! All timestamps are `f64` seconds since the Unix epoch. The controller stamps
//! time references with its own system clock, so the driver must compare them
//! against a wall-clock-anchored value rather than an arbitrary monotonic origin.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use minstant::{Anchor, Instant};

/// Source of "now" and the only suspension point of the run loop.
pub trait Clock {
    /// Current system time in seconds.
    fn now(&self) -> f64;

    /// Suspends the calling thread for `seconds`. Negative values are treated as zero.
    fn sleep(&self, seconds: f64);
}

/// Wall-clock time derived from the TSC via `minstant`.
///
/// The anchor pins the cycle counter to the Unix epoch once at construction;
/// later reads are monotonic and cheap.
pub struct SystemClock {
    anchor: Anchor,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            anchor: Anchor::new(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Instant::now().as_unix_nanos(&self.anchor) as f64 / 1e9
    }

    fn sleep(&self, seconds: f64) {
        if let Ok(duration) = Duration::try_from_secs_f64(seconds) {
            std::thread::sleep(duration);
        }
    }
}

/// Manually driven clock for deterministic tests and simulations.
///
/// Cloned handles share the same reading. `sleep` advances the reading instead
/// of blocking, so a scheduler running on this clock jumps straight to its next
/// deadline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock reading `start` seconds.
    #[must_use]
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    /// Sets the reading to `seconds`.
    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    /// Moves the reading forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        let _ = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + seconds).to_bits())
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    fn sleep(&self, seconds: f64) {
        if seconds > 0.0 {
            self.advance(seconds);
        }
    }
}

impl<K: Clock + ?Sized> Clock for &K {
    fn now(&self) -> f64 {
        (**self).now()
    }

    fn sleep(&self, seconds: f64) {
        (**self).sleep(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_near_wall_clock() {
        let clock = SystemClock::new();
        let wall = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        assert!((clock.now() - wall).abs() < 1.0);
    }

    #[test]
    fn system_clock_does_not_go_backwards() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_sleep_advances() {
        let clock = ManualClock::new(10.0);
        clock.sleep(0.25);
        assert!((clock.now() - 10.25).abs() < 1e-9);
        clock.sleep(-5.0);
        assert!((clock.now() - 10.25).abs() < 1e-9);
    }

    #[test]
    fn manual_clock_handles_share_reading() {
        let clock = ManualClock::new(0.0);
        let other = clock.clone();
        other.set(42.0);
        assert_eq!(clock.now(), 42.0);
    }
}
