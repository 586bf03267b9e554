//! Drift-corrected reference time.
//!
//! The controller periodically sends `(reference_time, local_time_at_source)`.
//! On receipt the pair is corrected for transit delay and stored together with
//! the local receipt time; between updates the current reference time is
//! extrapolated forward with the local clock.

use crate::clock::Clock;
use crate::control::types::TimeReference;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Anchor {
    corrected_reference: f64,
    local_receipt_time: f64,
}

/// Keeps the most recent time reference; older ones are discarded.
#[derive(Debug, Default)]
pub struct TimeSynchronizer {
    anchor: Option<Anchor>,
}

impl TimeSynchronizer {
    #[must_use]
    pub const fn new() -> Self {
        Self { anchor: None }
    }

    /// Records a reference received now.
    pub fn on_time_reference(&mut self, reference: TimeReference, clock: &impl Clock) {
        let local_receipt_time = clock.now();
        let corrected_reference =
            reference.reference_time + (local_receipt_time - reference.local_time_at_source);
        self.anchor = Some(Anchor {
            corrected_reference,
            local_receipt_time,
        });
    }

    /// Current reference time, or `0.0` if no reference has been received yet.
    ///
    /// Extrapolation only moves forward: a local clock reading earlier than the
    /// receipt time contributes nothing.
    #[must_use]
    pub fn current_time(&self, clock: &impl Clock) -> f64 {
        match self.anchor {
            None => 0.0,
            Some(anchor) => {
                let elapsed = clock.now() - anchor.local_receipt_time;
                anchor.corrected_reference + elapsed.max(0.0)
            }
        }
    }

    #[must_use]
    pub const fn has_reference(&self) -> bool {
        self.anchor.is_some()
    }
}
