//! Driver state and the notifications it produces.
//!
//! The model owns the `(state, paused)` pair; health is always derived from the
//! state. Every mutator returns the new [`DriverStatus`] only when the
//! externally observable triple actually changed, and the caller publishes
//! exactly that. Steady-state ticks therefore produce no status traffic.

use crate::control::types::{DriverStatus, Health, SensorState};

#[derive(Debug)]
pub struct StatusModel {
    current: DriverStatus,
}

impl StatusModel {
    /// A closed, paused driver.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: DriverStatus {
                state: SensorState::Closed,
                paused: true,
            },
        }
    }

    #[must_use]
    pub const fn status(&self) -> DriverStatus {
        self.current
    }

    #[must_use]
    pub const fn state(&self) -> SensorState {
        self.current.state
    }

    #[must_use]
    pub const fn health(&self) -> Health {
        self.current.health()
    }

    #[must_use]
    pub const fn paused(&self) -> bool {
        self.current.paused
    }

    /// Commits `state`. Returns the status to publish, or `None` if nothing changed.
    #[must_use]
    pub fn set_state(&mut self, state: SensorState) -> Option<DriverStatus> {
        if self.current.state == state {
            return None;
        }
        self.current.state = state;
        Some(self.current)
    }

    /// Commits `paused`. Same dedup rule as [`StatusModel::set_state`].
    #[must_use]
    pub fn set_paused(&mut self, paused: bool) -> Option<DriverStatus> {
        if self.current.paused == paused {
            return None;
        }
        self.current.paused = paused;
        Some(self.current)
    }

    /// Commits `closed` unless health is already bad.
    ///
    /// A driver that faulted or timed out keeps reporting that on the way down.
    #[must_use]
    pub fn close(&mut self) -> Option<DriverStatus> {
        if self.health() == Health::Bad {
            return None;
        }
        self.set_state(SensorState::Closed)
    }
}

impl Default for StatusModel {
    fn default() -> Self {
        Self::new()
    }
}
