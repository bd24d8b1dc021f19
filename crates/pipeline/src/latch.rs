//! One-shot trigger latch for the analysis side effect.

use std::sync::atomic::{AtomicU8, Ordering};

/// Observable state of a [`TriggerLatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    NotStarted,
    InFlight,
    Done,
}

const NOT_STARTED: u8 = 0;
const IN_FLIGHT: u8 = 1;
const DONE: u8 = 2;

/// Tri-state latch: `NotStarted → InFlight → Done`, never backwards.
///
/// [`try_begin`](Self::try_begin) succeeds for exactly one caller, no matter
/// how many race for it, and the latch leaves `NotStarted` before the
/// guarded effect starts running.
#[derive(Debug, Default)]
pub struct TriggerLatch {
    state: AtomicU8,
}

impl TriggerLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the trigger. Returns `true` only for the first caller.
    pub fn try_begin(&self) -> bool {
        self.state
            .compare_exchange(NOT_STARTED, IN_FLIGHT, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Mark the guarded effect as finished.
    pub fn finish(&self) {
        self.state.store(DONE, Ordering::Release);
    }

    pub fn state(&self) -> LatchState {
        match self.state.load(Ordering::Acquire) {
            NOT_STARTED => LatchState::NotStarted,
            IN_FLIGHT => LatchState::InFlight,
            _ => LatchState::Done,
        }
    }
}
