//! Clock - source of local "now"
//!
//! The concentrator never reads the wall clock directly; it asks an injected
//! [`Clock`], so simulations and tests can drive time explicitly.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::Ticks;

/// Local clock abstraction.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current local time.
    fn now(&self) -> Ticks;
}

/// UTC system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Ticks {
        Ticks::now()
    }
}

/// Manually driven clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    ticks: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Ticks) -> Self {
        Self {
            ticks: AtomicI64::new(start.value()),
        }
    }

    pub fn set(&self, ticks: Ticks) {
        self.ticks.store(ticks.value(), Ordering::SeqCst);
    }

    /// Moves the clock forward (or backward for negative values).
    pub fn advance(&self, delta: Ticks) {
        self.ticks.fetch_add(delta.value(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> Ticks {
        Ticks::new(self.ticks.load(Ordering::SeqCst))
    }
}
