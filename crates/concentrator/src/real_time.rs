//! Real-time estimation
//!
//! The concentrator's notion of "now" follows the newest trustworthy sample
//! timestamp, bounded by the local clock +/- lead time. Updates are a single
//! compare-and-swap on an atomic tick counter, so producers never block on
//! one another.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use contracts::{Clock, ConcentratorConfig, Ticks};

/// Estimation settings derived from the concentrator configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RealTimePolicy {
    pub use_local_clock: bool,
    pub reasonability_check: bool,
    pub lead: Ticks,
}

impl From<&ConcentratorConfig> for RealTimePolicy {
    fn from(config: &ConcentratorConfig) -> Self {
        Self {
            use_local_clock: config.use_local_clock_as_real_time,
            reasonability_check: config.perform_timestamp_reasonability_check,
            lead: config.lead_ticks(),
        }
    }
}

/// Lock-free real-time estimate.
#[derive(Debug)]
pub(crate) struct RealTimeEstimator {
    /// 0 = never set
    ticks: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl RealTimeEstimator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            ticks: AtomicI64::new(0),
            clock,
        }
    }

    /// Best current estimate of now.
    ///
    /// Snaps to the local clock when the estimate was never seeded or (with
    /// the reasonability check on) has drifted beyond the lead time.
    pub fn current(&self, policy: RealTimePolicy) -> Ticks {
        self.resolve(None, policy)
    }

    /// Like [`Self::current`], but an unseeded estimate starts at
    /// `candidate` when the reasonability check is off.
    ///
    /// Without the check the local clock is not trusted, so the first
    /// sample's own timestamp becomes real time.
    pub fn seed_or_current(&self, candidate: Ticks, policy: RealTimePolicy) -> Ticks {
        self.resolve(Some(candidate), policy)
    }

    fn resolve(&self, candidate: Option<Ticks>, policy: RealTimePolicy) -> Ticks {
        if policy.use_local_clock {
            return self.clock.now();
        }

        let current = self.ticks.load(Ordering::Acquire);
        let drifted = || {
            let now = self.clock.now();
            now.value().saturating_sub(current).saturating_abs() > policy.lead.value()
        };

        let seed = if current == 0 {
            match candidate {
                Some(candidate) if !policy.reasonability_check => candidate.value(),
                _ => self.clock.now().value(),
            }
        } else if policy.reasonability_check && drifted() {
            self.clock.now().value()
        } else {
            return Ticks::new(current);
        };

        match self
            .ticks
            .compare_exchange(current, seed, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ticks::new(seed),
            // Another thread moved the estimate first; theirs wins.
            Err(actual) => Ticks::new(actual),
        }
    }

    /// Offers a sample timestamp as a new estimate.
    ///
    /// The estimate only moves forward. With the reasonability check on, a
    /// timestamp outside `now +/- lead` is never trusted.
    pub fn advance(&self, timestamp: Ticks, policy: RealTimePolicy) {
        if policy.use_local_clock {
            return;
        }

        if policy.reasonability_check
            && !timestamp.is_within(self.clock.now(), policy.lead, policy.lead)
        {
            return;
        }

        let candidate = timestamp.value();
        let mut current = self.ticks.load(Ordering::Acquire);
        while candidate > current {
            match self.ticks.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Forgets the estimate; the next read re-seeds from the clock.
    pub fn reset(&self) {
        self.ticks.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ManualClock;
    use std::thread;

    const T0: i64 = 638_000_000_000_000_000;

    fn policy() -> RealTimePolicy {
        RealTimePolicy {
            use_local_clock: false,
            reasonability_check: true,
            lead: Ticks::new(Ticks::PER_SECOND),
        }
    }

    fn estimator() -> (Arc<ManualClock>, RealTimeEstimator) {
        let clock = Arc::new(ManualClock::new(Ticks::new(T0)));
        let estimator = RealTimeEstimator::new(clock.clone());
        (clock, estimator)
    }

    #[test]
    fn test_seeds_from_clock() {
        let (_, estimator) = estimator();
        assert_eq!(estimator.current(policy()), Ticks::new(T0));
    }

    #[test]
    fn test_advances_to_newer_reasonable_timestamp() {
        let (_, estimator) = estimator();
        estimator.current(policy());
        estimator.advance(Ticks::new(T0 + 500), policy());
        assert_eq!(estimator.current(policy()), Ticks::new(T0 + 500));

        // Older timestamps never regress the estimate
        estimator.advance(Ticks::new(T0 + 100), policy());
        assert_eq!(estimator.current(policy()), Ticks::new(T0 + 500));
    }

    #[test]
    fn test_rejects_timestamp_beyond_lead() {
        let (_, estimator) = estimator();
        estimator.current(policy());
        estimator.advance(Ticks::new(T0 + 2 * Ticks::PER_SECOND), policy());
        assert_eq!(estimator.current(policy()), Ticks::new(T0));
    }

    #[test]
    fn test_snaps_back_to_clock_after_drift() {
        let (clock, estimator) = estimator();
        estimator.current(policy());
        clock.advance(Ticks::new(5 * Ticks::PER_SECOND));
        assert_eq!(
            estimator.current(policy()),
            Ticks::new(T0 + 5 * Ticks::PER_SECOND)
        );
    }

    #[test]
    fn test_without_reasonability_check_accepts_any_newer() {
        let (clock, estimator) = estimator();
        let lax = RealTimePolicy {
            reasonability_check: false,
            ..policy()
        };
        estimator.current(lax);
        let far = Ticks::new(T0 + 60 * Ticks::PER_SECOND);
        estimator.advance(far, lax);
        clock.advance(Ticks::new(10 * Ticks::PER_SECOND));
        assert_eq!(estimator.current(lax), far);
    }

    #[test]
    fn test_unchecked_estimate_seeds_from_sample() {
        let (_, estimator) = estimator();
        let lax = RealTimePolicy {
            reasonability_check: false,
            ..policy()
        };
        let stale = Ticks::new(T0 - 10 * Ticks::PER_SECOND);
        assert_eq!(estimator.seed_or_current(stale, lax), stale);
        // Seeded once; later candidates only read the estimate
        assert_eq!(estimator.seed_or_current(Ticks::new(T0), lax), stale);
        assert_eq!(estimator.current(lax), stale);
    }

    #[test]
    fn test_checked_estimate_ignores_seed_candidate() {
        let (_, estimator) = estimator();
        let stale = Ticks::new(T0 - 10 * Ticks::PER_SECOND);
        assert_eq!(estimator.seed_or_current(stale, policy()), Ticks::new(T0));
    }

    #[test]
    fn test_local_clock_mode() {
        let (clock, estimator) = estimator();
        let local = RealTimePolicy {
            use_local_clock: true,
            ..policy()
        };
        estimator.advance(Ticks::new(T0 + 300), local);
        clock.advance(Ticks::new(7));
        assert_eq!(estimator.current(local), Ticks::new(T0 + 7));
    }

    #[test]
    fn test_concurrent_advance_keeps_maximum() {
        let (_, estimator) = estimator();
        let estimator = Arc::new(estimator);
        estimator.current(policy());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let estimator = estimator.clone();
                thread::spawn(move || {
                    for i in 0..1000 {
                        estimator.advance(Ticks::new(T0 + i * 8 + worker), policy());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(estimator.current(policy()), Ticks::new(T0 + 999 * 8 + 7));
    }
}
