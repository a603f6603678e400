//! Frame-rate timer
//!
//! Millisecond timers cannot express 33.33 ms, so one second is split into
//! integer waits that sum to exactly 1000 ms, with the remainder spread
//! evenly across the second.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Upper bound on timer ticks per second (1 ms resolution).
pub const MAX_TIMER_RATE: u32 = 1000;

/// Deadlines further behind than this are dropped instead of replayed.
const MAX_SCHEDULE_SLIP: Duration = Duration::from_secs(1);

/// Integer millisecond wait before each frame of one second.
///
/// Frame `i` ends at `round(1000 * (i + 1) / n)`, the millisecond closest
/// to its ideal boundary, so the waits sum to 1000 and neighbours never
/// differ by more than 1 ms. Rates above 1000 fps are capped at 1000 waits.
pub fn frame_periods(frames_per_second: u32) -> Vec<u32> {
    let n = u64::from(frames_per_second.clamp(1, MAX_TIMER_RATE));
    let boundary = |i: u64| ((1000 * i + n / 2) / n) as u32;
    (0..n).map(|i| boundary(i + 1) - boundary(i)).collect()
}

/// Cycles through the per-frame wait periods, yielding absolute deadlines.
#[derive(Debug)]
pub(crate) struct FrameRateTimer {
    periods: Vec<Duration>,
    index: usize,
    deadline: Instant,
}

impl FrameRateTimer {
    pub fn new(frames_per_second: u32, start: Instant) -> Self {
        Self {
            periods: Self::durations(frames_per_second),
            index: 0,
            deadline: start,
        }
    }

    fn durations(frames_per_second: u32) -> Vec<Duration> {
        frame_periods(frames_per_second)
            .into_iter()
            .map(|ms| Duration::from_millis(u64::from(ms)))
            .collect()
    }

    /// Replaces the period table, keeping the current deadline.
    pub fn set_frame_rate(&mut self, frames_per_second: u32) {
        self.periods = Self::durations(frames_per_second);
        self.index = 0;
    }

    /// Advances to the next deadline.
    ///
    /// If the schedule slipped more than a second behind `now` it restarts
    /// from `now`; catching up is the publisher's job, not the timer's.
    pub fn next_deadline(&mut self, now: Instant) -> Instant {
        let period = self.periods[self.index];
        self.index = (self.index + 1) % self.periods.len();
        self.deadline += period;
        if now.saturating_duration_since(self.deadline) > MAX_SCHEDULE_SLIP {
            self.deadline = now + period;
        }
        self.deadline
    }
}

/// Stop signal shared with the worker threads.
#[derive(Debug, Default)]
pub(crate) struct ShutdownSignal {
    stopped: Mutex<bool>,
    changed: Condvar,
}

impl ShutdownSignal {
    pub fn trigger(&self) {
        let mut stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        *stopped = true;
        self.changed.notify_all();
    }

    pub fn reset(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// Sleeps until `deadline`; returns `true` if stopped meanwhile.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if *stopped {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            stopped = self
                .changed
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}
