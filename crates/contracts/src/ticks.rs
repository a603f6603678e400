//! Ticks - fixed resolution timestamp
//!
//! One tick is 100 nanoseconds, counted from the Unix epoch (UTC).

use std::fmt;
use std::ops::{Add, Sub};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp or duration measured in 100 ns ticks.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Ticks(i64);

impl Ticks {
    /// Ticks in one second
    pub const PER_SECOND: i64 = 10_000_000;
    /// Ticks in one millisecond
    pub const PER_MILLISECOND: i64 = 10_000;
    /// Zero ticks (also "never set")
    pub const ZERO: Ticks = Ticks(0);

    #[inline]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Current UTC wall clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp() * Self::PER_SECOND + i64::from(dt.timestamp_subsec_nanos()) / 100)
    }

    /// Converts back to a UTC date/time, `None` if out of chrono's range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let secs = self.0.div_euclid(Self::PER_SECOND);
        let nanos = (self.0.rem_euclid(Self::PER_SECOND) * 100) as u32;
        DateTime::<Utc>::from_timestamp(secs, nanos)
    }

    /// Seconds (may be fractional) to ticks, rounded to the nearest tick.
    #[inline]
    pub fn from_seconds(seconds: f64) -> Self {
        Self((seconds * Self::PER_SECOND as f64).round() as i64)
    }

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        Self(millis * Self::PER_MILLISECOND)
    }

    #[inline]
    pub fn to_seconds(self) -> f64 {
        self.0 as f64 / Self::PER_SECOND as f64
    }

    #[inline]
    pub fn to_millis(self) -> f64 {
        self.0 as f64 / Self::PER_MILLISECOND as f64
    }

    /// Top of the second containing this timestamp.
    #[inline]
    pub fn base_of_second(self) -> Self {
        Self(self.0.saturating_sub(self.0.rem_euclid(Self::PER_SECOND)))
    }

    /// Ticks elapsed since the top of the containing second.
    #[inline]
    pub fn distance_beyond_second(self) -> i64 {
        self.0.rem_euclid(Self::PER_SECOND)
    }

    /// Whether this timestamp lies within `[reference - lag, reference + lead]`.
    pub fn is_within(self, reference: Ticks, lag: Ticks, lead: Ticks) -> bool {
        let distance = reference.0.saturating_sub(self.0);
        distance <= lag.0 && distance >= -lead.0
    }
}

impl From<i64> for Ticks {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

// Producer timestamps are untrusted input: arithmetic saturates instead of
// overflowing.
impl Add for Ticks {
    type Output = Ticks;

    fn add(self, rhs: Ticks) -> Ticks {
        Ticks(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Ticks {
    type Output = Ticks;

    fn sub(self, rhs: Ticks) -> Ticks {
        Ticks(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%d-%b-%Y %H:%M:%S%.3f")),
            None => write!(f, "{} ticks", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_second_arithmetic() {
        let t = Ticks::new(3 * Ticks::PER_SECOND + 1234);
        assert_eq!(t.base_of_second(), Ticks::new(3 * Ticks::PER_SECOND));
        assert_eq!(t.distance_beyond_second(), 1234);
    }

    #[test]
    fn test_datetime_conversion() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let ticks = Ticks::from_datetime(dt);
        assert_eq!(ticks.to_datetime(), Some(dt));
        assert_eq!(ticks.to_string(), "01-Mar-2024 12:00:00.000");
    }

    #[test]
    fn test_seconds_conversion() {
        assert_eq!(Ticks::from_seconds(0.1), Ticks::new(1_000_000));
        assert_eq!(Ticks::from_millis(5), Ticks::new(50_000));
        assert!((Ticks::new(15_000_000).to_seconds() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_arithmetic_saturates_at_extremes() {
        let now = Ticks::new(638_000_000_000_000_000);
        assert_eq!((now - Ticks::new(i64::MIN)).value(), i64::MAX);
        assert_eq!((Ticks::new(i64::MIN) - now).value(), i64::MIN);
        assert_eq!((Ticks::new(i64::MAX) + now).value(), i64::MAX);
        assert!(!Ticks::new(i64::MIN).is_within(now, Ticks::new(10), Ticks::new(10)));
        assert!(Ticks::new(i64::MIN).base_of_second() <= Ticks::new(i64::MIN));
    }

    #[test]
    fn test_is_within() {
        let reference = Ticks::new(100);
        assert!(Ticks::new(90).is_within(reference, Ticks::new(10), Ticks::new(5)));
        assert!(!Ticks::new(89).is_within(reference, Ticks::new(10), Ticks::new(5)));
        assert!(Ticks::new(105).is_within(reference, Ticks::new(10), Ticks::new(5)));
        assert!(!Ticks::new(106).is_within(reference, Ticks::new(10), Ticks::new(5)));
    }
}
