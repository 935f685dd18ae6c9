/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Exact duration arithmetic on (seconds, nanoseconds) pairs.
//!
//! Every resource formula downstream reduces to a ratio of two durations.
//! [`Timespec`] keeps both components integral and normalized, so the only
//! rounding in the whole derivation chain happens at the final ceiling of
//! [`Timespec::ceil_ratio`]. In particular the ceiling is taken with integer
//! arithmetic, never by rounding a float, so a ratio that lands exactly on an
//! integer boundary yields that integer and not the next one up.

use thiserror::Error;

/// Nanoseconds per second; `nsec` is always strictly below this.
pub const NSEC_PER_SEC: u32 = 1_000_000_000;

/// Errors from duration arithmetic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimespecError {
    /// The divisor of a ratio was the zero duration.
    #[error("division by a zero-length duration")]
    DivideByZero,
}

/// A nonnegative duration as a normalized `(seconds, nanoseconds)` pair.
///
/// Normalized means `nsec < 1_000_000_000`. The derived `Ord` compares
/// `(sec, nsec)` lexicographically, which is the numeric order for
/// normalized values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timespec {
    sec: u64,
    nsec: u32,
}

impl Timespec {
    /// The zero duration.
    pub const ZERO: Timespec = Timespec { sec: 0, nsec: 0 };

    /// Build a duration from seconds and nanoseconds, normalizing any
    /// nanosecond overflow into the seconds field.
    pub fn new(sec: u64, nsec: u64) -> Self {
        let carry = nsec / u64::from(NSEC_PER_SEC);
        Timespec {
            sec: sec + carry,
            nsec: (nsec % u64::from(NSEC_PER_SEC)) as u32,
        }
    }

    /// Build a duration from a millisecond value.
    ///
    /// `sec = ⌊ms / 1000⌋`, `nsec = (ms − 1000·sec) · 10⁶`. Negative or
    /// non-finite inputs saturate to zero; durations are nonnegative.
    pub fn from_millis_f64(ms: f64) -> Self {
        if !ms.is_finite() || ms <= 0.0 {
            return Timespec::ZERO;
        }
        let sec = (ms / 1000.0).floor();
        let remaining_ms = ms - sec * 1000.0;
        Timespec {
            sec: sec as u64,
            nsec: (remaining_ms * 1_000_000.0) as u32,
        }
    }

    /// Whole-seconds component.
    pub fn sec(&self) -> u64 {
        self.sec
    }

    /// Sub-second nanoseconds component, in `[0, 10⁹)`.
    pub fn subsec_nanos(&self) -> u32 {
        self.nsec
    }

    /// Total length in nanoseconds.
    ///
    /// `u128` so that `sec · 10⁹` cannot overflow for any representable
    /// duration.
    pub fn as_nanos(&self) -> u128 {
        u128::from(self.sec) * u128::from(NSEC_PER_SEC) + u128::from(self.nsec)
    }

    /// True for the zero duration.
    pub fn is_zero(&self) -> bool {
        self.sec == 0 && self.nsec == 0
    }

    /// Difference saturating at zero: `max(0, self − rhs)`, normalized.
    pub fn saturating_sub(self, rhs: Timespec) -> Timespec {
        if self <= rhs {
            return Timespec::ZERO;
        }
        let (mut sec, mut nsec) = (self.sec - rhs.sec, self.nsec as i64 - rhs.nsec as i64);
        if nsec < 0 {
            sec -= 1;
            nsec += i64::from(NSEC_PER_SEC);
        }
        Timespec {
            sec,
            nsec: nsec as u32,
        }
    }

    /// Real-valued ratio `self / rhs`.
    ///
    /// # Errors
    /// [`TimespecError::DivideByZero`] when `rhs` is the zero duration.
    pub fn ratio(self, rhs: Timespec) -> Result<f64, TimespecError> {
        if rhs.is_zero() {
            return Err(TimespecError::DivideByZero);
        }
        Ok(self.as_nanos() as f64 / rhs.as_nanos() as f64)
    }

    /// Integer ceiling of `self / rhs`, computed without passing through a
    /// float: `⌈a/b⌉ = (a + b − 1) / b` over total nanosecond counts.
    ///
    /// # Errors
    /// [`TimespecError::DivideByZero`] when `rhs` is the zero duration.
    pub fn ceil_ratio(self, rhs: Timespec) -> Result<u64, TimespecError> {
        if rhs.is_zero() {
            return Err(TimespecError::DivideByZero);
        }
        let (a, b) = (self.as_nanos(), rhs.as_nanos());
        Ok(((a + b - 1) / b) as u64)
    }
}

impl std::fmt::Display for Timespec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s {}ns", self.sec, self.nsec)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: f64) -> Timespec {
        Timespec::from_millis_f64(v)
    }

    // ── construction / normalization ──────────────────────────────────────────

    #[test]
    fn new_normalizes_nanosecond_overflow() {
        let t = Timespec::new(1, 2_500_000_000);
        assert_eq!(t.sec(), 3);
        assert_eq!(t.subsec_nanos(), 500_000_000);
    }

    #[test]
    fn from_millis_splits_seconds_and_nanos() {
        let t = ms(1234.5);
        assert_eq!(t.sec(), 1);
        assert_eq!(t.subsec_nanos(), 234_500_000);
    }

    #[test]
    fn from_millis_sub_second_value() {
        let t = ms(5.0);
        assert_eq!(t.sec(), 0);
        assert_eq!(t.subsec_nanos(), 5_000_000);
    }

    #[test]
    fn from_millis_negative_saturates_to_zero() {
        assert!(ms(-3.0).is_zero());
        assert!(ms(f64::NAN).is_zero());
    }

    // ── ordering ──────────────────────────────────────────────────────────────

    #[test]
    fn ordering_is_numeric() {
        assert!(ms(4.0) < ms(10.0));
        assert!(Timespec::new(1, 0) > Timespec::new(0, 999_999_999));
        assert_eq!(ms(5.0), Timespec::new(0, 5_000_000));
    }

    // ── saturating_sub ────────────────────────────────────────────────────────

    #[test]
    fn sub_borrows_across_the_second_boundary() {
        let d = Timespec::new(2, 100).saturating_sub(Timespec::new(1, 200));
        assert_eq!(d, Timespec::new(0, 999_999_900));
    }

    #[test]
    fn sub_saturates_at_zero() {
        assert!(ms(1.0).saturating_sub(ms(4.0)).is_zero());
        assert!(ms(4.0).saturating_sub(ms(4.0)).is_zero());
    }

    // ── ratio ─────────────────────────────────────────────────────────────────

    #[test]
    fn ratio_of_millisecond_values() {
        let r = ms(4.0).ratio(ms(5.0)).unwrap();
        assert!((r - 0.8).abs() < 1e-12);
    }

    #[test]
    fn ratio_above_one() {
        let r = ms(10.0).ratio(ms(5.0)).unwrap();
        assert!((r - 2.0).abs() < 1e-12);
    }

    #[test]
    fn ratio_by_zero_is_an_error() {
        assert_eq!(
            ms(1.0).ratio(Timespec::ZERO),
            Err(TimespecError::DivideByZero)
        );
    }

    // ── ceil_ratio ────────────────────────────────────────────────────────────

    #[test]
    fn ceil_ratio_rounds_up() {
        // 3ms / 4ms → 1, 8ms / 3ms → 3
        assert_eq!(ms(3.0).ceil_ratio(ms(4.0)).unwrap(), 1);
        assert_eq!(ms(8.0).ceil_ratio(ms(3.0)).unwrap(), 3);
    }

    #[test]
    fn ceil_ratio_exact_quotient_is_not_bumped() {
        assert_eq!(ms(10.0).ceil_ratio(ms(5.0)).unwrap(), 2);
        assert_eq!(ms(5.0).ceil_ratio(ms(5.0)).unwrap(), 1);
    }

    #[test]
    fn ceil_ratio_of_zero_numerator_is_zero() {
        assert_eq!(Timespec::ZERO.ceil_ratio(ms(5.0)).unwrap(), 0);
    }

    #[test]
    fn ceil_ratio_by_zero_is_an_error() {
        assert_eq!(
            ms(1.0).ceil_ratio(Timespec::ZERO),
            Err(TimespecError::DivideByZero)
        );
    }
}
