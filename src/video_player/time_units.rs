// SPDX-License-Identifier: MPL-2.0
//! Time unit conversion utilities for the decode pipeline.
//!
//! Seek requests are stored in microseconds (the container-wide time base);
//! packet sources expect targets in each stream's native time base.

/// Microseconds per second as f64 for calculations.
pub const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Converts PTS seconds to microseconds.
///
/// # Examples
///
/// ```
/// use video_sync::video_player::time_units::pts_to_micros;
///
/// assert_eq!(pts_to_micros(1.0), 1_000_000);
/// assert_eq!(pts_to_micros(0.5), 500_000);
/// ```
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub fn pts_to_micros(pts_secs: f64) -> i64 {
    (pts_secs * MICROS_PER_SECOND) as i64
}

/// Converts microseconds to PTS seconds.
///
/// # Examples
///
/// ```
/// use video_sync::video_player::time_units::micros_to_pts;
///
/// assert_eq!(micros_to_pts(1_000_000), 1.0);
/// assert_eq!(micros_to_pts(500_000), 0.5);
/// ```
#[inline]
#[allow(clippy::cast_precision_loss)]
pub fn micros_to_pts(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_SECOND
}

/// Rational time base of a stream: one tick lasts `num / den` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    /// Microsecond time base used for seek targets.
    pub const MICROS: TimeBase = TimeBase::new(1, 1_000_000);

    #[must_use]
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Duration of one tick in seconds, or 0.0 for a degenerate time base.
    #[must_use]
    pub fn as_secs(self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        f64::from(self.num) / f64::from(self.den)
    }

    /// Converts a timestamp in this time base to seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_secs(self, ticks: i64) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        ticks as f64 * f64::from(self.num) / f64::from(self.den)
    }

    /// Converts a timestamp in `from` units into this time base, rounding to
    /// the nearest tick.
    #[must_use]
    pub fn rescale(self, ticks: i64, from: TimeBase) -> i64 {
        if self.num == 0 || from.den == 0 {
            return 0;
        }
        let numerator = i128::from(ticks) * i128::from(from.num) * i128::from(self.den);
        let denominator = i128::from(from.den) * i128::from(self.num);
        let half = denominator.abs() / 2;
        let rounded = if (numerator < 0) == (denominator < 0) {
            (numerator.abs() + half) / denominator.abs()
        } else {
            -((numerator.abs() + half) / denominator.abs())
        };
        i64::try_from(rounded).unwrap_or(if rounded < 0 { i64::MIN } else { i64::MAX })
    }

    /// Converts a seek target in microseconds into this time base.
    #[must_use]
    pub fn from_micros(self, micros: i64) -> i64 {
        self.rescale(micros, Self::MICROS)
    }

    /// Frame rate expressed by this rational (`num / den` frames per second),
    /// `None` when it is zero or undefined.
    #[must_use]
    pub fn as_rate(self) -> Option<f64> {
        let rate = self.as_secs();
        (rate > 0.0 && rate.is_finite()).then_some(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pts_to_micros_converts_correctly() {
        assert_eq!(pts_to_micros(1.0), 1_000_000);
        assert_eq!(pts_to_micros(0.5), 500_000);
        assert_eq!(pts_to_micros(0.0), 0);
        assert_eq!(pts_to_micros(1.234567), 1_234_567);
    }

    #[test]
    fn micros_to_pts_converts_correctly() {
        assert_eq!(micros_to_pts(1_000_000), 1.0);
        assert_eq!(micros_to_pts(500_000), 0.5);
        assert_eq!(micros_to_pts(0), 0.0);
    }

    #[test]
    fn i64_round_trip_preserves_value_within_microsecond() {
        let pts_secs = 1.234567;
        let back = micros_to_pts(pts_to_micros(pts_secs));
        assert!((pts_secs - back).abs() < 0.000001);
    }

    #[test]
    fn time_base_converts_ticks_to_seconds() {
        let tb = TimeBase::new(1, 90_000);
        assert!((tb.to_secs(90_000) - 1.0).abs() < 1e-12);
        assert!((tb.to_secs(45_000) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rescale_from_micros_into_stream_ticks() {
        assert_eq!(TimeBase::new(1, 90_000).from_micros(5_000_000), 450_000);
        assert_eq!(TimeBase::new(1, 25).from_micros(5_000_000), 125);
        assert_eq!(TimeBase::new(1001, 30_000).from_micros(1_001_000), 30);
    }

    #[test]
    fn rescale_rounds_to_nearest_and_handles_negatives() {
        let tb = TimeBase::new(1, 3);
        // 0.5s = 1.5 ticks, rounds away from zero
        assert_eq!(tb.from_micros(500_000), 2);
        assert_eq!(tb.from_micros(-500_000), -2);
    }

    #[test]
    fn degenerate_time_base_is_zero() {
        let tb = TimeBase::new(0, 0);
        assert_eq!(tb.as_secs(), 0.0);
        assert_eq!(tb.from_micros(1_000_000), 0);
        assert_eq!(tb.as_rate(), None);
    }

    #[test]
    fn as_rate_reports_positive_rates_only() {
        assert_eq!(TimeBase::new(30, 1).as_rate(), Some(30.0));
        assert_eq!(TimeBase::new(0, 1).as_rate(), None);
    }
}
