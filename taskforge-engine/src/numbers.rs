//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Convert a level number to the `i32` exponent used by `powi`, saturating at `i32::MAX`.
#[must_use]
pub fn level_to_exponent(level: u32) -> i32 {
    cast::<u32, i32>(level).unwrap_or(i32::MAX)
}

/// Convert a count to f64 while allowing precision loss in a single location.
#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    cast::<usize, f64>(value).unwrap_or(0.0)
}

/// Convert milliseconds to f64 while allowing precision loss in a single location.
#[must_use]
pub fn millis_to_f64(value: u64) -> f64 {
    cast::<u64, f64>(value).unwrap_or(0.0)
}

/// Whole milliseconds in a `Duration`, saturating at `u64::MAX`.
#[must_use]
pub fn duration_to_millis(duration: std::time::Duration) -> u64 {
    cast::<u128, u64>(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Treat non-finite or negative amounts as zero.
#[must_use]
pub fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Clamp a percentage into `[0, 100]`, mapping NaN to zero.
#[must_use]
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}
