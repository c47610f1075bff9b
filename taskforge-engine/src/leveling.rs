//! Experience curve: pure conversions between total experience and level.
//!
//! Advancing from level `n` to `n + 1` costs `base_exp * multiplier^(n - 1)`.
//! All loops are bounded by `max_level`, so a multiplier of exactly `1.0`
//! degrades to linear leveling without special cases.
use serde::{Deserialize, Serialize};

use crate::config::LevelingConfig;
use crate::numbers::level_to_exponent;

/// Immutable experience curve built from the leveling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelCurve {
    base_exp: f64,
    multiplier: f64,
    max_level: u32,
}

impl LevelCurve {
    #[must_use]
    pub const fn new(base_exp: f64, multiplier: f64, max_level: u32) -> Self {
        Self {
            base_exp,
            multiplier,
            max_level,
        }
    }

    #[must_use]
    pub const fn from_config(config: &LevelingConfig) -> Self {
        Self::new(config.base_exp, config.multiplier, config.max_level)
    }

    #[must_use]
    pub const fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Cost to advance from `level` to `level + 1`.
    #[must_use]
    pub fn exp_required_for_level(&self, level: u32) -> f64 {
        let exponent = level_to_exponent(level.max(1) - 1);
        self.base_exp * self.multiplier.powi(exponent)
    }

    /// Total experience needed to stand at `target_level`; zero at or below level 1.
    ///
    /// Targets above `max_level` are clamped to it.
    #[must_use]
    pub fn cumulative_exp_for_level(&self, target_level: u32) -> f64 {
        let target = target_level.min(self.max_level);
        (1..target).fold(0.0, |total, level| {
            total + self.exp_required_for_level(level)
        })
    }

    /// Highest level whose cumulative requirement is covered by `total_exp`.
    ///
    /// The running sum is accumulated in the same order as
    /// [`Self::cumulative_exp_for_level`], so granting exactly the cumulative
    /// amount for level `n` lands on level `n`.
    #[must_use]
    pub fn level_from_experience(&self, total_exp: f64) -> u32 {
        let mut level = 1;
        let mut used = 0.0;
        while level < self.max_level {
            let next = used + self.exp_required_for_level(level);
            if next > total_exp {
                break;
            }
            used = next;
            level += 1;
        }
        level
    }

    /// Fraction of the current level's requirement already earned, in `[0, 1]`.
    #[must_use]
    pub fn progress_fraction(&self, level: u32, total_exp: f64) -> f64 {
        if level >= self.max_level {
            return 1.0;
        }
        let required = self.exp_required_for_level(level);
        if required <= 0.0 {
            return 1.0;
        }
        let into_level = total_exp - self.cumulative_exp_for_level(level);
        (into_level / required).clamp(0.0, 1.0)
    }

    /// Experience still missing before `level + 1`, zero at the cap.
    #[must_use]
    pub fn exp_to_next_level(&self, level: u32, total_exp: f64) -> f64 {
        if level >= self.max_level {
            return 0.0;
        }
        (self.cumulative_exp_for_level(level + 1) - total_exp).max(0.0)
    }
}

impl From<&LevelingConfig> for LevelCurve {
    fn from(config: &LevelingConfig) -> Self {
        Self::from_config(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> LevelCurve {
        LevelCurve::new(100.0, 1.2, 100)
    }

    #[test]
    fn requirement_grows_geometrically() {
        let curve = curve();
        assert!((curve.exp_required_for_level(1) - 100.0).abs() < 1e-9);
        assert!((curve.exp_required_for_level(2) - 120.0).abs() < 1e-9);
        assert!((curve.exp_required_for_level(3) - 144.0).abs() < 1e-9);
    }

    #[test]
    fn cumulative_sums_prior_levels() {
        let curve = curve();
        assert!(curve.cumulative_exp_for_level(0).abs() < f64::EPSILON);
        assert!(curve.cumulative_exp_for_level(1).abs() < f64::EPSILON);
        assert!((curve.cumulative_exp_for_level(2) - 100.0).abs() < 1e-9);
        assert!((curve.cumulative_exp_for_level(3) - 220.0).abs() < 1e-9);
    }

    #[test]
    fn level_thresholds_are_inclusive() {
        let curve = curve();
        assert_eq!(curve.level_from_experience(0.0), 1);
        assert_eq!(curve.level_from_experience(99.999), 1);
        assert_eq!(curve.level_from_experience(100.0), 2);
        assert_eq!(curve.level_from_experience(150.0), 2);
        assert_eq!(curve.level_from_experience(220.0), 3);
    }

    #[test]
    fn level_is_capped_but_experience_is_not_lost() {
        let curve = LevelCurve::new(10.0, 1.0, 5);
        assert_eq!(curve.level_from_experience(1_000_000.0), 5);
        assert!((curve.progress_fraction(5, 1_000_000.0) - 1.0).abs() < f64::EPSILON);
        assert!(curve.exp_to_next_level(5, 1_000_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn linear_curve_terminates() {
        let curve = LevelCurve::new(50.0, 1.0, 10);
        assert_eq!(curve.level_from_experience(125.0), 3);
        assert!((curve.cumulative_exp_for_level(10) - 450.0).abs() < 1e-9);
    }

    #[test]
    fn progress_fraction_tracks_current_level() {
        let curve = curve();
        assert!((curve.progress_fraction(2, 160.0) - 0.5).abs() < 1e-9);
        assert!(curve.progress_fraction(1, 0.0).abs() < f64::EPSILON);
        assert!((curve.exp_to_next_level(2, 160.0) - 60.0).abs() < 1e-9);
    }
}
