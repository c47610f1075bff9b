//! Global and per-subject reward multipliers.
//!
//! The effective multiplier for a reward is `global * personal`, each
//! defaulting to `1.0` when unset.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

use crate::ids::SubjectId;

/// Reward channel a booster applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    #[serde(alias = "exp")]
    Experience,
    Money,
}

impl RewardKind {
    /// Parse an administrative label (`exp`, `experience`, `money`).
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "exp" | "xp" | "experience" => Some(Self::Experience),
            "money" => Some(Self::Money),
            _ => None,
        }
    }
}

impl fmt::Display for RewardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Experience => "exp",
            Self::Money => "money",
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum BoosterError {
    #[error("booster multiplier must be a non-negative finite number (got {value})")]
    InvalidMultiplier { value: f64 },
}

fn check_multiplier(value: f64) -> Result<f64, BoosterError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(BoosterError::InvalidMultiplier { value })
    }
}

/// Booster state; written by admin operations, read on every reward.
#[derive(Debug, Default)]
pub struct BoosterBoard {
    global: RwLock<HashMap<RewardKind, f64>>,
    personal: RwLock<HashMap<SubjectId, HashMap<RewardKind, f64>>>,
}

impl BoosterBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn global_multiplier(&self, kind: RewardKind) -> f64 {
        let global = self.global.read().unwrap_or_else(PoisonError::into_inner);
        global.get(&kind).copied().unwrap_or(1.0)
    }

    #[must_use]
    pub fn personal_multiplier(&self, subject: &SubjectId, kind: RewardKind) -> f64 {
        let personal = self.personal.read().unwrap_or_else(PoisonError::into_inner);
        personal
            .get(subject)
            .and_then(|boosters| boosters.get(&kind))
            .copied()
            .unwrap_or(1.0)
    }

    /// Effective multiplier for `subject` on `kind`.
    #[must_use]
    pub fn total_multiplier(&self, subject: &SubjectId, kind: RewardKind) -> f64 {
        self.global_multiplier(kind) * self.personal_multiplier(subject, kind)
    }

    #[must_use]
    pub fn apply(&self, subject: &SubjectId, kind: RewardKind, value: f64) -> f64 {
        value * self.total_multiplier(subject, kind)
    }

    /// Set the global multiplier for `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error for negative or non-finite multipliers.
    pub fn set_global(&self, kind: RewardKind, multiplier: f64) -> Result<(), BoosterError> {
        let multiplier = check_multiplier(multiplier)?;
        self.global
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, multiplier);
        log::info!("global {kind} booster set to {multiplier:.2}x");
        Ok(())
    }

    /// Set a subject's personal multiplier for `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error for negative or non-finite multipliers.
    pub fn set_personal(
        &self,
        subject: &SubjectId,
        kind: RewardKind,
        multiplier: f64,
    ) -> Result<(), BoosterError> {
        let multiplier = check_multiplier(multiplier)?;
        self.personal
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(subject.clone())
            .or_default()
            .insert(kind, multiplier);
        log::info!("{subject} {kind} booster set to {multiplier:.2}x");
        Ok(())
    }

    /// Reset the global multiplier for `kind` to the neutral `1.0`.
    pub fn remove_global(&self, kind: RewardKind) {
        self.global
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind);
    }

    pub fn remove_personal(&self, subject: &SubjectId, kind: RewardKind) {
        let mut personal = self.personal.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(boosters) = personal.get_mut(subject) {
            boosters.remove(&kind);
            if boosters.is_empty() {
                personal.remove(subject);
            }
        }
    }

    pub fn clear_global(&self) {
        self.global
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn clear_personal(&self, subject: &SubjectId) {
        self.personal
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(subject);
    }

    /// Snapshot of the global multipliers, neutral entries included.
    #[must_use]
    pub fn global_snapshot(&self) -> HashMap<RewardKind, f64> {
        let global = self.global.read().unwrap_or_else(PoisonError::into_inner);
        [RewardKind::Experience, RewardKind::Money]
            .into_iter()
            .map(|kind| (kind, global.get(&kind).copied().unwrap_or(1.0)))
            .collect()
    }

    #[must_use]
    pub fn personal_snapshot(&self, subject: &SubjectId) -> HashMap<RewardKind, f64> {
        self.personal
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subject)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn has_personal(&self, subject: &SubjectId) -> bool {
        self.personal
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subject)
            .is_some_and(|boosters| !boosters.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_boosters_are_neutral() {
        let board = BoosterBoard::new();
        let subject = SubjectId::from("alex");
        assert!((board.total_multiplier(&subject, RewardKind::Money) - 1.0).abs() < f64::EPSILON);
        assert!((board.apply(&subject, RewardKind::Experience, 7.5) - 7.5).abs() < f64::EPSILON);
        assert!(!board.has_personal(&subject));
    }

    #[test]
    fn global_and_personal_compose_multiplicatively() {
        let board = BoosterBoard::new();
        let subject = SubjectId::from("alex");
        board.set_global(RewardKind::Experience, 2.0).unwrap();
        board
            .set_personal(&subject, RewardKind::Experience, 1.5)
            .unwrap();
        assert!(
            (board.total_multiplier(&subject, RewardKind::Experience) - 3.0).abs() < f64::EPSILON
        );
        assert!(
            (board.total_multiplier(&SubjectId::from("sam"), RewardKind::Experience) - 2.0).abs()
                < f64::EPSILON
        );
        assert!((board.total_multiplier(&subject, RewardKind::Money) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn removal_restores_neutral_values() {
        let board = BoosterBoard::new();
        let subject = SubjectId::from("alex");
        board.set_global(RewardKind::Money, 3.0).unwrap();
        board.set_personal(&subject, RewardKind::Money, 2.0).unwrap();
        board.remove_personal(&subject, RewardKind::Money);
        assert!(!board.has_personal(&subject));
        board.remove_global(RewardKind::Money);
        assert!((board.total_multiplier(&subject, RewardKind::Money) - 1.0).abs() < f64::EPSILON);

        board.set_global(RewardKind::Experience, 4.0).unwrap();
        board.set_personal(&subject, RewardKind::Experience, 4.0).unwrap();
        board.clear_global();
        board.clear_personal(&subject);
        assert!(
            (board.total_multiplier(&subject, RewardKind::Experience) - 1.0).abs() < f64::EPSILON
        );
        let snapshot = board.global_snapshot();
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn negative_multipliers_are_rejected() {
        let board = BoosterBoard::new();
        assert_eq!(
            board.set_global(RewardKind::Money, -1.0),
            Err(BoosterError::InvalidMultiplier { value: -1.0 })
        );
        assert!(board.set_global(RewardKind::Money, f64::NAN).is_err());
        assert!(board.set_global(RewardKind::Money, 0.0).is_ok());
    }

    #[test]
    fn labels_parse() {
        assert_eq!(RewardKind::from_label("EXP"), Some(RewardKind::Experience));
        assert_eq!(RewardKind::from_label("money"), Some(RewardKind::Money));
        assert_eq!(RewardKind::from_label("karma"), None);
    }
}
