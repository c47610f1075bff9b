//! Per-subject role memberships, experience and statistics.
//!
//! The cache is the only owner of [`SubjectProgress`]. Every mutation
//! recomputes the level from total experience and queues a save of the new
//! totals while the lock is still held, so the persisted order always
//! matches the order in which totals changed.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::ids::{RoleId, SubjectId};
use crate::leveling::LevelCurve;
use crate::numbers::non_negative;
use crate::persistence::{PersistenceQueue, StoredProgress};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoleError {
    #[error("role '{0}' does not exist")]
    UnknownRole(RoleId),
    #[error("already a member of role '{0}'")]
    AlreadyJoined(RoleId),
    #[error("role limit of {limit} reached")]
    RoleLimitReached { limit: usize },
    #[error("not a member of role '{0}'")]
    NotJoined(RoleId),
}

/// Lifetime totals of a membership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleStats {
    pub total_experience: f64,
    pub total_money: f64,
    pub rewarded_actions: u64,
}

impl RoleStats {
    fn record(&mut self, experience: f64, money: f64) {
        self.total_experience += experience;
        self.total_money += money;
        self.rewarded_actions += 1;
    }
}

/// Progress of one subject in one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectProgress {
    pub subject: SubjectId,
    pub role: RoleId,
    pub level: u32,
    pub experience: f64,
    #[serde(default)]
    pub stats: RoleStats,
}

impl SubjectProgress {
    fn fresh(subject: &SubjectId, role: &RoleId) -> Self {
        Self {
            subject: subject.clone(),
            role: role.clone(),
            level: 1,
            experience: 0.0,
            stats: RoleStats::default(),
        }
    }
}

/// Result of crediting experience to one membership.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExperienceGain {
    pub previous_level: u32,
    pub new_level: u32,
    pub total_experience: f64,
}

impl ExperienceGain {
    #[must_use]
    pub const fn leveled_up(&self) -> bool {
        self.new_level > self.previous_level
    }
}

type Memberships = BTreeMap<RoleId, SubjectProgress>;

/// Concurrency-safe cache of loaded subjects.
#[derive(Debug)]
pub struct ProgressCache {
    curve: LevelCurve,
    max_roles: usize,
    subjects: Mutex<HashMap<SubjectId, Memberships>>,
    persistence: PersistenceQueue,
}

impl ProgressCache {
    #[must_use]
    pub fn new(curve: LevelCurve, max_roles: usize, persistence: PersistenceQueue) -> Self {
        Self {
            curve,
            max_roles,
            subjects: Mutex::new(HashMap::new()),
            persistence,
        }
    }

    #[must_use]
    pub const fn curve(&self) -> &LevelCurve {
        &self.curve
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubjectId, Memberships>> {
        self.subjects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a fresh level-1 membership.
    ///
    /// # Errors
    ///
    /// Fails when already joined or when the role limit is reached.
    pub fn join(&self, subject: &SubjectId, role: &RoleId) -> Result<SubjectProgress, RoleError> {
        let mut subjects = self.lock();
        let memberships = subjects.entry(subject.clone()).or_default();
        if memberships.contains_key(role) {
            return Err(RoleError::AlreadyJoined(role.clone()));
        }
        if memberships.len() >= self.max_roles {
            return Err(RoleError::RoleLimitReached {
                limit: self.max_roles,
            });
        }
        let progress = SubjectProgress::fresh(subject, role);
        self.persistence
            .save_progress(subject, role, progress.level, progress.experience);
        memberships.insert(role.clone(), progress.clone());
        Ok(progress)
    }

    /// Drop a membership and its persisted record.
    ///
    /// # Errors
    ///
    /// Fails when the subject does not hold the role.
    pub fn leave(&self, subject: &SubjectId, role: &RoleId) -> Result<SubjectProgress, RoleError> {
        let mut subjects = self.lock();
        let removed = subjects
            .get_mut(subject)
            .and_then(|memberships| memberships.remove(role))
            .ok_or_else(|| RoleError::NotJoined(role.clone()))?;
        self.persistence.delete_progress(subject, role);
        Ok(removed)
    }

    /// Credit experience (and money to the statistics) to one membership.
    ///
    /// Returns `None` if the membership no longer exists.
    pub fn add_experience(
        &self,
        subject: &SubjectId,
        role: &RoleId,
        experience: f64,
        money: f64,
    ) -> Option<ExperienceGain> {
        let mut subjects = self.lock();
        let progress = subjects.get_mut(subject)?.get_mut(role)?;
        let experience = non_negative(experience);
        let previous_level = progress.level;
        progress.experience += experience;
        progress.level = self.curve.level_from_experience(progress.experience);
        progress.stats.record(experience, non_negative(money));

        self.persistence
            .save_progress(subject, role, progress.level, progress.experience);
        self.persistence.save_stats(subject, role, progress.stats);

        Some(ExperienceGain {
            previous_level,
            new_level: progress.level,
            total_experience: progress.experience,
        })
    }

    #[must_use]
    pub fn get(&self, subject: &SubjectId, role: &RoleId) -> Option<SubjectProgress> {
        self.lock().get(subject)?.get(role).cloned()
    }

    #[must_use]
    pub fn level(&self, subject: &SubjectId, role: &RoleId) -> Option<u32> {
        self.lock().get(subject)?.get(role).map(|progress| progress.level)
    }

    #[must_use]
    pub fn experience(&self, subject: &SubjectId, role: &RoleId) -> Option<f64> {
        self.lock()
            .get(subject)?
            .get(role)
            .map(|progress| progress.experience)
    }

    /// Roles held by `subject`, in id order.
    #[must_use]
    pub fn roles_of(&self, subject: &SubjectId) -> Vec<RoleId> {
        self.lock()
            .get(subject)
            .map(|memberships| memberships.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn memberships(&self, subject: &SubjectId) -> Vec<SubjectProgress> {
        self.lock()
            .get(subject)
            .map(|memberships| memberships.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_loaded(&self, subject: &SubjectId) -> bool {
        self.lock().contains_key(subject)
    }

    /// Loaded members of `role`, highest level then experience first.
    #[must_use]
    pub fn leaderboard(&self, role: &RoleId, limit: usize) -> Vec<SubjectProgress> {
        let mut members: Vec<SubjectProgress> = self
            .lock()
            .values()
            .filter_map(|memberships| memberships.get(role).cloned())
            .collect();
        members.sort_by(|a, b| {
            b.level
                .cmp(&a.level)
                .then_with(|| b.experience.total_cmp(&a.experience))
                .then_with(|| a.subject.cmp(&b.subject))
        });
        members.truncate(limit);
        members
    }

    /// Merge stored memberships without overwriting ones created meanwhile.
    ///
    /// Levels are recomputed from experience. Returns how many were added.
    pub fn merge_loaded(
        &self,
        subject: &SubjectId,
        loaded: BTreeMap<RoleId, StoredProgress>,
    ) -> usize {
        let mut subjects = self.lock();
        let memberships = subjects.entry(subject.clone()).or_default();
        let mut added = 0;
        for (role, stored) in loaded {
            if memberships.len() >= self.max_roles {
                log::warn!("{subject}: ignoring stored role {role}, role limit reached");
                break;
            }
            if memberships.contains_key(&role) {
                continue;
            }
            let experience = non_negative(stored.experience);
            let level = self.curve.level_from_experience(experience);
            if level != stored.level {
                log::debug!(
                    "{subject}/{role}: stored level {} corrected to {level}",
                    stored.level
                );
            }
            memberships.insert(
                role.clone(),
                SubjectProgress {
                    subject: subject.clone(),
                    role,
                    level,
                    experience,
                    stats: stored.stats,
                },
            );
            added += 1;
        }
        added
    }

    /// Queue a final save of the subject's memberships and drop it from memory.
    pub fn evict(&self, subject: &SubjectId) -> Vec<SubjectProgress> {
        let mut subjects = self.lock();
        let Some(memberships) = subjects.remove(subject) else {
            return Vec::new();
        };
        for progress in memberships.values() {
            self.queue_save(progress);
        }
        memberships.into_values().collect()
    }

    /// Queue saves for every cached membership; returns how many were queued.
    pub fn save_all(&self) -> usize {
        let subjects = self.lock();
        let mut queued = 0;
        for progress in subjects.values().flat_map(BTreeMap::values) {
            self.queue_save(progress);
            queued += 1;
        }
        queued
    }

    /// Every cached membership.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SubjectProgress> {
        self.lock()
            .values()
            .flat_map(|memberships| memberships.values().cloned())
            .collect()
    }

    fn queue_save(&self, progress: &SubjectProgress) {
        self.persistence.save_progress(
            &progress.subject,
            &progress.role,
            progress.level,
            progress.experience,
        );
        self.persistence
            .save_stats(&progress.subject, &progress.role, progress.stats);
    }
}
