//! In-memory collaborators for tests, simulations and the tester harness.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use crate::dispatch::LevelRewardHandler;
use crate::ids::{RoleId, SubjectId};
use crate::ledger::{Ledger, LedgerError, SessionDirectory};
use crate::notify::{DisplayEvent, Notice, NotificationSink};
use crate::numbers::duration_to_millis;
use crate::persistence::{PersistenceStore, StoreError, StoredProgress};
use crate::progress::RoleStats;
use crate::roles::CosmeticKind;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ledger keeping balances in a map; can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    balances: Mutex<HashMap<SubjectId, f64>>,
    deposits: Mutex<Vec<(SubjectId, f64)>>,
    failing: AtomicBool,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn balance(&self, subject: &SubjectId) -> f64 {
        lock(&self.balances).get(subject).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn total_deposited(&self) -> f64 {
        lock(&self.deposits).iter().map(|(_, amount)| amount).sum()
    }

    #[must_use]
    pub fn deposits(&self) -> Vec<(SubjectId, f64)> {
        lock(&self.deposits).clone()
    }
}

impl Ledger for MemoryLedger {
    fn deposit(&self, subject: &SubjectId, amount: f64) -> Result<(), LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable);
        }
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::Rejected {
                subject: subject.clone(),
                amount,
                reason: "amount must be non-negative".to_string(),
            });
        }
        *lock(&self.balances).entry(subject.clone()).or_insert(0.0) += amount;
        lock(&self.deposits).push((subject.clone(), amount));
        Ok(())
    }
}

/// Map-backed persistence store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    progress: Mutex<HashMap<SubjectId, BTreeMap<RoleId, StoredProgress>>>,
    salaries: Mutex<HashMap<SubjectId, f64>>,
    placements: Mutex<HashMap<String, u64>>,
    failing: AtomicBool,
    write_delay_millis: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Block the calling thread for `delay` on every write, like a slow disk.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_millis
            .store(duration_to_millis(delay), Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        let delay = self.write_delay_millis.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Backend("store is in failing mode".to_string()))
        } else {
            Ok(())
        }
    }

    #[must_use]
    pub fn progress(&self, subject: &SubjectId, role: &RoleId) -> Option<StoredProgress> {
        lock(&self.progress).get(subject)?.get(role).copied()
    }

    #[must_use]
    pub fn pending_salary(&self, subject: &SubjectId) -> Option<f64> {
        lock(&self.salaries).get(subject).copied()
    }

    #[must_use]
    pub fn placement_count(&self) -> usize {
        lock(&self.placements).len()
    }

    pub fn seed_progress(&self, subject: &SubjectId, role: &RoleId, stored: StoredProgress) {
        lock(&self.progress)
            .entry(subject.clone())
            .or_default()
            .insert(role.clone(), stored);
    }

    pub fn seed_pending_salary(&self, subject: &SubjectId, amount: f64) {
        lock(&self.salaries).insert(subject.clone(), amount);
    }
}

impl PersistenceStore for MemoryStore {
    fn load_progress(
        &self,
        subject: &SubjectId,
    ) -> Result<BTreeMap<RoleId, StoredProgress>, StoreError> {
        Ok(lock(&self.progress).get(subject).cloned().unwrap_or_default())
    }

    fn save_progress(
        &self,
        subject: &SubjectId,
        role: &RoleId,
        level: u32,
        experience: f64,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut progress = lock(&self.progress);
        let entry = progress
            .entry(subject.clone())
            .or_default()
            .entry(role.clone())
            .or_default();
        entry.level = level;
        entry.experience = experience;
        Ok(())
    }

    fn delete_progress(&self, subject: &SubjectId, role: &RoleId) -> Result<(), StoreError> {
        self.check()?;
        if let Some(roles) = lock(&self.progress).get_mut(subject) {
            roles.remove(role);
        }
        Ok(())
    }

    fn save_stats(
        &self,
        subject: &SubjectId,
        role: &RoleId,
        stats: &RoleStats,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut progress = lock(&self.progress);
        if let Some(entry) = progress
            .get_mut(subject)
            .and_then(|roles| roles.get_mut(role))
        {
            entry.stats = *stats;
        }
        Ok(())
    }

    fn load_all_pending_salaries(&self) -> Result<HashMap<SubjectId, f64>, StoreError> {
        Ok(lock(&self.salaries).clone())
    }

    fn save_pending_salary(&self, subject: &SubjectId, amount: f64) -> Result<(), StoreError> {
        self.check()?;
        lock(&self.salaries).insert(subject.clone(), amount);
        Ok(())
    }

    fn delete_pending_salary(&self, subject: &SubjectId) -> Result<(), StoreError> {
        self.check()?;
        lock(&self.salaries).remove(subject);
        Ok(())
    }

    fn record_placement_audit(&self, location: &str, placed_at: u64) -> Result<(), StoreError> {
        self.check()?;
        lock(&self.placements).insert(location.to_string(), placed_at);
        Ok(())
    }

    fn clear_placement_audit(&self, location: &str) -> Result<(), StoreError> {
        self.check()?;
        lock(&self.placements).remove(location);
        Ok(())
    }
}

/// Session directory with an explicit online set.
#[derive(Debug, Default)]
pub struct StaticSessions {
    online: RwLock<HashSet<SubjectId>>,
}

impl StaticSessions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, subject: &SubjectId, online: bool) {
        let mut sessions = self.online.write().unwrap_or_else(PoisonError::into_inner);
        if online {
            sessions.insert(subject.clone());
        } else {
            sessions.remove(subject);
        }
    }
}

impl SessionDirectory for StaticSessions {
    fn is_online(&self, subject: &SubjectId) -> bool {
        self.online
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(subject)
    }
}

/// Sink that records everything it is asked to display.
#[derive(Debug, Default)]
pub struct RecordingSink {
    shown: Mutex<Vec<DisplayEvent>>,
    dismissed: Mutex<Vec<SubjectId>>,
    notices: Mutex<Vec<(SubjectId, Notice)>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shown(&self) -> Vec<DisplayEvent> {
        lock(&self.shown).clone()
    }

    #[must_use]
    pub fn dismissed(&self) -> Vec<SubjectId> {
        lock(&self.dismissed).clone()
    }

    #[must_use]
    pub fn notices(&self) -> Vec<(SubjectId, Notice)> {
        lock(&self.notices).clone()
    }

    pub fn clear(&self) {
        lock(&self.shown).clear();
        lock(&self.dismissed).clear();
        lock(&self.notices).clear();
    }
}

impl NotificationSink for RecordingSink {
    fn show(&self, event: &DisplayEvent) {
        lock(&self.shown).push(event.clone());
    }

    fn dismiss(&self, subject: &SubjectId) {
        lock(&self.dismissed).push(subject.clone());
    }

    fn notice(&self, subject: &SubjectId, notice: &Notice) {
        lock(&self.notices).push((subject.clone(), notice.clone()));
    }
}

/// Level-reward hooks that only record what was granted.
#[derive(Debug, Default)]
pub struct RecordingRewards {
    commands: Mutex<Vec<(SubjectId, String)>>,
    cosmetics: Mutex<Vec<(SubjectId, CosmeticKind, String)>>,
}

impl RecordingRewards {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn commands(&self) -> Vec<(SubjectId, String)> {
        lock(&self.commands).clone()
    }

    #[must_use]
    pub fn cosmetics(&self) -> Vec<(SubjectId, CosmeticKind, String)> {
        lock(&self.cosmetics).clone()
    }
}

impl LevelRewardHandler for RecordingRewards {
    fn run_command(&self, subject: &SubjectId, command: &str) {
        lock(&self.commands).push((subject.clone(), command.to_string()));
    }

    fn grant_cosmetic(&self, subject: &SubjectId, kind: CosmeticKind, value: &str) {
        lock(&self.cosmetics).push((subject.clone(), kind, value.to_string()));
    }
}
