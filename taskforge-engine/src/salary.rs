//! Deferred salary balances and the periodic payout scheduler.
//!
//! Balances only move under the ledger lock: `accumulate` is a single
//! add-and-queue step, and a payout takes the whole balance out before
//! depositing and merges it back if the deposit fails. Lifetime credited
//! and paid totals are kept beside the balances so conservation can be
//! observed at any quiescent point.
//!
//! Stored balances are merged in once by [`SalaryLedger::restore`]; writes
//! to storage start only after that.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::ids::SubjectId;
use crate::ledger::{Ledger, LedgerError, SessionDirectory};
use crate::notify::{Notice, NotificationSink};
use crate::persistence::{PersistenceQueue, StoreError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PayoutError {
    #[error("{0} has no pending salary")]
    NothingPending(SubjectId),
    #[error("{0} is not online")]
    SubjectOffline(SubjectId),
    #[error("salary deposit failed: {0}")]
    Ledger(#[from] LedgerError),
}

/// Outcome of one scheduled payout cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayoutSummary {
    pub paid: Vec<(SubjectId, f64)>,
    pub offline: usize,
    pub failed: usize,
}

impl PayoutSummary {
    #[must_use]
    pub fn total_paid(&self) -> f64 {
        self.paid.iter().map(|(_, amount)| amount).sum()
    }
}

/// Lifetime totals; `credited - paid` equals the sum of pending balances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SalaryTotals {
    pub credited: f64,
    pub paid: f64,
}

#[derive(Debug, Default)]
struct Book {
    pending: HashMap<SubjectId, f64>,
    totals: SalaryTotals,
    /// Set once stored balances have been merged in. Until then memory holds
    /// only credit earned since construction and nothing is written back.
    restored: bool,
}

/// Payout notices sent after confirmed deposits.
struct PayoutNotices {
    sink: Arc<dyn NotificationSink>,
    currency_symbol: String,
}

pub struct SalaryLedger {
    book: Mutex<Book>,
    persistence: PersistenceQueue,
    ledger: Arc<dyn Ledger>,
    sessions: Arc<dyn SessionDirectory>,
    notices: Option<PayoutNotices>,
}

impl std::fmt::Debug for SalaryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SalaryLedger")
            .field("pending_count", &self.pending_count())
            .field("totals", &self.totals())
            .finish_non_exhaustive()
    }
}

impl SalaryLedger {
    #[must_use]
    pub fn new(
        persistence: PersistenceQueue,
        ledger: Arc<dyn Ledger>,
        sessions: Arc<dyn SessionDirectory>,
    ) -> Self {
        Self {
            book: Mutex::new(Book::default()),
            persistence,
            ledger,
            sessions,
            notices: None,
        }
    }

    /// Send a [`Notice::SalaryPaid`] for every successful payout.
    #[must_use]
    pub fn with_notices(
        mut self,
        sink: Arc<dyn NotificationSink>,
        currency_symbol: impl Into<String>,
    ) -> Self {
        self.notices = Some(PayoutNotices {
            sink,
            currency_symbol: currency_symbol.into(),
        });
        self
    }

    fn lock(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `amount` to the subject's balance and return the new balance.
    ///
    /// Non-positive and non-finite amounts leave the balance untouched.
    pub fn accumulate(&self, subject: &SubjectId, amount: f64) -> f64 {
        let mut book = self.lock();
        if !amount.is_finite() || amount <= 0.0 {
            return book.pending.get(subject).copied().unwrap_or(0.0);
        }
        let balance = book.pending.entry(subject.clone()).or_insert(0.0);
        *balance += amount;
        let total = *balance;
        book.totals.credited += amount;
        if book.restored {
            self.persistence.save_pending_salary(subject, total);
        } else {
            log::debug!("holding salary save for {subject} until stored balances are restored");
        }
        total
    }

    #[must_use]
    pub fn pending(&self, subject: &SubjectId) -> f64 {
        self.lock().pending.get(subject).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn total_pending(&self) -> f64 {
        self.lock().pending.values().sum()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    #[must_use]
    pub fn totals(&self) -> SalaryTotals {
        self.lock().totals
    }

    /// Pay every online subject with a positive balance.
    pub fn run_payout_cycle(&self) -> PayoutSummary {
        let candidates: Vec<SubjectId> = self
            .lock()
            .pending
            .iter()
            .filter(|(_, amount)| **amount > 0.0)
            .map(|(subject, _)| subject.clone())
            .collect();

        let mut summary = PayoutSummary::default();
        for subject in candidates {
            if !self.sessions.is_online(&subject) {
                summary.offline += 1;
                continue;
            }
            match self.pay(&subject) {
                Ok(amount) => summary.paid.push((subject, amount)),
                Err(PayoutError::NothingPending(_)) => {}
                Err(err) => {
                    log::warn!("salary payout to {subject} failed: {err}");
                    summary.failed += 1;
                }
            }
        }
        if !summary.paid.is_empty() || summary.failed > 0 {
            log::info!(
                "salary cycle paid {} subjects ({:.2} total), {} offline, {} failed",
                summary.paid.len(),
                summary.total_paid(),
                summary.offline,
                summary.failed
            );
        }
        summary
    }

    /// Pay a subject immediately, outside the schedule.
    ///
    /// # Errors
    ///
    /// Fails when the subject is offline, has nothing pending, or the
    /// deposit fails; the balance is kept in every failure case.
    pub fn force_payout(&self, subject: &SubjectId) -> Result<f64, PayoutError> {
        if !self.sessions.is_online(subject) {
            return Err(PayoutError::SubjectOffline(subject.clone()));
        }
        self.pay(subject)
    }

    fn pay(&self, subject: &SubjectId) -> Result<f64, PayoutError> {
        let amount = {
            let mut book = self.lock();
            match book.pending.remove(subject) {
                Some(amount) if amount > 0.0 => amount,
                _ => return Err(PayoutError::NothingPending(subject.clone())),
            }
        };

        if let Err(err) = self.ledger.deposit(subject, amount) {
            let mut book = self.lock();
            let balance = book.pending.entry(subject.clone()).or_insert(0.0);
            *balance += amount;
            let total = *balance;
            if book.restored {
                self.persistence.save_pending_salary(subject, total);
            }
            return Err(err.into());
        }

        {
            let mut book = self.lock();
            book.totals.paid += amount;
            if book.restored {
                match book.pending.get(subject) {
                    Some(remaining) => self.persistence.save_pending_salary(subject, *remaining),
                    None => self.persistence.delete_pending_salary(subject),
                }
            }
        }

        if let Some(notices) = &self.notices {
            notices.sink.notice(
                subject,
                &Notice::SalaryPaid {
                    amount,
                    currency_symbol: notices.currency_symbol.clone(),
                },
            );
        }
        Ok(amount)
    }

    /// Merge balances restored from storage into memory.
    ///
    /// Stored amounts are added to credit earned before the restore, and the
    /// merged totals of those subjects are written back. Only the first call
    /// has any effect; later calls return 0.
    pub fn restore(&self, balances: HashMap<SubjectId, f64>) -> usize {
        let mut book = self.lock();
        if book.restored {
            log::warn!(
                "pending salaries already restored; ignoring {} stored balances",
                balances.len()
            );
            return 0;
        }
        book.restored = true;
        let mut restored = 0;
        for (subject, amount) in balances {
            if !amount.is_finite() || amount <= 0.0 {
                continue;
            }
            *book.pending.entry(subject).or_insert(0.0) += amount;
            book.totals.credited += amount;
            restored += 1;
        }
        for (subject, amount) in &book.pending {
            self.persistence.save_pending_salary(subject, *amount);
        }
        restored
    }

    #[must_use]
    pub fn is_restored(&self) -> bool {
        self.lock().restored
    }

    /// Load every stored balance through the persistence worker.
    ///
    /// # Errors
    ///
    /// Returns the storage error; memory is left untouched in that case.
    pub async fn load_from_store(&self) -> Result<usize, StoreError> {
        let balances = self.persistence.load_pending_salaries().await?;
        let restored = self.restore(balances);
        log::info!("restored {restored} pending salaries");
        Ok(restored)
    }

    /// Queue saves of every balance; returns how many were queued.
    ///
    /// Nothing is written before [`Self::restore`], since memory would
    /// overwrite balances that were never loaded.
    pub fn save_all(&self) -> usize {
        let book = self.lock();
        if !book.restored {
            log::warn!(
                "skipping save of {} pending salaries: stored balances were never restored",
                book.pending.len()
            );
            return 0;
        }
        for (subject, amount) in &book.pending {
            self.persistence.save_pending_salary(subject, *amount);
        }
        book.pending.len()
    }

    /// Run [`Self::run_payout_cycle`] every `interval` on `handle` until aborted.
    pub fn spawn_scheduler(self: &Arc<Self>, handle: &Handle, interval: Duration) -> JoinHandle<()> {
        let ledger = Arc::clone(self);
        handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                ledger.run_payout_cycle();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryLedger, MemoryStore, RecordingSink, StaticSessions};

    struct Fixture {
        salary: Arc<SalaryLedger>,
        ledger: Arc<MemoryLedger>,
        sessions: Arc<StaticSessions>,
        store: Arc<MemoryStore>,
        queue: PersistenceQueue,
        sink: Arc<RecordingSink>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let (queue, _worker) = PersistenceQueue::spawn(store.clone(), &Handle::current());
        let ledger = Arc::new(MemoryLedger::new());
        let sessions = Arc::new(StaticSessions::new());
        let sink = Arc::new(RecordingSink::new());
        let salary = Arc::new(
            SalaryLedger::new(queue.clone(), ledger.clone(), sessions.clone())
                .with_notices(sink.clone(), "$"),
        );
        Fixture {
            salary,
            ledger,
            sessions,
            store,
            queue,
            sink,
        }
    }

    #[tokio::test]
    async fn accumulate_is_additive_and_persisted() {
        let fx = fixture();
        let subject = SubjectId::from("alex");
        fx.salary.restore(HashMap::new());
        assert!((fx.salary.accumulate(&subject, 10.0) - 10.0).abs() < f64::EPSILON);
        assert!((fx.salary.accumulate(&subject, 2.5) - 12.5).abs() < f64::EPSILON);
        assert!((fx.salary.accumulate(&subject, -4.0) - 12.5).abs() < f64::EPSILON);
        assert!((fx.salary.accumulate(&subject, f64::NAN) - 12.5).abs() < f64::EPSILON);
        fx.queue.flush().await.unwrap();
        assert_eq!(fx.store.pending_salary(&subject), Some(12.5));
    }

    #[tokio::test]
    async fn offline_subjects_keep_their_balance() {
        let fx = fixture();
        let subject = SubjectId::from("alex");
        for amount in [10.0, 15.0, 5.0] {
            fx.salary.accumulate(&subject, amount);
        }
        let summary = fx.salary.run_payout_cycle();
        assert_eq!(summary.offline, 1);
        assert!(summary.paid.is_empty());
        assert!((fx.salary.pending(&subject) - 30.0).abs() < f64::EPSILON);

        assert_eq!(
            fx.salary.force_payout(&subject),
            Err(PayoutError::SubjectOffline(subject.clone()))
        );

        fx.sessions.set_online(&subject, true);
        let paid = fx.salary.force_payout(&subject).unwrap();
        assert!((paid - 30.0).abs() < f64::EPSILON);
        assert!(fx.salary.pending(&subject).abs() < f64::EPSILON);
        assert!((fx.ledger.balance(&subject) - 30.0).abs() < f64::EPSILON);
        assert_eq!(fx.sink.notices().len(), 1);

        fx.queue.flush().await.unwrap();
        assert_eq!(fx.store.pending_salary(&subject), None);
    }

    #[tokio::test]
    async fn failed_deposit_restores_the_balance() {
        let fx = fixture();
        let subject = SubjectId::from("alex");
        fx.sessions.set_online(&subject, true);
        fx.salary.accumulate(&subject, 8.0);
        fx.ledger.set_failing(true);

        assert!(matches!(
            fx.salary.force_payout(&subject),
            Err(PayoutError::Ledger(_))
        ));
        assert!((fx.salary.pending(&subject) - 8.0).abs() < f64::EPSILON);
        let summary = fx.salary.run_payout_cycle();
        assert_eq!(summary.failed, 1);
        assert!(fx.sink.notices().is_empty());

        fx.ledger.set_failing(false);
        let summary = fx.salary.run_payout_cycle();
        assert!((summary.total_paid() - 8.0).abs() < f64::EPSILON);
        let totals = fx.salary.totals();
        assert!((totals.credited - totals.paid - fx.salary.total_pending()).abs() < 1e-9);
    }

    #[tokio::test]
    async fn nothing_pending_is_rejected() {
        let fx = fixture();
        let subject = SubjectId::from("alex");
        fx.sessions.set_online(&subject, true);
        assert_eq!(
            fx.salary.force_payout(&subject),
            Err(PayoutError::NothingPending(subject.clone()))
        );
    }

    #[tokio::test]
    async fn restore_merges_stored_balances() {
        let fx = fixture();
        let subject = SubjectId::from("alex");
        fx.store.seed_pending_salary(&subject, 12.0);
        assert_eq!(fx.salary.load_from_store().await.unwrap(), 1);
        fx.salary.accumulate(&subject, 3.0);
        assert!((fx.salary.pending(&subject) - 15.0).abs() < f64::EPSILON);
        fx.queue.flush().await.unwrap();
        assert_eq!(fx.store.pending_salary(&subject), Some(15.0));
    }

    #[tokio::test]
    async fn credit_earned_before_restore_is_merged_with_storage() {
        let fx = fixture();
        let subject = SubjectId::from("alex");
        fx.store.seed_pending_salary(&subject, 12.0);
        fx.salary.accumulate(&subject, 5.0);
        assert_eq!(fx.salary.save_all(), 0);
        fx.queue.flush().await.unwrap();
        assert_eq!(fx.store.pending_salary(&subject), Some(12.0));

        assert_eq!(fx.salary.load_from_store().await.unwrap(), 1);
        assert!((fx.salary.pending(&subject) - 17.0).abs() < f64::EPSILON);
        fx.queue.flush().await.unwrap();
        assert_eq!(fx.store.pending_salary(&subject), Some(17.0));
        let totals = fx.salary.totals();
        assert!((totals.credited - 17.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn second_restore_is_ignored() {
        let fx = fixture();
        let subject = SubjectId::from("alex");
        fx.store.seed_pending_salary(&subject, 12.0);
        assert_eq!(fx.salary.load_from_store().await.unwrap(), 1);
        assert_eq!(fx.salary.load_from_store().await.unwrap(), 0);
        assert!((fx.salary.pending(&subject) - 12.0).abs() < f64::EPSILON);
        assert!(fx.salary.is_restored());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_pays_on_interval() {
        let fx = fixture();
        let subject = SubjectId::from("alex");
        fx.sessions.set_online(&subject, true);
        fx.salary.accumulate(&subject, 4.0);
        let scheduler = fx
            .salary
            .spawn_scheduler(&Handle::current(), Duration::from_secs(300));

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!((fx.salary.pending(&subject) - 4.0).abs() < f64::EPSILON);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fx.salary.pending(&subject).abs() < f64::EPSILON);
        assert!((fx.ledger.balance(&subject) - 4.0).abs() < f64::EPSILON);
        scheduler.abort();
    }
}
