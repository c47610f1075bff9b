//! Storage collaborator and the asynchronous write-behind worker.
//!
//! Callers on the action path only ever enqueue operations; a single Tokio
//! task applies them to the [`PersistenceStore`] in submission order, one
//! blocking-pool call at a time. Reads
//! travel through the same queue so they observe every write queued before
//! them.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::ids::{RoleId, SubjectId};
use crate::progress::RoleStats;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("persistence worker is no longer running")]
    WorkerStopped,
}

/// Persisted state of one (subject, role) membership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredProgress {
    pub level: u32,
    pub experience: f64,
    #[serde(default)]
    pub stats: RoleStats,
}

/// Key-value storage consumed by the engine.
///
/// Methods are synchronous and may block. They are only ever invoked from
/// the persistence worker on Tokio's blocking pool, never from the action
/// path.
pub trait PersistenceStore: Send + Sync {
    /// Load every role membership stored for `subject`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn load_progress(&self, subject: &SubjectId)
    -> Result<BTreeMap<RoleId, StoredProgress>, StoreError>;

    /// Upsert the level and experience of one membership.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn save_progress(
        &self,
        subject: &SubjectId,
        role: &RoleId,
        level: u32,
        experience: f64,
    ) -> Result<(), StoreError>;

    /// Remove a membership record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    fn delete_progress(&self, subject: &SubjectId, role: &RoleId) -> Result<(), StoreError>;

    /// Upsert lifetime statistics of one membership.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn save_stats(
        &self,
        _subject: &SubjectId,
        _role: &RoleId,
        _stats: &RoleStats,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    /// Load every pending salary balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn load_all_pending_salaries(&self) -> Result<HashMap<SubjectId, f64>, StoreError>;

    /// Upsert the pending salary total of a subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn save_pending_salary(&self, subject: &SubjectId, amount: f64) -> Result<(), StoreError>;

    /// Remove a paid-out salary record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    fn delete_pending_salary(&self, subject: &SubjectId) -> Result<(), StoreError>;

    /// Record a tracked placement for administrative tooling.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn record_placement_audit(&self, _location: &str, _placed_at: u64) -> Result<(), StoreError> {
        Ok(())
    }

    /// Drop an audited placement once it is natural again.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    fn clear_placement_audit(&self, _location: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

type ProgressReply = oneshot::Sender<Result<BTreeMap<RoleId, StoredProgress>, StoreError>>;
type SalaryReply = oneshot::Sender<Result<HashMap<SubjectId, f64>, StoreError>>;

enum PersistOp {
    SaveProgress {
        subject: SubjectId,
        role: RoleId,
        level: u32,
        experience: f64,
    },
    SaveStats {
        subject: SubjectId,
        role: RoleId,
        stats: RoleStats,
    },
    DeleteProgress {
        subject: SubjectId,
        role: RoleId,
    },
    SavePendingSalary {
        subject: SubjectId,
        amount: f64,
    },
    DeletePendingSalary {
        subject: SubjectId,
    },
    RecordPlacement {
        location: String,
        placed_at: u64,
    },
    ClearPlacement {
        location: String,
    },
    LoadProgress {
        subject: SubjectId,
        reply: ProgressReply,
    },
    LoadPendingSalaries {
        reply: SalaryReply,
    },
    Flush(oneshot::Sender<()>),
}

impl PersistOp {
    const fn label(&self) -> &'static str {
        match self {
            Self::SaveProgress { .. } => "save progress",
            Self::SaveStats { .. } => "save stats",
            Self::DeleteProgress { .. } => "delete progress",
            Self::SavePendingSalary { .. } => "save pending salary",
            Self::DeletePendingSalary { .. } => "delete pending salary",
            Self::RecordPlacement { .. } => "record placement",
            Self::ClearPlacement { .. } => "clear placement",
            Self::LoadProgress { .. } => "load progress",
            Self::LoadPendingSalaries { .. } => "load pending salaries",
            Self::Flush(_) => "flush",
        }
    }
}

/// Counters maintained by the worker.
#[derive(Debug, Default)]
pub struct QueueStats {
    applied: AtomicU64,
    failed: AtomicU64,
}

impl QueueStats {
    #[must_use]
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Cloneable handle for submitting work to the persistence worker.
#[derive(Clone)]
pub struct PersistenceQueue {
    tx: mpsc::UnboundedSender<PersistOp>,
    stats: Arc<QueueStats>,
}

impl std::fmt::Debug for PersistenceQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceQueue")
            .field("applied", &self.stats.applied())
            .field("failed", &self.stats.failed())
            .finish_non_exhaustive()
    }
}

impl PersistenceQueue {
    /// Spawn the worker on `handle` and return the submission handle.
    ///
    /// The worker exits once every clone of the queue has been dropped.
    pub fn spawn(store: Arc<dyn PersistenceStore>, handle: &Handle) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(QueueStats::default());
        let worker = handle.spawn(run_worker(store, rx, Arc::clone(&stats)));
        (Self { tx, stats }, worker)
    }

    #[must_use]
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    fn submit(&self, op: PersistOp) {
        let label = op.label();
        if self.tx.send(op).is_err() {
            log::warn!("persistence worker stopped; dropped {label} operation");
        }
    }

    pub fn save_progress(&self, subject: &SubjectId, role: &RoleId, level: u32, experience: f64) {
        self.submit(PersistOp::SaveProgress {
            subject: subject.clone(),
            role: role.clone(),
            level,
            experience,
        });
    }

    pub fn save_stats(&self, subject: &SubjectId, role: &RoleId, stats: RoleStats) {
        self.submit(PersistOp::SaveStats {
            subject: subject.clone(),
            role: role.clone(),
            stats,
        });
    }

    pub fn delete_progress(&self, subject: &SubjectId, role: &RoleId) {
        self.submit(PersistOp::DeleteProgress {
            subject: subject.clone(),
            role: role.clone(),
        });
    }

    pub fn save_pending_salary(&self, subject: &SubjectId, amount: f64) {
        self.submit(PersistOp::SavePendingSalary {
            subject: subject.clone(),
            amount,
        });
    }

    pub fn delete_pending_salary(&self, subject: &SubjectId) {
        self.submit(PersistOp::DeletePendingSalary {
            subject: subject.clone(),
        });
    }

    pub fn record_placement(&self, location: String, placed_at: u64) {
        self.submit(PersistOp::RecordPlacement {
            location,
            placed_at,
        });
    }

    pub fn clear_placement(&self, location: String) {
        self.submit(PersistOp::ClearPlacement { location });
    }

    /// Load a subject's memberships after every previously queued write.
    ///
    /// # Errors
    ///
    /// Returns the backend error, or [`StoreError::WorkerStopped`].
    pub async fn load_progress(
        &self,
        subject: &SubjectId,
    ) -> Result<BTreeMap<RoleId, StoredProgress>, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PersistOp::LoadProgress {
                subject: subject.clone(),
                reply,
            })
            .map_err(|_| StoreError::WorkerStopped)?;
        rx.await.map_err(|_| StoreError::WorkerStopped)?
    }

    /// Load every stored salary balance.
    ///
    /// # Errors
    ///
    /// Returns the backend error, or [`StoreError::WorkerStopped`].
    pub async fn load_pending_salaries(&self) -> Result<HashMap<SubjectId, f64>, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PersistOp::LoadPendingSalaries { reply })
            .map_err(|_| StoreError::WorkerStopped)?;
        rx.await.map_err(|_| StoreError::WorkerStopped)?
    }

    /// Resolve once every operation queued before this call has been applied.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WorkerStopped`] if the worker is gone.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(PersistOp::Flush(done))
            .map_err(|_| StoreError::WorkerStopped)?;
        rx.await.map_err(|_| StoreError::WorkerStopped)
    }
}

async fn run_worker(
    store: Arc<dyn PersistenceStore>,
    mut rx: mpsc::UnboundedReceiver<PersistOp>,
    stats: Arc<QueueStats>,
) {
    while let Some(op) = rx.recv().await {
        let label = op.label();
        let backend = Arc::clone(&store);
        let result = match tokio::task::spawn_blocking(move || apply(backend.as_ref(), op)).await {
            Ok(result) => result,
            Err(err) => Err(StoreError::Backend(format!("store call aborted: {err}"))),
        };
        if let Err(err) = result {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            log::warn!("persistence {label} failed: {err}");
        } else {
            stats.applied.fetch_add(1, Ordering::Relaxed);
        }
    }
    log::debug!("persistence worker drained and stopped");
}

fn apply(store: &dyn PersistenceStore, op: PersistOp) -> Result<(), StoreError> {
    match op {
        PersistOp::SaveProgress {
            subject,
            role,
            level,
            experience,
        } => store.save_progress(&subject, &role, level, experience),
        PersistOp::SaveStats {
            subject,
            role,
            stats,
        } => store.save_stats(&subject, &role, &stats),
        PersistOp::DeleteProgress { subject, role } => store.delete_progress(&subject, &role),
        PersistOp::SavePendingSalary { subject, amount } => {
            store.save_pending_salary(&subject, amount)
        }
        PersistOp::DeletePendingSalary { subject } => store.delete_pending_salary(&subject),
        PersistOp::RecordPlacement {
            location,
            placed_at,
        } => store.record_placement_audit(&location, placed_at),
        PersistOp::ClearPlacement { location } => store.clear_placement_audit(&location),
        PersistOp::LoadProgress { subject, reply } => {
            let loaded = store.load_progress(&subject);
            let outcome = loaded.as_ref().map(|_| ()).map_err(Clone::clone);
            // The requester may have given up; the load itself still counts.
            let _ = reply.send(loaded);
            outcome
        }
        PersistOp::LoadPendingSalaries { reply } => {
            let loaded = store.load_all_pending_salaries();
            let outcome = loaded.as_ref().map(|_| ()).map_err(Clone::clone);
            let _ = reply.send(loaded);
            outcome
        }
        PersistOp::Flush(done) => {
            let _ = done.send(());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn writes_apply_in_submission_order() {
        let store = Arc::new(MemoryStore::new());
        let (queue, _worker) = PersistenceQueue::spawn(store.clone(), &Handle::current());
        let subject = SubjectId::from("alex");
        let role = RoleId::new("miner");

        queue.save_progress(&subject, &role, 1, 10.0);
        queue.save_progress(&subject, &role, 2, 120.0);
        queue.save_pending_salary(&subject, 4.0);
        queue.delete_pending_salary(&subject);
        queue.flush().await.unwrap();

        let loaded = queue.load_progress(&subject).await.unwrap();
        let stored = loaded.get(&role).unwrap();
        assert_eq!(stored.level, 2);
        assert!((stored.experience - 120.0).abs() < f64::EPSILON);
        assert!(store.pending_salary(&subject).is_none());
        assert_eq!(queue.stats().failed(), 0);
    }

    #[tokio::test]
    async fn backend_failures_are_counted_not_propagated() {
        let store = Arc::new(MemoryStore::new());
        store.set_failing(true);
        let (queue, _worker) = PersistenceQueue::spawn(store.clone(), &Handle::current());
        let subject = SubjectId::from("alex");

        queue.save_pending_salary(&subject, 3.0);
        queue.flush().await.unwrap();
        assert_eq!(queue.stats().failed(), 1);

        store.set_failing(false);
        queue.save_pending_salary(&subject, 3.0);
        queue.flush().await.unwrap();
        assert_eq!(store.pending_salary(&subject), Some(3.0));
    }

    #[tokio::test]
    async fn reads_see_queued_writes() {
        let store = Arc::new(MemoryStore::new());
        let (queue, _worker) = PersistenceQueue::spawn(store, &Handle::current());
        let subject = SubjectId::from("sam");
        queue.save_pending_salary(&subject, 7.5);
        let salaries = queue.load_pending_salaries().await.unwrap();
        assert_eq!(salaries.get(&subject).copied(), Some(7.5));
    }

    #[tokio::test]
    async fn slow_backends_do_not_stall_timers() {
        let store = Arc::new(MemoryStore::new());
        store.set_write_delay(std::time::Duration::from_millis(300));
        let (queue, _worker) = PersistenceQueue::spawn(store.clone(), &Handle::current());
        let subject = SubjectId::from("alex");

        let started = std::time::Instant::now();
        queue.save_pending_salary(&subject, 2.0);
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(started.elapsed() < std::time::Duration::from_millis(250));

        queue.flush().await.unwrap();
        assert_eq!(store.pending_salary(&subject), Some(2.0));
    }
}
