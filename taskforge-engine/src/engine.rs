//! `TaskForge`: the composition root that owns every container and exposes
//! the engine's entry points to the host.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::anti_exploit::PlacementTracker;
use crate::boosters::BoosterBoard;
use crate::clock::Clock;
use crate::config::{ConfigError, EngineConfig};
use crate::dispatch::{
    ActionEvent, DispatchContext, DispatchOutcome, FiredReward, LevelRewardHandler, MoneyRoute,
    RewardDispatcher,
};
use crate::ids::{RoleId, SubjectId};
use crate::leveling::LevelCurve;
use crate::ledger::{Ledger, SessionDirectory};
use crate::notify::{NotificationDebouncer, NotificationSink, RenderOptions};
use crate::numbers::duration_to_millis;
use crate::persistence::{PersistenceQueue, PersistenceStore, StoreError};
use crate::progress::{ExperienceGain, ProgressCache, RoleError, SubjectProgress};
use crate::roles::{RoleCatalog, RoleDefinition};
use crate::salary::{PayoutError, PayoutSummary, SalaryLedger};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("persistence did not drain within {millis} ms")]
    ShutdownTimedOut { millis: u64 },
}

/// External collaborators injected into the engine.
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn Ledger>,
    pub store: Arc<dyn PersistenceStore>,
    pub sessions: Arc<dyn SessionDirectory>,
    pub clock: Arc<dyn Clock>,
    pub sink: Arc<dyn NotificationSink>,
    pub rewards: Arc<dyn LevelRewardHandler>,
}

/// Progression and reward engine.
pub struct TaskForge {
    config: EngineConfig,
    catalog: Arc<RoleCatalog>,
    progress: Arc<ProgressCache>,
    boosters: Arc<BoosterBoard>,
    tracker: Arc<PlacementTracker>,
    salary: Arc<SalaryLedger>,
    notifier: Arc<NotificationDebouncer>,
    dispatcher: RewardDispatcher,
    persistence: PersistenceQueue,
    clock: Arc<dyn Clock>,
    handle: Handle,
    background: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl std::fmt::Debug for TaskForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskForge")
            .field("roles", &self.catalog.len())
            .field("route", &self.dispatcher.money_route())
            .field("persistence", &self.persistence)
            .finish_non_exhaustive()
    }
}

impl TaskForge {
    /// Validate `config`, wire every component and spawn the persistence worker.
    ///
    /// Background timers are not started until [`Self::start`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: EngineConfig,
        catalog: RoleCatalog,
        collaborators: Collaborators,
        handle: Handle,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let Collaborators {
            ledger,
            store,
            sessions,
            clock,
            sink,
            rewards,
        } = collaborators;

        let (persistence, _worker) = PersistenceQueue::spawn(store, &handle);
        let catalog = Arc::new(catalog);
        let curve = LevelCurve::from_config(&config.leveling);
        let progress = Arc::new(ProgressCache::new(
            curve,
            config.settings.max_roles,
            persistence.clone(),
        ));
        let boosters = Arc::new(BoosterBoard::new());

        let mut tracker = PlacementTracker::new(config.anti_exploit.natural_time);
        if config.anti_exploit.audit_placements {
            tracker = tracker.with_audit(persistence.clone());
        }
        let tracker = Arc::new(tracker);

        let mut salary = SalaryLedger::new(persistence.clone(), Arc::clone(&ledger), sessions);
        if config.salary.notifications {
            salary = salary.with_notices(Arc::clone(&sink), config.economy.currency_symbol.clone());
        }
        let salary = Arc::new(salary);

        let notifier = Arc::new(NotificationDebouncer::new(
            Arc::clone(&sink),
            handle.clone(),
            &config.notifications,
            RenderOptions::from_config(&config.notifications, &config.economy.currency_symbol),
        ));

        let dispatcher = RewardDispatcher::new(
            DispatchContext {
                catalog: Arc::clone(&catalog),
                progress: Arc::clone(&progress),
                boosters: Arc::clone(&boosters),
                tracker: Arc::clone(&tracker),
                salary: Arc::clone(&salary),
                notifier: Arc::clone(&notifier),
                sink,
                ledger,
                clock: Arc::clone(&clock),
                rewards,
            },
            &config,
        );

        log::info!(
            "engine ready: {} roles, money route {:?}",
            catalog.len(),
            dispatcher.money_route()
        );

        Ok(Self {
            config,
            catalog,
            progress,
            boosters,
            tracker,
            salary,
            notifier,
            dispatcher,
            persistence,
            clock,
            handle,
            background: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Restore pending salaries and start the sweep and payout timers.
    ///
    /// Only the first successful call does anything; later calls log and
    /// return `Ok`.
    ///
    /// # Errors
    ///
    /// Returns an error if stored salaries cannot be loaded. The engine can
    /// be started again after a failed load.
    pub async fn start(&self) -> Result<(), EngineError> {
        if self.started.swap(true, Ordering::SeqCst) {
            log::warn!("engine already started");
            return Ok(());
        }
        if let Err(err) = self.salary.load_from_store().await {
            self.started.store(false, Ordering::SeqCst);
            return Err(err.into());
        }
        let mut background = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.config.anti_exploit.enabled {
            background.push(self.tracker.spawn_sweeper(
                Arc::clone(&self.clock),
                &self.handle,
                Duration::from_millis(self.config.anti_exploit.sweep_interval),
            ));
        }
        if self.config.salary.enabled && self.config.economy.enabled {
            background.push(
                self.salary
                    .spawn_scheduler(&self.handle, self.config.salary.payout_interval()),
            );
        }
        Ok(())
    }

    /// Stop timers, emit pending notifications and persist everything.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ShutdownTimedOut`] if persistence does not
    /// drain within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), EngineError> {
        self.started.store(false, Ordering::SeqCst);
        for task in self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
        let flushed = self.notifier.flush_all();
        let progress = self.progress.save_all();
        let salaries = self.salary.save_all();
        log::info!(
            "shutting down: {flushed} notifications, {progress} progress records, {salaries} salaries"
        );
        match tokio::time::timeout(timeout, self.persistence.flush()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EngineError::ShutdownTimedOut {
                millis: duration_to_millis(timeout),
            }),
        }
    }

    /// Number of running sweep and payout timers.
    #[must_use]
    pub fn background_tasks(&self) -> usize {
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // Actions ------------------------------------------------------------

    pub fn on_action(&self, event: &ActionEvent) -> DispatchOutcome {
        self.dispatcher.on_action(event)
    }

    /// Join a role at level 1.
    ///
    /// # Errors
    ///
    /// Fails for unknown roles, duplicate joins and the role limit.
    pub fn on_role_join(
        &self,
        subject: &SubjectId,
        role: &RoleId,
    ) -> Result<SubjectProgress, RoleError> {
        if !self.catalog.contains(role) {
            return Err(RoleError::UnknownRole(role.clone()));
        }
        let progress = self.progress.join(subject, role)?;
        log::info!("{subject} joined {role}");
        Ok(progress)
    }

    /// Leave a role, discarding its progress.
    ///
    /// # Errors
    ///
    /// Fails when the subject does not hold the role.
    pub fn on_role_leave(
        &self,
        subject: &SubjectId,
        role: &RoleId,
    ) -> Result<SubjectProgress, RoleError> {
        let progress = self.progress.leave(subject, role)?;
        log::info!("{subject} left {role} at level {}", progress.level);
        Ok(progress)
    }

    /// Load a subject's stored memberships; returns how many were restored.
    ///
    /// Memberships for roles no longer in the catalog are ignored.
    ///
    /// # Errors
    ///
    /// Returns the storage error when loading fails.
    pub async fn on_subject_join(&self, subject: &SubjectId) -> Result<usize, EngineError> {
        let mut loaded = self.persistence.load_progress(subject).await?;
        loaded.retain(|role, _| {
            let known = self.catalog.contains(role);
            if !known {
                log::warn!("{subject}: ignoring stored progress for unknown role {role}");
            }
            known
        });
        Ok(self.progress.merge_loaded(subject, loaded))
    }

    /// Emit the subject's pending notification, persist and unload it.
    pub fn on_subject_quit(&self, subject: &SubjectId) {
        self.notifier.flush_subject(subject);
        let saved = self.progress.evict(subject);
        log::debug!("{subject} unloaded ({} memberships saved)", saved.len());
    }

    /// Credit experience directly, firing every level reward crossed.
    ///
    /// # Errors
    ///
    /// Fails for unknown roles or roles the subject does not hold.
    pub fn grant_experience(
        &self,
        subject: &SubjectId,
        role: &RoleId,
        experience: f64,
    ) -> Result<(ExperienceGain, Vec<FiredReward>), RoleError> {
        let definition = self.role_definition(role)?;
        self.dispatcher
            .grant_experience(subject, &definition, experience)
            .map(|(gain, fired)| (gain, fired.into_vec()))
            .ok_or_else(|| RoleError::NotJoined(role.clone()))
    }

    fn role_definition(&self, role: &RoleId) -> Result<Arc<RoleDefinition>, RoleError> {
        self.catalog
            .get(role)
            .ok_or_else(|| RoleError::UnknownRole(role.clone()))
    }

    // Queries ------------------------------------------------------------

    #[must_use]
    pub fn get_level(&self, subject: &SubjectId, role: &RoleId) -> Option<u32> {
        self.progress.level(subject, role)
    }

    #[must_use]
    pub fn get_experience(&self, subject: &SubjectId, role: &RoleId) -> Option<f64> {
        self.progress.experience(subject, role)
    }

    #[must_use]
    pub fn get_progress(&self, subject: &SubjectId, role: &RoleId) -> Option<SubjectProgress> {
        self.progress.get(subject, role)
    }

    /// Fraction of the current level already earned.
    #[must_use]
    pub fn get_progress_fraction(&self, subject: &SubjectId, role: &RoleId) -> Option<f64> {
        let progress = self.progress.get(subject, role)?;
        Some(
            self.progress
                .curve()
                .progress_fraction(progress.level, progress.experience),
        )
    }

    #[must_use]
    pub fn roles_of(&self, subject: &SubjectId) -> Vec<RoleId> {
        self.progress.roles_of(subject)
    }

    #[must_use]
    pub fn leaderboard(&self, role: &RoleId, limit: usize) -> Vec<SubjectProgress> {
        self.progress.leaderboard(role, limit)
    }

    // Salary -------------------------------------------------------------

    /// Pay a subject's pending salary now.
    ///
    /// # Errors
    ///
    /// See [`SalaryLedger::force_payout`].
    pub fn force_payout(&self, subject: &SubjectId) -> Result<f64, PayoutError> {
        self.salary.force_payout(subject)
    }

    #[must_use]
    pub fn get_pending_salary(&self, subject: &SubjectId) -> f64 {
        self.salary.pending(subject)
    }

    /// Run one payout cycle immediately.
    pub fn run_payout_cycle(&self) -> PayoutSummary {
        self.salary.run_payout_cycle()
    }

    // Component access ---------------------------------------------------

    #[must_use]
    pub fn boosters(&self) -> &BoosterBoard {
        &self.boosters
    }

    #[must_use]
    pub fn salary(&self) -> &SalaryLedger {
        &self.salary
    }

    #[must_use]
    pub fn tracker(&self) -> &PlacementTracker {
        &self.tracker
    }

    #[must_use]
    pub fn notifier(&self) -> &NotificationDebouncer {
        &self.notifier
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressCache {
        &self.progress
    }

    #[must_use]
    pub fn catalog(&self) -> &RoleCatalog {
        &self.catalog
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn money_route(&self) -> MoneyRoute {
        self.dispatcher.money_route()
    }

    #[must_use]
    pub const fn persistence(&self) -> &PersistenceQueue {
        &self.persistence
    }
}
