//! Engine wiring for scenario runs: in-memory collaborators and a manual clock.
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use taskforge_engine::memory::{
    MemoryLedger, MemoryStore, RecordingRewards, RecordingSink, StaticSessions,
};
use taskforge_engine::{Collaborators, EngineConfig, ManualClock, RoleCatalog, SubjectId, TaskForge};
use tokio::runtime::Handle;

const DEFAULT_ROLES: &str = include_str!("../data/roles.json");

/// Catalog and configuration shared by every scenario run.
#[derive(Debug, Clone)]
pub struct TesterAssets {
    pub config: EngineConfig,
    pub catalog: RoleCatalog,
}

impl TesterAssets {
    /// Load the bundled catalog and default configuration, or the given overrides.
    pub fn load(roles: Option<&Path>, config: Option<&Path>) -> Result<Self> {
        let roles_json = match roles {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read roles from {}", path.display()))?,
            None => DEFAULT_ROLES.to_string(),
        };
        let (catalog, report) =
            RoleCatalog::from_json(&roles_json).context("failed to parse role catalog")?;
        for skipped in &report.skipped {
            log::warn!(
                "skipped {} {}: {}",
                skipped.role,
                skipped.path,
                skipped.reason
            );
        }
        anyhow::ensure!(!catalog.is_empty(), "role catalog defines no roles");

        let config = match config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config from {}", path.display()))?;
                EngineConfig::from_json(&json)
                    .with_context(|| format!("invalid config in {}", path.display()))?
            }
            None => EngineConfig::default(),
        };

        log::info!(
            "tester assets: {} roles, {} objectives",
            report.roles_loaded,
            report.objectives_loaded
        );
        Ok(Self { config, catalog })
    }
}

/// One engine instance plus handles on every in-memory collaborator.
pub struct Harness {
    pub engine: TaskForge,
    pub ledger: Arc<MemoryLedger>,
    pub store: Arc<MemoryStore>,
    pub sessions: Arc<StaticSessions>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
    pub rewards: Arc<RecordingRewards>,
}

impl Harness {
    /// Build an engine from the shared assets with reward rolls seeded by `seed`.
    pub fn build(assets: &TesterAssets, seed: u64) -> Result<Self> {
        Self::with_config(assets, assets.config.clone(), seed)
    }

    pub fn with_config(assets: &TesterAssets, mut config: EngineConfig, seed: u64) -> Result<Self> {
        config.settings.rng_seed = Some(seed);
        let ledger = Arc::new(MemoryLedger::new());
        let store = Arc::new(MemoryStore::new());
        let sessions = Arc::new(StaticSessions::new());
        let clock = Arc::new(ManualClock::new(0));
        let sink = Arc::new(RecordingSink::new());
        let rewards = Arc::new(RecordingRewards::new());
        let engine = TaskForge::new(
            config,
            assets.catalog.clone(),
            Collaborators {
                ledger: ledger.clone(),
                store: store.clone(),
                sessions: sessions.clone(),
                clock: clock.clone(),
                sink: sink.clone(),
                rewards: rewards.clone(),
            },
            Handle::current(),
        )
        .context("failed to build engine")?;
        Ok(Self {
            engine,
            ledger,
            store,
            sessions,
            clock,
            sink,
            rewards,
        })
    }

    #[must_use]
    pub fn subject(index: usize) -> SubjectId {
        SubjectId::new(format!("subject-{index:03}"))
    }
}
