//! TaskForge progression engine
//!
//! Platform-agnostic core of a multi-role progression feature: subjects join
//! roles, perform tracked actions, and earn experience and currency through
//! chance-based objectives. The crate covers leveling, reward dispatch,
//! anti-exploit placement tracking, deferred salaries and notification
//! debouncing. Hosts plug in through the collaborator traits
//! ([`Ledger`], [`PersistenceStore`], [`SessionDirectory`], [`Clock`],
//! [`NotificationSink`], [`LevelRewardHandler`]).

pub mod anti_exploit;
pub mod boosters;
pub mod clock;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod engine;
pub mod ids;
pub mod ledger;
pub mod leveling;
pub mod memory;
pub mod notify;
pub mod numbers;
pub mod persistence;
pub mod progress;
pub mod roles;
pub mod salary;
pub mod time;

// Re-export commonly used types
pub use anti_exploit::{LocationKey, PlacementTracker};
pub use boosters::{BoosterBoard, BoosterError, RewardKind};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{
    AntiExploitConfig, ConfigError, EconomyConfig, EngineConfig, LevelingConfig,
    NotificationConfig, NotificationStyle, SalaryConfig, SettingsConfig,
};
pub use dispatch::{
    ActionEvent, DispatchOutcome, FiredReward, LevelRewardHandler, MoneyDelivery, MoneyRoute,
    RoleReward,
};
pub use engine::{Collaborators, EngineError, TaskForge};
pub use ids::{RoleId, SubjectId};
pub use ledger::{Ledger, LedgerError, SessionDirectory};
pub use leveling::LevelCurve;
pub use notify::{DisplayEvent, Notice, NotificationSink, RewardSummary, render_summary};
pub use persistence::{PersistenceQueue, PersistenceStore, StoreError, StoredProgress};
pub use progress::{ExperienceGain, RoleError, RoleStats, SubjectProgress};
pub use roles::{
    ActionKind, CatalogError, LevelRewardKind, LoadReport, MoneyRange, ObjectiveSpec, RewardSpec,
    RoleCatalog, RoleDefinition, Target,
};
pub use salary::{PayoutError, PayoutSummary, SalaryLedger, SalaryTotals};
pub use time::{format_duration, parse_duration_millis};
