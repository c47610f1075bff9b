//! Engine configuration document.
//!
//! Every field carries a serde default so `{}` deserializes to a working
//! configuration. Durations accept integer milliseconds or compact strings
//! such as `"30m"`.
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

use crate::constants::{
    DEFAULT_ACCUMULATION_MILLIS, DEFAULT_BASE_EXP, DEFAULT_CURRENCY_SYMBOL,
    DEFAULT_DISPLAY_MILLIS, DEFAULT_LEVEL_MULTIPLIER, DEFAULT_MAX_LEVEL, DEFAULT_MAX_ROLES,
    DEFAULT_NATURAL_TIME_MILLIS, DEFAULT_PAYOUT_INTERVAL_MINUTES, DEFAULT_SWEEP_INTERVAL_MILLIS,
    DEFAULT_TRACKED_TARGETS, MILLIS_PER_MINUTE,
};
use crate::time::deserialize_millis;

fn deserialize_upper_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let names = Vec::<String>::deserialize(deserializer)?;
    Ok(names
        .iter()
        .map(|name| name.trim().to_ascii_uppercase())
        .filter(|name| !name.is_empty())
        .collect())
}

/// Errors raised when configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("configuration is not valid JSON: {0}")]
    Parse(String),
    #[error("leveling.base_exp must be a positive finite number (got {value})")]
    BaseExp { value: f64 },
    #[error("leveling.multiplier must be at least 1.0 (got {value})")]
    Multiplier { value: f64 },
    #[error("leveling.max_level must be at least 1")]
    MaxLevel,
    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
    #[error("settings.max_roles must be at least 1")]
    MaxRoles,
}

/// Experience curve constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelingConfig {
    #[serde(default = "LevelingConfig::default_base_exp")]
    pub base_exp: f64,
    #[serde(default = "LevelingConfig::default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "LevelingConfig::default_max_level")]
    pub max_level: u32,
}

impl LevelingConfig {
    const fn default_base_exp() -> f64 {
        DEFAULT_BASE_EXP
    }

    const fn default_multiplier() -> f64 {
        DEFAULT_LEVEL_MULTIPLIER
    }

    const fn default_max_level() -> u32 {
        DEFAULT_MAX_LEVEL
    }
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            base_exp: Self::default_base_exp(),
            multiplier: Self::default_multiplier(),
            max_level: Self::default_max_level(),
        }
    }
}

/// Placement tracking window and sweep cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiExploitConfig {
    #[serde(default = "AntiExploitConfig::default_enabled")]
    pub enabled: bool,
    /// Age a placement must reach before the location counts as natural again.
    #[serde(
        default = "AntiExploitConfig::default_natural_time",
        deserialize_with = "deserialize_millis"
    )]
    pub natural_time: u64,
    #[serde(
        default = "AntiExploitConfig::default_sweep_interval",
        deserialize_with = "deserialize_millis"
    )]
    pub sweep_interval: u64,
    #[serde(default)]
    pub debug_messages: bool,
    #[serde(default)]
    pub audit_placements: bool,
    /// Upper-case resource ids; configured names are normalized on load.
    #[serde(
        default = "AntiExploitConfig::default_tracked_targets",
        deserialize_with = "deserialize_upper_set"
    )]
    pub tracked_targets: BTreeSet<String>,
}

impl AntiExploitConfig {
    const fn default_enabled() -> bool {
        true
    }

    const fn default_natural_time() -> u64 {
        DEFAULT_NATURAL_TIME_MILLIS
    }

    const fn default_sweep_interval() -> u64 {
        DEFAULT_SWEEP_INTERVAL_MILLIS
    }

    fn default_tracked_targets() -> BTreeSet<String> {
        DEFAULT_TRACKED_TARGETS
            .iter()
            .map(|name| (*name).to_string())
            .collect()
    }

    /// Whether placements of this resource identifier are tracked.
    #[must_use]
    pub fn tracks(&self, resource: &str) -> bool {
        self.tracked_targets.contains(&resource.to_ascii_uppercase())
    }
}

impl Default for AntiExploitConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            natural_time: Self::default_natural_time(),
            sweep_interval: Self::default_sweep_interval(),
            debug_messages: false,
            audit_placements: false,
            tracked_targets: Self::default_tracked_targets(),
        }
    }
}

/// Deferred payout settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryConfig {
    #[serde(default = "SalaryConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "SalaryConfig::default_payout_interval_minutes")]
    pub payout_interval_minutes: u64,
    #[serde(default = "SalaryConfig::default_notifications")]
    pub notifications: bool,
}

impl SalaryConfig {
    const fn default_enabled() -> bool {
        true
    }

    const fn default_payout_interval_minutes() -> u64 {
        DEFAULT_PAYOUT_INTERVAL_MINUTES
    }

    const fn default_notifications() -> bool {
        true
    }

    /// Payout cadence as a `Duration`.
    #[must_use]
    pub const fn payout_interval(&self) -> Duration {
        Duration::from_millis(self.payout_interval_minutes.saturating_mul(MILLIS_PER_MINUTE))
    }
}

impl Default for SalaryConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            payout_interval_minutes: Self::default_payout_interval_minutes(),
            notifications: Self::default_notifications(),
        }
    }
}

/// How reward notifications reach the subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStyle {
    /// Debounced aggregate shown for a limited time.
    #[default]
    Bar,
    /// One message per reward, shown immediately.
    Chat,
}

/// Debounce and display timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub style: NotificationStyle,
    #[serde(
        default = "NotificationConfig::default_accumulation",
        deserialize_with = "deserialize_millis"
    )]
    pub accumulation_millis: u64,
    #[serde(
        default = "NotificationConfig::default_display",
        deserialize_with = "deserialize_millis"
    )]
    pub display_millis: u64,
    #[serde(default = "NotificationConfig::default_toggle")]
    pub exp_notifications: bool,
    #[serde(default = "NotificationConfig::default_toggle")]
    pub money_notifications: bool,
}

impl NotificationConfig {
    const fn default_accumulation() -> u64 {
        DEFAULT_ACCUMULATION_MILLIS
    }

    const fn default_display() -> u64 {
        DEFAULT_DISPLAY_MILLIS
    }

    const fn default_toggle() -> bool {
        true
    }

    #[must_use]
    pub const fn accumulation_window(&self) -> Duration {
        Duration::from_millis(self.accumulation_millis)
    }

    #[must_use]
    pub const fn display_window(&self) -> Duration {
        Duration::from_millis(self.display_millis)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            style: NotificationStyle::default(),
            accumulation_millis: Self::default_accumulation(),
            display_millis: Self::default_display(),
            exp_notifications: Self::default_toggle(),
            money_notifications: Self::default_toggle(),
        }
    }
}

/// External currency availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomyConfig {
    #[serde(default = "EconomyConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "EconomyConfig::default_currency_symbol")]
    pub currency_symbol: String,
}

impl EconomyConfig {
    const fn default_enabled() -> bool {
        true
    }

    fn default_currency_symbol() -> String {
        DEFAULT_CURRENCY_SYMBOL.to_string()
    }
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            currency_symbol: Self::default_currency_symbol(),
        }
    }
}

/// Membership limits and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "SettingsConfig::default_max_roles")]
    pub max_roles: usize,
    #[serde(default)]
    pub log_actions: bool,
    /// Fixed seed for reward rolls; entropy-seeded when absent.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl SettingsConfig {
    const fn default_max_roles() -> usize {
        DEFAULT_MAX_ROLES
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            max_roles: Self::default_max_roles(),
            log_actions: false,
            rng_seed: None,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub leveling: LevelingConfig,
    #[serde(default)]
    pub anti_exploit: AntiExploitConfig,
    #[serde(default)]
    pub salary: SalaryConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub economy: EconomyConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or violates an invariant.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the rest of the engine relies on.
    ///
    /// A zero natural-time window is accepted and disables placement protection.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let leveling = &self.leveling;
        if !leveling.base_exp.is_finite() || leveling.base_exp <= 0.0 {
            return Err(ConfigError::BaseExp {
                value: leveling.base_exp,
            });
        }
        if !leveling.multiplier.is_finite() || leveling.multiplier < 1.0 {
            return Err(ConfigError::Multiplier {
                value: leveling.multiplier,
            });
        }
        if leveling.max_level == 0 {
            return Err(ConfigError::MaxLevel);
        }
        if self.salary.payout_interval_minutes == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "salary.payout_interval_minutes",
            });
        }
        if self.notifications.accumulation_millis == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "notifications.accumulation_millis",
            });
        }
        if self.anti_exploit.sweep_interval == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "anti_exploit.sweep_interval",
            });
        }
        if self.settings.max_roles == 0 {
            return Err(ConfigError::MaxRoles);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!((config.leveling.base_exp - 100.0).abs() < f64::EPSILON);
        assert_eq!(config.anti_exploit.natural_time, 30 * 60 * 1_000);
        assert_eq!(config.salary.payout_interval(), Duration::from_secs(300));
        assert_eq!(config.notifications.style, NotificationStyle::Bar);
        assert!(config.anti_exploit.tracks("oak_log"));
        assert!(!config.anti_exploit.tracks("DIRT"));
    }

    #[test]
    fn duration_strings_are_accepted() {
        let config = EngineConfig::from_json(
            r#"{
                "anti_exploit": {"natural_time": "5m", "sweep_interval": 60000},
                "notifications": {"style": "chat", "accumulation_millis": "1s"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.anti_exploit.natural_time, 300_000);
        assert_eq!(config.anti_exploit.sweep_interval, 60_000);
        assert_eq!(config.notifications.accumulation_millis, 1_000);
        assert_eq!(config.notifications.style, NotificationStyle::Chat);
    }

    #[test]
    fn invariants_are_enforced() {
        let err = EngineConfig::from_json(r#"{"leveling": {"base_exp": 0}}"#).unwrap_err();
        assert_eq!(err, ConfigError::BaseExp { value: 0.0 });

        let err = EngineConfig::from_json(r#"{"leveling": {"multiplier": 0.5}}"#).unwrap_err();
        assert_eq!(err, ConfigError::Multiplier { value: 0.5 });

        let err = EngineConfig::from_json(r#"{"leveling": {"max_level": 0}}"#).unwrap_err();
        assert_eq!(err, ConfigError::MaxLevel);

        let err =
            EngineConfig::from_json(r#"{"salary": {"payout_interval_minutes": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroInterval { .. }));

        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn tracked_targets_are_case_insensitive() {
        let config = EngineConfig::from_json(
            r#"{"anti_exploit": {"tracked_targets": ["oak_log", " Iron_Ore ", ""]}}"#,
        )
        .unwrap();
        let tracked: Vec<&str> = config
            .anti_exploit
            .tracked_targets
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(tracked, ["IRON_ORE", "OAK_LOG"]);
        assert!(config.anti_exploit.tracks("oak_log"));
        assert!(config.anti_exploit.tracks("OAK_LOG"));
        assert!(!config.anti_exploit.tracks("stone"));
    }

    #[test]
    fn zero_natural_time_is_allowed() {
        let config =
            EngineConfig::from_json(r#"{"anti_exploit": {"natural_time": 0}}"#).unwrap();
        assert_eq!(config.anti_exploit.natural_time, 0);
    }
}
