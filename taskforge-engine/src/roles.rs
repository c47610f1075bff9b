//! Role definitions: objectives, level rewards, and the catalog loader.
//!
//! Definitions are immutable after load and shared read-only by every dispatch.
//! Malformed entries are skipped with a warning instead of failing the load.
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::constants::DEFAULT_CHANCE_PERCENT;
use crate::ids::RoleId;
use crate::numbers::clamp_percent;

/// Tracked action performed by a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Break,
    Place,
    Kill,
    Breed,
    Tame,
    Fish,
    Craft,
    Smelt,
    Enchant,
    Brew,
    Brush,
}

impl ActionKind {
    pub const ALL: [Self; 11] = [
        Self::Break,
        Self::Place,
        Self::Kill,
        Self::Breed,
        Self::Tame,
        Self::Fish,
        Self::Craft,
        Self::Smelt,
        Self::Enchant,
        Self::Brew,
        Self::Brush,
    ];

    /// Parse a configuration key, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(wanted))
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Break => "break",
            Self::Place => "place",
            Self::Kill => "kill",
            Self::Breed => "breed",
            Self::Tame => "tame",
            Self::Fish => "fish",
            Self::Craft => "craft",
            Self::Smelt => "smelt",
            Self::Enchant => "enchant",
            Self::Brew => "brew",
            Self::Brush => "brush",
        }
    }

    /// Which target namespace this action's objectives are keyed in.
    #[must_use]
    pub const fn category(self) -> TargetCategory {
        match self {
            Self::Break | Self::Place | Self::Craft | Self::Smelt => TargetCategory::Resource,
            Self::Kill | Self::Breed | Self::Tame => TargetCategory::Creature,
            Self::Fish | Self::Enchant | Self::Brew | Self::Brush => TargetCategory::Item,
        }
    }

    /// Actions whose reward depends on the location being natural.
    #[must_use]
    pub const fn is_manipulation_sensitive(self) -> bool {
        matches!(self, Self::Break)
    }

    /// Resolve a raw target identifier into this action's target namespace.
    #[must_use]
    pub fn target(self, name: &str) -> Option<Target> {
        let normalized = name.trim().to_ascii_uppercase();
        if !identifier_pattern().is_match(&normalized) {
            return None;
        }
        Some(match self.category() {
            TargetCategory::Resource => Target::Resource(normalized),
            TargetCategory::Creature => Target::Creature(normalized),
            TargetCategory::Item => Target::Item(normalized),
        })
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Z0-9_]+$").unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetCategory {
    Resource,
    Creature,
    Item,
}

/// Objective target, resolved once at load time by action category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    /// Placeable/breakable resource or craftable material.
    Resource(String),
    /// Living entity class.
    Creature(String),
    /// Catch, enchant, brew, or brush result.
    Item(String),
}

impl Target {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Resource(id) | Self::Creature(id) | Self::Item(id) => id,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Inclusive money range; a single value when `min == max`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoneyRange {
    pub min: f64,
    pub max: f64,
}

impl MoneyRange {
    #[must_use]
    pub const fn fixed(amount: f64) -> Self {
        Self {
            min: amount,
            max: amount,
        }
    }

    /// Parse a number, numeric string, or `"min-max"` string.
    ///
    /// Negative, non-finite, or inverted ranges are rejected.
    #[must_use]
    pub fn parse(value: &Value) -> Option<Self> {
        let range = match value {
            Value::Number(number) => Self::fixed(number.as_f64()?),
            Value::String(text) => Self::parse_text(text)?,
            _ => return None,
        };
        let valid = range.min.is_finite()
            && range.max.is_finite()
            && range.min >= 0.0
            && range.min <= range.max;
        valid.then_some(range)
    }

    fn parse_text(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if let Some((low, high)) = trimmed.split_once('-') {
            let min = low.trim().parse().ok()?;
            let max = high.trim().parse().ok()?;
            Some(Self { min, max })
        } else {
            trimmed.parse().ok().map(Self::fixed)
        }
    }

    #[must_use]
    pub fn is_fixed(&self) -> bool {
        (self.max - self.min).abs() < f64::EPSILON
    }

    /// Uniform draw within the range.
    pub fn roll(&self, rng: &mut impl Rng) -> f64 {
        if self.is_fixed() {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }
}

/// Chance-based reward attached to an (action, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveSpec {
    pub exp_reward: f64,
    pub money: MoneyRange,
    /// Trigger probability in percent, clamped to `[0, 100]`.
    pub chance_percent: f64,
}

impl ObjectiveSpec {
    #[must_use]
    pub fn new(exp_reward: f64, money: MoneyRange, chance_percent: f64) -> Self {
        Self {
            exp_reward,
            money,
            chance_percent: clamp_percent(chance_percent),
        }
    }

    /// Roll the trigger chance: 100 always fires, 0 never does.
    pub fn should_trigger(&self, rng: &mut impl Rng) -> bool {
        if self.chance_percent >= 100.0 {
            return true;
        }
        if self.chance_percent <= 0.0 {
            return false;
        }
        rng.gen_range(0.0..100.0) < self.chance_percent
    }

    pub fn roll_money(&self, rng: &mut impl Rng) -> f64 {
        self.money.roll(rng)
    }
}

/// Cosmetic grants handed to the host as flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CosmeticKind {
    Effect,
    Title,
    Item,
}

/// What a level reward does when it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LevelRewardKind {
    Money { amount: f64 },
    Command { command: String },
    Cosmetic { kind: CosmeticKind, value: String },
}

/// Reward fired once when a role reaches a configured level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardSpec {
    pub kind: LevelRewardKind,
    pub message: String,
}

/// A joinable role with its objectives and level rewards.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleDefinition {
    pub id: RoleId,
    pub display_name: String,
    pub description: String,
    objectives: HashMap<ActionKind, HashMap<Target, ObjectiveSpec>>,
    level_rewards: BTreeMap<u32, RewardSpec>,
}

impl RoleDefinition {
    #[must_use]
    pub fn new(id: RoleId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            description: String::new(),
            objectives: HashMap::new(),
            level_rewards: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_objective(mut self, action: ActionKind, target: Target, spec: ObjectiveSpec) -> Self {
        self.objectives.entry(action).or_default().insert(target, spec);
        self
    }

    #[must_use]
    pub fn with_level_reward(mut self, level: u32, reward: RewardSpec) -> Self {
        self.level_rewards.insert(level, reward);
        self
    }

    #[must_use]
    pub fn objective(&self, action: ActionKind, target: &Target) -> Option<&ObjectiveSpec> {
        self.objectives.get(&action)?.get(target)
    }

    #[must_use]
    pub fn objective_count(&self) -> usize {
        self.objectives.values().map(HashMap::len).sum()
    }

    /// Objectives sorted by action then target, for stable listings.
    #[must_use]
    pub fn objectives_sorted(&self) -> Vec<(ActionKind, &Target, &ObjectiveSpec)> {
        let mut listed: Vec<_> = self
            .objectives
            .iter()
            .flat_map(|(action, targets)| {
                targets
                    .iter()
                    .map(move |(target, spec)| (*action, target, spec))
            })
            .collect();
        listed.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        listed
    }

    #[must_use]
    pub fn level_reward(&self, level: u32) -> Option<&RewardSpec> {
        self.level_rewards.get(&level)
    }

    /// Rewards for levels in `(from, to]`, ascending.
    pub fn rewards_crossed(&self, from: u32, to: u32) -> impl Iterator<Item = (u32, &RewardSpec)> {
        self.level_rewards
            .range(from.saturating_add(1)..)
            .take_while(move |(level, _)| **level <= to)
            .map(|(level, reward)| (*level, reward))
    }

    #[must_use]
    pub const fn level_rewards(&self) -> &BTreeMap<u32, RewardSpec> {
        &self.level_rewards
    }
}

/// Error raised when the catalog document itself cannot be read.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("role catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A definition entry skipped during load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub role: String,
    pub path: String,
    pub reason: String,
}

/// Summary of a catalog load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub roles_loaded: usize,
    pub objectives_loaded: usize,
    pub skipped: Vec<SkippedEntry>,
}

impl LoadReport {
    fn skip(&mut self, role: &str, path: String, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!("skipping role entry {role}.{path}: {reason}");
        self.skipped.push(SkippedEntry {
            role: role.to_string(),
            path,
            reason,
        });
    }
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    roles: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawRole {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    objectives: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default)]
    level_rewards: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawObjective {
    #[serde(default)]
    exp: f64,
    #[serde(default)]
    money: Option<Value>,
    #[serde(default = "default_chance")]
    chance: f64,
}

const fn default_chance() -> f64 {
    DEFAULT_CHANCE_PERCENT
}

#[derive(Debug, Deserialize)]
struct RawReward {
    #[serde(rename = "type", default = "default_reward_type")]
    kind: String,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default = "default_reward_message")]
    message: String,
}

fn default_reward_type() -> String {
    "money".to_string()
}

fn default_reward_message() -> String {
    "Congratulations!".to_string()
}

/// Immutable set of loaded roles, shared by reference-counted handles.
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    roles: HashMap<RoleId, Arc<RoleDefinition>>,
}

impl RoleCatalog {
    /// Build a catalog from already-constructed definitions.
    #[must_use]
    pub fn from_definitions(definitions: impl IntoIterator<Item = RoleDefinition>) -> Self {
        let roles = definitions
            .into_iter()
            .map(|definition| (definition.id.clone(), Arc::new(definition)))
            .collect();
        Self { roles }
    }

    /// Load roles from a JSON document, skipping malformed entries.
    ///
    /// # Errors
    ///
    /// Returns an error only when the document is not JSON of the expected shape.
    pub fn from_json(json: &str) -> Result<(Self, LoadReport), CatalogError> {
        let raw: RawCatalog = serde_json::from_str(json)?;
        let mut report = LoadReport::default();
        let mut roles: HashMap<RoleId, Arc<RoleDefinition>> = HashMap::new();

        for (name, value) in raw.roles {
            if let Some(existing) = roles.get(&RoleId::new(&name)) {
                report.skip(
                    &name,
                    String::new(),
                    format!("duplicate role id '{}'", existing.id),
                );
                continue;
            }
            let role = match serde_json::from_value::<RawRole>(value) {
                Ok(role) => role,
                Err(err) => {
                    report.skip(&name, String::new(), format!("unreadable role: {err}"));
                    continue;
                }
            };
            let definition = build_role(&name, role, &mut report);
            report.objectives_loaded += definition.objective_count();
            log::info!(
                "loaded role {} ({} objectives, {} level rewards)",
                definition.id,
                definition.objective_count(),
                definition.level_rewards.len()
            );
            roles.insert(definition.id.clone(), Arc::new(definition));
        }

        report.roles_loaded = roles.len();
        Ok((Self { roles }, report))
    }

    #[must_use]
    pub fn get(&self, role: &RoleId) -> Option<Arc<RoleDefinition>> {
        self.roles.get(role).cloned()
    }

    #[must_use]
    pub fn contains(&self, role: &RoleId) -> bool {
        self.roles.contains_key(role)
    }

    /// Role ids in sorted order.
    #[must_use]
    pub fn ids(&self) -> Vec<RoleId> {
        let mut ids: Vec<_> = self.roles.keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

fn build_role(name: &str, raw: RawRole, report: &mut LoadReport) -> RoleDefinition {
    let id = RoleId::new(name);
    let mut definition = RoleDefinition::new(id, raw.display_name.unwrap_or_else(|| name.to_string()));
    definition.description = raw
        .description
        .unwrap_or_else(|| "No description available.".to_string());

    for (action_name, targets) in raw.objectives {
        let Some(action) = ActionKind::from_name(&action_name) else {
            report.skip(name, action_name.clone(), "unknown action kind");
            continue;
        };
        for (target_name, value) in targets {
            let path = format!("{action_name}.{target_name}");
            let Some(target) = action.target(&target_name) else {
                report.skip(name, path, "invalid target identifier");
                continue;
            };
            match parse_objective(value) {
                Ok(spec) => {
                    definition
                        .objectives
                        .entry(action)
                        .or_default()
                        .insert(target, spec);
                }
                Err(reason) => report.skip(name, path, reason),
            }
        }
    }

    for (level_key, value) in raw.level_rewards {
        let path = format!("level_rewards.{level_key}");
        let Some(level) = level_key
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|level| *level > 0)
        else {
            report.skip(name, path, "level key is not a positive integer");
            continue;
        };
        match parse_reward(value) {
            Ok(reward) => {
                definition.level_rewards.insert(level, reward);
            }
            Err(reason) => report.skip(name, path, reason),
        }
    }

    definition
}

fn parse_objective(value: Value) -> Result<ObjectiveSpec, String> {
    let raw: RawObjective =
        serde_json::from_value(value).map_err(|err| format!("unreadable objective: {err}"))?;
    if !raw.exp.is_finite() || raw.exp < 0.0 {
        return Err(format!("experience must be non-negative (got {})", raw.exp));
    }
    let money = match raw.money {
        None | Some(Value::Null) => MoneyRange::default(),
        Some(value) => MoneyRange::parse(&value)
            .ok_or_else(|| format!("malformed money value {value}"))?,
    };
    Ok(ObjectiveSpec::new(raw.exp, money, raw.chance))
}

fn value_text(value: Option<Value>) -> String {
    match value {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => "0".to_string(),
        Some(other) => other.to_string(),
    }
}

fn parse_reward(value: Value) -> Result<RewardSpec, String> {
    let raw: RawReward =
        serde_json::from_value(value).map_err(|err| format!("unreadable reward: {err}"))?;
    let text = value_text(raw.value);
    let kind = match raw.kind.trim().to_ascii_lowercase().as_str() {
        "money" => {
            let amount: f64 = text
                .trim()
                .parse()
                .map_err(|_| format!("money reward value '{text}' is not a number"))?;
            if !amount.is_finite() || amount < 0.0 {
                return Err(format!("money reward must be non-negative (got {amount})"));
            }
            LevelRewardKind::Money { amount }
        }
        "command" => LevelRewardKind::Command { command: text },
        "effect" => LevelRewardKind::Cosmetic {
            kind: CosmeticKind::Effect,
            value: text,
        },
        "title" => LevelRewardKind::Cosmetic {
            kind: CosmeticKind::Title,
            value: text,
        },
        "item" => LevelRewardKind::Cosmetic {
            kind: CosmeticKind::Item,
            value: text,
        },
        other => return Err(format!("unknown reward type '{other}'")),
    };
    Ok(RewardSpec {
        kind,
        message: raw.message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    const CATALOG: &str = r#"{
        "roles": {
            "Miner": {
                "display_name": "Miner",
                "objectives": {
                    "break": {
                        "stone": {"exp": 1.5, "money": 0.1},
                        "diamond_ore": {"exp": 20, "money": "2.5-5.0", "chance": 50},
                        "bad target!": {"exp": 1}
                    },
                    "teleport": {"anything": {"exp": 1}},
                    "kill": {"zombie": {"exp": 3, "money": "oops"}}
                },
                "level_rewards": {
                    "5": {"type": "money", "value": "100", "message": "Level 5!"},
                    "10": {"type": "command", "value": "give {subject} diamond 1"},
                    "x": {"type": "money", "value": "1"},
                    "20": {"type": "dance"}
                }
            },
            "fisher": {
                "objectives": {"fish": {"cod": {"exp": 2, "chance": 250}}}
            },
            "broken": 42
        }
    }"#;

    #[test]
    fn loads_valid_entries_and_reports_skips() {
        let (catalog, report) = RoleCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(report.roles_loaded, 2);
        assert_eq!(report.objectives_loaded, 3);
        assert_eq!(report.skipped.len(), 6);

        let miner = catalog.get(&RoleId::new("MINER")).unwrap();
        let stone = miner
            .objective(ActionKind::Break, &Target::Resource("STONE".into()))
            .unwrap();
        assert!((stone.exp_reward - 1.5).abs() < f64::EPSILON);
        assert!(stone.money.is_fixed());

        let diamond = miner
            .objective(ActionKind::Break, &ActionKind::Break.target("diamond_ore").unwrap())
            .unwrap();
        assert!((diamond.money.min - 2.5).abs() < f64::EPSILON);
        assert!((diamond.money.max - 5.0).abs() < f64::EPSILON);
        assert!((diamond.chance_percent - 50.0).abs() < f64::EPSILON);

        assert!(matches!(
            miner.level_reward(5).map(|r| &r.kind),
            Some(LevelRewardKind::Money { amount }) if (*amount - 100.0).abs() < f64::EPSILON
        ));
        assert_eq!(miner.level_reward(10).unwrap().message, "Congratulations!");

        let fisher = catalog.get(&RoleId::new("fisher")).unwrap();
        let cod = fisher
            .objective(ActionKind::Fish, &Target::Item("COD".into()))
            .unwrap();
        assert!((cod.chance_percent - 100.0).abs() < f64::EPSILON);
        assert_eq!(fisher.description, "No description available.");
    }

    #[test]
    fn targets_resolve_by_category() {
        assert_eq!(
            ActionKind::Kill.target("zombie"),
            Some(Target::Creature("ZOMBIE".into()))
        );
        assert_eq!(
            ActionKind::Smelt.target(" iron_ingot "),
            Some(Target::Resource("IRON_INGOT".into()))
        );
        assert_eq!(ActionKind::Brew.target("night vision"), None);
        assert!(ActionKind::Break.is_manipulation_sensitive());
        assert!(!ActionKind::Place.is_manipulation_sensitive());
        assert_eq!(ActionKind::from_name("SMELT"), Some(ActionKind::Smelt));
        assert_eq!(ActionKind::from_name("jump"), None);
    }

    #[test]
    fn money_parsing_rejects_malformed_ranges() {
        assert_eq!(
            MoneyRange::parse(&Value::from(1.5)),
            Some(MoneyRange::fixed(1.5))
        );
        assert_eq!(
            MoneyRange::parse(&Value::from("0.25 - 0.5")),
            Some(MoneyRange { min: 0.25, max: 0.5 })
        );
        assert_eq!(MoneyRange::parse(&Value::from("-1")), None);
        assert_eq!(MoneyRange::parse(&Value::from("5-1")), None);
        assert_eq!(MoneyRange::parse(&Value::from("1-2-3")), None);
        assert_eq!(MoneyRange::parse(&Value::Bool(true)), None);
    }

    #[test]
    fn money_rolls_stay_in_range() {
        let range = MoneyRange { min: 1.0, max: 2.0 };
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let value = range.roll(&mut rng);
            assert!((1.0..=2.0).contains(&value));
        }
        assert!((MoneyRange::fixed(3.0).roll(&mut rng) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rewards_crossed_are_ascending_and_exclusive_of_start() {
        let reward = |message: &str| RewardSpec {
            kind: LevelRewardKind::Money { amount: 1.0 },
            message: message.to_string(),
        };
        let role = RoleDefinition::new(RoleId::new("r"), "R")
            .with_level_reward(3, reward("three"))
            .with_level_reward(2, reward("two"))
            .with_level_reward(6, reward("six"));
        let crossed: Vec<u32> = role.rewards_crossed(1, 5).map(|(level, _)| level).collect();
        assert_eq!(crossed, vec![2, 3]);
        let crossed: Vec<u32> = role.rewards_crossed(2, 2).map(|(level, _)| level).collect();
        assert!(crossed.is_empty());
        let crossed: Vec<u32> = role.rewards_crossed(5, 9).map(|(level, _)| level).collect();
        assert_eq!(crossed, vec![6]);
    }

    #[test]
    fn level_zero_rewards_are_skipped() {
        let (catalog, report) = RoleCatalog::from_json(
            r#"{"roles": {"miner": {"level_rewards": {
                "0": {"type": "money", "value": 5},
                "1": {"type": "money", "value": 10}
            }}}}"#,
        )
        .unwrap();
        let miner = catalog.get(&RoleId::new("miner")).unwrap();
        assert!(miner.level_reward(0).is_none());
        assert!(miner.level_reward(1).is_some());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, "level_rewards.0");
    }

    #[test]
    fn case_duplicate_role_ids_keep_the_first_entry() {
        let (catalog, report) = RoleCatalog::from_json(
            r#"{"roles": {
                "Miner": {"display_name": "Upper", "objectives": {"break": {"stone": {"exp": 1}}}},
                "miner": {"display_name": "Lower", "objectives": {"break": {"stone": {"exp": 2}}}}
            }}"#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(report.roles_loaded, 1);
        assert_eq!(report.objectives_loaded, 1);
        assert_eq!(catalog.get(&RoleId::new("miner")).unwrap().display_name, "Upper");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].role, "miner");
        assert!(report.skipped[0].reason.contains("duplicate role id"));
    }

    #[test]
    fn unreadable_document_is_an_error() {
        assert!(RoleCatalog::from_json("[1, 2").is_err());
    }
}
