//! Objective resolution and reward dispatch.
//!
//! One [`ActionEvent`] is matched against every role the subject holds. A
//! manipulation-sensitive action on a location that is not natural yields
//! nothing for any role. Otherwise each matching objective rolls its chance
//! independently and, on success, credits experience, routes money, fires
//! any level rewards crossed, and feeds the notification debouncer.
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::{Arc, Mutex, PoisonError};

use crate::anti_exploit::{LocationKey, PlacementTracker};
use crate::boosters::{BoosterBoard, RewardKind};
use crate::clock::Clock;
use crate::config::{AntiExploitConfig, EngineConfig};
use crate::constants::SUBJECT_PLACEHOLDER;
use crate::ids::{RoleId, SubjectId};
use crate::ledger::{Ledger, LedgerError};
use crate::notify::{Notice, NotificationDebouncer, NotificationSink};
use crate::progress::{ExperienceGain, ProgressCache};
use crate::roles::{ActionKind, CosmeticKind, LevelRewardKind, RoleCatalog, RoleDefinition};
use crate::salary::SalaryLedger;
use crate::time::format_duration;

/// Where reward money goes, resolved once from configuration.
///
/// Notification text and ledger routing both read this single value, so a
/// "pending" label is shown exactly when money was deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoneyRoute {
    /// Accumulated in the salary ledger until the next payout.
    Deferred,
    /// Deposited into the external ledger at reward time.
    Direct,
    /// No economy: money is neither accumulated nor paid.
    Disabled,
}

impl MoneyRoute {
    #[must_use]
    pub const fn from_config(config: &EngineConfig) -> Self {
        if !config.economy.enabled {
            Self::Disabled
        } else if config.salary.enabled {
            Self::Deferred
        } else {
            Self::Direct
        }
    }

    #[must_use]
    pub const fn is_deferred(self) -> bool {
        matches!(self, Self::Deferred)
    }
}

/// Host hooks for non-monetary level rewards.
pub trait LevelRewardHandler: Send + Sync {
    /// Run a pre-approved command with the subject already substituted.
    fn run_command(&self, subject: &SubjectId, command: &str);
    fn grant_cosmetic(&self, subject: &SubjectId, kind: CosmeticKind, value: &str);
}

/// A captured world action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub subject: SubjectId,
    pub kind: ActionKind,
    pub target: String,
    /// Required for anti-exploit tracking of place/break actions.
    #[serde(default)]
    pub location: Option<LocationKey>,
}

impl ActionEvent {
    #[must_use]
    pub fn new(subject: impl Into<String>, kind: ActionKind, target: impl Into<String>) -> Self {
        Self {
            subject: SubjectId::new(subject),
            kind,
            target: target.into(),
            location: None,
        }
    }

    #[must_use]
    pub fn at(mut self, location: LocationKey) -> Self {
        self.location = Some(location);
        self
    }
}

/// What happened to the money of one triggered objective.
#[derive(Debug, Clone, PartialEq)]
pub enum MoneyDelivery {
    /// Nothing to pay.
    None,
    Deferred,
    Deposited,
    /// Direct deposit failed; experience and statistics were still recorded.
    Failed(LedgerError),
    /// Economy disabled.
    Disabled,
}

/// A level reward that fired during dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredReward {
    pub level: u32,
    pub kind: LevelRewardKind,
    pub delivery: MoneyDelivery,
}

/// Reward credited to one role.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleReward {
    pub role: RoleId,
    pub experience: f64,
    pub money: f64,
    pub money_delivery: MoneyDelivery,
    pub gain: ExperienceGain,
    pub fired_rewards: SmallVec<[FiredReward; 2]>,
}

/// Result of dispatching one action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    /// Target identifier could not be resolved for this action kind.
    pub unresolved_target: bool,
    /// Location was not natural; nothing was rewarded.
    pub blocked: bool,
    /// A tracked placement was recorded.
    pub placement_recorded: bool,
    pub rewards: SmallVec<[RoleReward; 3]>,
}

impl DispatchOutcome {
    #[must_use]
    pub fn total_experience(&self) -> f64 {
        self.rewards.iter().map(|reward| reward.experience).sum()
    }

    #[must_use]
    pub fn total_money(&self) -> f64 {
        self.rewards.iter().map(|reward| reward.money).sum()
    }
}

/// Collaborators and shared state used by dispatch.
pub struct DispatchContext {
    pub catalog: Arc<RoleCatalog>,
    pub progress: Arc<ProgressCache>,
    pub boosters: Arc<BoosterBoard>,
    pub tracker: Arc<PlacementTracker>,
    pub salary: Arc<SalaryLedger>,
    pub notifier: Arc<NotificationDebouncer>,
    pub sink: Arc<dyn NotificationSink>,
    pub ledger: Arc<dyn Ledger>,
    pub clock: Arc<dyn Clock>,
    pub rewards: Arc<dyn LevelRewardHandler>,
}

pub struct RewardDispatcher {
    ctx: DispatchContext,
    anti_exploit: AntiExploitConfig,
    route: MoneyRoute,
    log_actions: bool,
    rng: Mutex<SmallRng>,
}

impl std::fmt::Debug for RewardDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardDispatcher")
            .field("route", &self.route)
            .field("anti_exploit", &self.anti_exploit.enabled)
            .finish_non_exhaustive()
    }
}

impl RewardDispatcher {
    #[must_use]
    pub fn new(ctx: DispatchContext, config: &EngineConfig) -> Self {
        let rng = config
            .settings
            .rng_seed
            .map_or_else(SmallRng::from_entropy, SmallRng::seed_from_u64);
        Self {
            ctx,
            anti_exploit: config.anti_exploit.clone(),
            route: MoneyRoute::from_config(config),
            log_actions: config.settings.log_actions,
            rng: Mutex::new(rng),
        }
    }

    #[must_use]
    pub const fn money_route(&self) -> MoneyRoute {
        self.route
    }

    /// Resolve and reward one action for every role the subject holds.
    pub fn on_action(&self, event: &ActionEvent) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let Some(target) = event.kind.target(&event.target) else {
            outcome.unresolved_target = true;
            return outcome;
        };

        if self.anti_exploit.enabled
            && let Some(location) = &event.location
        {
            let now = self.ctx.clock.now_millis();
            if event.kind == ActionKind::Place && self.anti_exploit.tracks(target.id()) {
                self.ctx.tracker.record_placement(location, now);
                outcome.placement_recorded = true;
                self.debug_notice(
                    &event.subject,
                    format!("Tracked placement of {target} at {location}"),
                );
            }
            if event.kind.is_manipulation_sensitive()
                && !self
                    .ctx
                    .tracker
                    .is_natural(location, now, self.anti_exploit.natural_time)
            {
                outcome.blocked = true;
                let remaining = self
                    .ctx
                    .tracker
                    .remaining_exclusion(location, now)
                    .unwrap_or(0);
                self.debug_notice(
                    &event.subject,
                    format!(
                        "No reward: {target} was placed recently (natural in {})",
                        format_duration(remaining)
                    ),
                );
                return outcome;
            }
        }

        for role in self.ctx.progress.roles_of(&event.subject) {
            let Some(definition) = self.ctx.catalog.get(&role) else {
                continue;
            };
            let Some(spec) = definition.objective(event.kind, &target) else {
                continue;
            };
            let rolled = {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                spec.should_trigger(&mut *rng)
                    .then(|| (spec.exp_reward, spec.roll_money(&mut *rng)))
            };
            let Some((base_exp, base_money)) = rolled else {
                continue;
            };
            if let Some(reward) = self.credit(&event.subject, &definition, base_exp, base_money) {
                if self.log_actions {
                    log::info!(
                        "{} {} {target} -> {}: +{:.2} exp, +{:.2} money",
                        event.subject,
                        event.kind,
                        reward.role,
                        reward.experience,
                        reward.money
                    );
                } else {
                    log::debug!(
                        "{} {} {target} -> {}: +{:.2} exp, +{:.2} money",
                        event.subject,
                        event.kind,
                        reward.role,
                        reward.experience,
                        reward.money
                    );
                }
                outcome.rewards.push(reward);
            }
        }
        outcome
    }

    /// Credit boosted experience and money to one role.
    ///
    /// Returns `None` if the membership disappeared concurrently.
    fn credit(
        &self,
        subject: &SubjectId,
        definition: &RoleDefinition,
        base_exp: f64,
        base_money: f64,
    ) -> Option<RoleReward> {
        let boosters = &self.ctx.boosters;
        let experience = boosters.apply(subject, RewardKind::Experience, base_exp);
        let money = match self.route {
            MoneyRoute::Disabled => 0.0,
            MoneyRoute::Deferred | MoneyRoute::Direct => {
                boosters.apply(subject, RewardKind::Money, base_money)
            }
        };

        let gain = self
            .ctx
            .progress
            .add_experience(subject, &definition.id, experience, money)?;
        let money_delivery = self.deliver(subject, money);
        let fired_rewards = if gain.leveled_up() {
            self.level_up(subject, definition, &gain)
        } else {
            SmallVec::new()
        };

        self.ctx.notifier.enqueue(
            subject,
            &definition.id,
            experience,
            money,
            self.route.is_deferred(),
        );

        Some(RoleReward {
            role: definition.id.clone(),
            experience,
            money,
            money_delivery,
            gain,
            fired_rewards,
        })
    }

    fn deliver(&self, subject: &SubjectId, money: f64) -> MoneyDelivery {
        match self.route {
            MoneyRoute::Disabled => MoneyDelivery::Disabled,
            _ if money <= 0.0 => MoneyDelivery::None,
            MoneyRoute::Deferred => {
                self.ctx.salary.accumulate(subject, money);
                MoneyDelivery::Deferred
            }
            MoneyRoute::Direct => match self.ctx.ledger.deposit(subject, money) {
                Ok(()) => MoneyDelivery::Deposited,
                Err(err) => {
                    log::warn!("direct payment of {money:.2} to {subject} failed: {err}");
                    MoneyDelivery::Failed(err)
                }
            },
        }
    }

    fn level_up(
        &self,
        subject: &SubjectId,
        definition: &RoleDefinition,
        gain: &ExperienceGain,
    ) -> SmallVec<[FiredReward; 2]> {
        log::info!(
            "{subject} reached {} level {}",
            definition.id,
            gain.new_level
        );
        self.ctx.sink.notice(
            subject,
            &Notice::LevelUp {
                role: definition.id.clone(),
                display_name: definition.display_name.clone(),
                level: gain.new_level,
            },
        );
        definition
            .rewards_crossed(gain.previous_level, gain.new_level)
            .map(|(level, reward)| {
                let delivery = self.apply_level_reward(subject, &reward.kind);
                self.ctx.sink.notice(
                    subject,
                    &Notice::LevelReward {
                        role: definition.id.clone(),
                        level,
                        message: reward.message.clone(),
                    },
                );
                FiredReward {
                    level,
                    kind: reward.kind.clone(),
                    delivery,
                }
            })
            .collect()
    }

    fn apply_level_reward(&self, subject: &SubjectId, kind: &LevelRewardKind) -> MoneyDelivery {
        match kind {
            LevelRewardKind::Money { amount } => {
                if self.route == MoneyRoute::Disabled {
                    return MoneyDelivery::Disabled;
                }
                if *amount <= 0.0 {
                    return MoneyDelivery::None;
                }
                match self.ctx.ledger.deposit(subject, *amount) {
                    Ok(()) => MoneyDelivery::Deposited,
                    Err(err) => {
                        log::warn!("level reward of {amount:.2} to {subject} failed: {err}");
                        MoneyDelivery::Failed(err)
                    }
                }
            }
            LevelRewardKind::Command { command } => {
                let command = command.replace(SUBJECT_PLACEHOLDER, subject.as_str());
                self.ctx.rewards.run_command(subject, &command);
                MoneyDelivery::None
            }
            LevelRewardKind::Cosmetic { kind, value } => {
                self.ctx.rewards.grant_cosmetic(subject, *kind, value);
                MoneyDelivery::None
            }
        }
    }

    /// Credit experience outside any objective, firing every level reward crossed.
    ///
    /// Boosters are not applied and no money is involved.
    pub fn grant_experience(
        &self,
        subject: &SubjectId,
        definition: &RoleDefinition,
        experience: f64,
    ) -> Option<(ExperienceGain, SmallVec<[FiredReward; 2]>)> {
        let gain = self
            .ctx
            .progress
            .add_experience(subject, &definition.id, experience, 0.0)?;
        let fired = if gain.leveled_up() {
            self.level_up(subject, definition, &gain)
        } else {
            SmallVec::new()
        };
        Some((gain, fired))
    }

    fn debug_notice(&self, subject: &SubjectId, message: String) {
        if self.anti_exploit.debug_messages {
            self.ctx
                .sink
                .notice(subject, &Notice::AntiExploit { message });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_route_follows_flags() {
        let mut config = EngineConfig::default();
        assert_eq!(MoneyRoute::from_config(&config), MoneyRoute::Deferred);
        config.salary.enabled = false;
        assert_eq!(MoneyRoute::from_config(&config), MoneyRoute::Direct);
        config.economy.enabled = false;
        assert_eq!(MoneyRoute::from_config(&config), MoneyRoute::Disabled);
        config.salary.enabled = true;
        assert_eq!(MoneyRoute::from_config(&config), MoneyRoute::Disabled);
        assert!(!MoneyRoute::Disabled.is_deferred());
    }

    #[test]
    fn events_carry_optional_locations() {
        let event = ActionEvent::new("alex", ActionKind::Break, "stone")
            .at(LocationKey::new("world", 1, 2, 3));
        assert_eq!(event.subject.as_str(), "alex");
        assert_eq!(event.location.map(|key| key.to_string()).as_deref(), Some("world:1:2:3"));
    }
}
