//! Reward notifications: rendering, the display sink, and burst debouncing.
//!
//! With the `bar` style every subject has at most one accumulation timer.
//! A new reward merges into the pending summary and replaces the timer, so a
//! burst produces a single display once it goes quiet. Each timer carries a
//! generation number; a timer that lost the race to a newer reward finds a
//! different generation and does nothing.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::{NotificationConfig, NotificationStyle};
use crate::ids::{RoleId, SubjectId};

/// Coalesced rewards for one subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardSummary {
    pub experience: f64,
    pub money: f64,
    /// Money is waiting for the next salary payout rather than deposited.
    pub deferred: bool,
    /// Contributing roles, in first-arrival order.
    pub roles: Vec<RoleId>,
    pub events: u32,
}

impl RewardSummary {
    fn merge(&mut self, role: &RoleId, experience: f64, money: f64, deferred: bool) {
        self.experience += experience;
        self.money += money;
        self.deferred |= deferred;
        self.events += 1;
        if !self.roles.contains(role) {
            self.roles.push(role.clone());
        }
    }
}

/// What the subject actually sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayEvent {
    pub subject: SubjectId,
    pub text: String,
    pub summary: RewardSummary,
}

/// One-off messages delivered immediately, outside the debounce window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    LevelUp {
        role: RoleId,
        display_name: String,
        level: u32,
    },
    LevelReward {
        role: RoleId,
        level: u32,
        message: String,
    },
    SalaryPaid {
        amount: f64,
        currency_symbol: String,
    },
    AntiExploit {
        message: String,
    },
}

impl Notice {
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::LevelUp {
                display_name,
                level,
                ..
            } => format!("{display_name} level up! You are now level {level}."),
            Self::LevelReward { message, .. } | Self::AntiExploit { message } => message.clone(),
            Self::SalaryPaid {
                amount,
                currency_symbol,
            } => format!("Salary paid: {currency_symbol}{amount:.2}"),
        }
    }
}

/// Host-side presentation of rewards.
pub trait NotificationSink: Send + Sync {
    fn show(&self, event: &DisplayEvent);
    fn dismiss(&self, subject: &SubjectId);
    fn notice(&self, subject: &SubjectId, notice: &Notice);
}

/// Which parts of a summary are rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub show_experience: bool,
    pub show_money: bool,
    pub currency_symbol: String,
}

impl RenderOptions {
    #[must_use]
    pub fn from_config(config: &NotificationConfig, currency_symbol: &str) -> Self {
        Self {
            show_experience: config.exp_notifications,
            show_money: config.money_notifications,
            currency_symbol: currency_symbol.to_string(),
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_experience: true,
            show_money: true,
            currency_symbol: "$".to_string(),
        }
    }
}

/// Render a summary as `+12.5 EXP | +$3.00 (pending) (miner)`.
///
/// Returns `None` when nothing visible is left.
#[must_use]
pub fn render_summary(summary: &RewardSummary, options: &RenderOptions) -> Option<String> {
    let mut parts = Vec::with_capacity(2);
    if options.show_experience && summary.experience > 0.0 {
        parts.push(format!("+{:.1} EXP", summary.experience));
    }
    if options.show_money && summary.money > 0.0 {
        let mut money = format!("+{}{:.2}", options.currency_symbol, summary.money);
        if summary.deferred {
            money.push_str(" (pending)");
        }
        parts.push(money);
    }
    if parts.is_empty() {
        return None;
    }
    let mut text = parts.join(" | ");
    if !summary.roles.is_empty() {
        let roles: Vec<&str> = summary.roles.iter().map(RoleId::as_str).collect();
        let _ = write!(text, " ({})", roles.join(", "));
    }
    Some(text)
}

struct PendingDisplay {
    summary: RewardSummary,
    generation: u64,
    timer: JoinHandle<()>,
}

struct DismissTimer {
    generation: u64,
    timer: JoinHandle<()>,
}

/// Per-subject burst coalescing in front of a [`NotificationSink`].
pub struct NotificationDebouncer {
    sink: Arc<dyn NotificationSink>,
    handle: Handle,
    style: NotificationStyle,
    accumulation: Duration,
    display: Duration,
    render: RenderOptions,
    pending: Mutex<HashMap<SubjectId, PendingDisplay>>,
    dismissals: Mutex<HashMap<SubjectId, DismissTimer>>,
    generation: AtomicU64,
}

impl std::fmt::Debug for NotificationDebouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDebouncer")
            .field("style", &self.style)
            .field("accumulation", &self.accumulation)
            .field("display", &self.display)
            .finish_non_exhaustive()
    }
}

impl NotificationDebouncer {
    #[must_use]
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        handle: Handle,
        config: &NotificationConfig,
        render: RenderOptions,
    ) -> Self {
        Self {
            sink,
            handle,
            style: config.style,
            accumulation: config.accumulation_window(),
            display: config.display_window(),
            render,
            pending: Mutex::new(HashMap::new()),
            dismissals: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<SubjectId, PendingDisplay>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dismissals(&self) -> MutexGuard<'_, HashMap<SubjectId, DismissTimer>> {
        self.dismissals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Merge a reward into the subject's summary and restart its timer.
    pub fn enqueue(
        self: &Arc<Self>,
        subject: &SubjectId,
        role: &RoleId,
        experience: f64,
        money: f64,
        deferred: bool,
    ) {
        if self.style == NotificationStyle::Chat {
            let mut summary = RewardSummary::default();
            summary.merge(role, experience, money, deferred);
            self.emit(subject, summary, false);
            return;
        }

        // The timer is spawned under the lock so `fire` always sees the entry
        // carrying its generation.
        let mut pending = self.pending();
        let generation = self.next_generation();
        let timer = self.schedule_fire(subject.clone(), generation);
        match pending.get_mut(subject) {
            Some(entry) => {
                entry.summary.merge(role, experience, money, deferred);
                entry.generation = generation;
                let stale = std::mem::replace(&mut entry.timer, timer);
                stale.abort();
            }
            None => {
                let mut summary = RewardSummary::default();
                summary.merge(role, experience, money, deferred);
                pending.insert(
                    subject.clone(),
                    PendingDisplay {
                        summary,
                        generation,
                        timer,
                    },
                );
            }
        }
    }

    fn schedule_fire(self: &Arc<Self>, subject: SubjectId, generation: u64) -> JoinHandle<()> {
        let debouncer = Arc::clone(self);
        let delay = self.accumulation;
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            debouncer.fire(&subject, generation);
        })
    }

    fn fire(self: &Arc<Self>, subject: &SubjectId, generation: u64) {
        let summary = {
            let mut pending = self.pending();
            match pending.get(subject) {
                Some(entry) if entry.generation == generation => {
                    pending.remove(subject).map(|entry| entry.summary)
                }
                _ => None,
            }
        };
        if let Some(summary) = summary {
            self.emit(subject, summary, true);
        }
    }

    fn emit(self: &Arc<Self>, subject: &SubjectId, summary: RewardSummary, auto_dismiss: bool) {
        let Some(text) = render_summary(&summary, &self.render) else {
            return;
        };
        self.sink.show(&DisplayEvent {
            subject: subject.clone(),
            text,
            summary,
        });
        if auto_dismiss {
            self.schedule_dismiss(subject);
        }
    }

    fn schedule_dismiss(self: &Arc<Self>, subject: &SubjectId) {
        let generation = self.next_generation();
        let debouncer = Arc::clone(self);
        let delay = self.display;
        let target = subject.clone();
        let timer = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            debouncer.dismiss_if_current(&target, generation);
        });
        if let Some(previous) = self
            .dismissals()
            .insert(subject.clone(), DismissTimer { generation, timer })
        {
            previous.timer.abort();
        }
    }

    fn dismiss_if_current(&self, subject: &SubjectId, generation: u64) {
        let current = {
            let mut dismissals = self.dismissals();
            match dismissals.get(subject) {
                Some(timer) if timer.generation == generation => {
                    dismissals.remove(subject);
                    true
                }
                _ => false,
            }
        };
        if current {
            self.sink.dismiss(subject);
        }
    }

    /// Summary still waiting for its timer.
    #[must_use]
    pub fn pending_summary(&self, subject: &SubjectId) -> Option<RewardSummary> {
        self.pending()
            .get(subject)
            .map(|entry| entry.summary.clone())
    }

    /// Emit the subject's pending summary now and cancel its timers.
    pub fn flush_subject(self: &Arc<Self>, subject: &SubjectId) -> bool {
        let entry = self.pending().remove(subject);
        if let Some(dismiss) = self.dismissals().remove(subject) {
            dismiss.timer.abort();
        }
        let Some(entry) = entry else {
            return false;
        };
        entry.timer.abort();
        self.emit(subject, entry.summary, false);
        true
    }

    /// Emit every pending summary and cancel all timers.
    pub fn flush_all(self: &Arc<Self>) -> usize {
        let drained: Vec<(SubjectId, PendingDisplay)> = self.pending().drain().collect();
        for (_, dismiss) in self.dismissals().drain() {
            dismiss.timer.abort();
        }
        let flushed = drained.len();
        for (subject, entry) in drained {
            entry.timer.abort();
            self.emit(&subject, entry.summary, false);
        }
        flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RecordingSink;

    fn debouncer(style: NotificationStyle) -> (Arc<NotificationDebouncer>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let config = NotificationConfig {
            style,
            ..NotificationConfig::default()
        };
        let debouncer = Arc::new(NotificationDebouncer::new(
            sink.clone(),
            Handle::current(),
            &config,
            RenderOptions::default(),
        ));
        (debouncer, sink)
    }

    #[test]
    fn rendering_follows_toggles() {
        let summary = RewardSummary {
            experience: 12.5,
            money: 3.0,
            deferred: true,
            roles: vec![RoleId::new("miner")],
            events: 1,
        };
        let mut options = RenderOptions::default();
        assert_eq!(
            render_summary(&summary, &options).as_deref(),
            Some("+12.5 EXP | +$3.00 (pending) (miner)")
        );
        options.show_money = false;
        assert_eq!(
            render_summary(&summary, &options).as_deref(),
            Some("+12.5 EXP (miner)")
        );
        options.show_experience = false;
        assert_eq!(render_summary(&summary, &options), None);

        let direct = RewardSummary {
            deferred: false,
            experience: 0.0,
            ..summary
        };
        assert_eq!(
            render_summary(&direct, &RenderOptions::default()).as_deref(),
            Some("+$3.00 (miner)")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn burst_produces_one_aggregate() {
        let (debouncer, sink) = debouncer(NotificationStyle::Bar);
        let subject = SubjectId::from("alex");
        let role = RoleId::new("miner");
        for _ in 0..3 {
            debouncer.enqueue(&subject, &role, 5.0, 1.0, false);
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        assert!(sink.shown().is_empty());

        tokio::time::sleep(Duration::from_millis(1_600)).await;
        let shown = sink.shown();
        assert_eq!(shown.len(), 1);
        assert!((shown[0].summary.experience - 15.0).abs() < f64::EPSILON);
        assert!((shown[0].summary.money - 3.0).abs() < f64::EPSILON);
        assert_eq!(shown[0].summary.events, 3);
        assert!(debouncer.pending_summary(&subject).is_none());

        debouncer.enqueue(&subject, &role, 1.0, 0.0, false);
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(sink.shown().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn immediate_timers_never_strand_an_aggregate() {
        let sink = Arc::new(RecordingSink::new());
        let config = NotificationConfig {
            style: NotificationStyle::Bar,
            accumulation_millis: 1,
            ..NotificationConfig::default()
        };
        let debouncer = Arc::new(NotificationDebouncer::new(
            sink.clone(),
            Handle::current(),
            &config,
            RenderOptions::default(),
        ));
        let subjects: Vec<SubjectId> = (0..64).map(|i| SubjectId::new(format!("s{i}"))).collect();
        let role = RoleId::new("miner");
        for _ in 0..4 {
            for subject in &subjects {
                debouncer.enqueue(subject, &role, 1.0, 0.0, false);
            }
            tokio::task::yield_now().await;
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while subjects
            .iter()
            .any(|subject| debouncer.pending_summary(subject).is_some())
            && std::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for subject in &subjects {
            assert!(debouncer.pending_summary(subject).is_none(), "{subject} stranded");
        }
        let shown_events: u32 = sink.shown().iter().map(|event| event.summary.events).sum();
        assert_eq!(shown_events, 4 * 64);
    }

    #[tokio::test(start_paused = true)]
    async fn display_is_dismissed_after_its_own_timer() {
        let (debouncer, sink) = debouncer(NotificationStyle::Bar);
        let subject = SubjectId::from("alex");
        debouncer.enqueue(&subject, &RoleId::new("miner"), 5.0, 0.0, false);
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(sink.shown().len(), 1);
        assert!(sink.dismissed().is_empty());
        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert_eq!(sink.dismissed(), vec![subject]);
    }

    #[tokio::test(start_paused = true)]
    async fn chat_style_shows_every_reward() {
        let (debouncer, sink) = debouncer(NotificationStyle::Chat);
        let subject = SubjectId::from("alex");
        debouncer.enqueue(&subject, &RoleId::new("miner"), 5.0, 0.0, false);
        debouncer.enqueue(&subject, &RoleId::new("miner"), 6.0, 0.0, false);
        assert_eq!(sink.shown().len(), 2);
        assert!(debouncer.pending_summary(&subject).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_emits_without_waiting() {
        let (debouncer, sink) = debouncer(NotificationStyle::Bar);
        let alex = SubjectId::from("alex");
        let sam = SubjectId::from("sam");
        debouncer.enqueue(&alex, &RoleId::new("miner"), 5.0, 0.0, false);
        debouncer.enqueue(&alex, &RoleId::new("farmer"), 2.0, 0.0, false);
        debouncer.enqueue(&sam, &RoleId::new("miner"), 1.0, 0.0, false);

        assert!(debouncer.flush_subject(&alex));
        assert!(!debouncer.flush_subject(&alex));
        let shown = sink.shown();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].text, "+7.0 EXP (miner, farmer)");

        assert_eq!(debouncer.flush_all(), 1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.shown().len(), 2);
    }
}
