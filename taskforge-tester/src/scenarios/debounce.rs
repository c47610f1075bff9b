use anyhow::{Context, Result, ensure};
use std::time::Duration;
use taskforge_engine::{ActionEvent, NotificationStyle, SubjectId};

use super::{ObjectiveRef, Scenario, ScenarioCtx, find_objective};
use crate::harness::Harness;
use crate::util::approx_eq;

const WINDOW_MILLIS: u64 = 40;
const SLACK: Duration = Duration::from_millis(120);
const BURST: usize = 6;

/// A burst of rewards collapses into one timed notification.
pub struct Debounce;

#[async_trait::async_trait]
impl Scenario for Debounce {
    fn name(&self) -> &'static str {
        "debounce"
    }

    fn description(&self) -> &'static str {
        "Reward bursts collapse into one notification that is later dismissed"
    }

    async fn run(&self, ctx: &ScenarioCtx<'_>) -> Result<()> {
        let Some(objective) = find_objective(&ctx.assets.catalog, |_, _, spec| {
            spec.chance_percent >= 100.0 && spec.exp_reward > 0.0
        }) else {
            log::info!("debounce scenario skipped: no guaranteed objective");
            return Ok(());
        };
        check_bar(ctx, &objective).await?;
        check_chat(ctx, &objective)
    }
}

async fn check_bar(ctx: &ScenarioCtx<'_>, objective: &ObjectiveRef) -> Result<()> {
    let mut config = ctx.assets.config.clone();
    config.notifications.style = NotificationStyle::Bar;
    config.notifications.accumulation_millis = WINDOW_MILLIS;
    config.notifications.display_millis = WINDOW_MILLIS;
    config.notifications.exp_notifications = true;
    let h = Harness::with_config(ctx.assets, config, ctx.seed)?;

    let subject = SubjectId::new("burst");
    h.engine.on_role_join(&subject, &objective.role)?;
    let mut experience = 0.0;
    let mut events = 0_u32;
    for _ in 0..BURST {
        let outcome = h.engine.on_action(&ActionEvent::new(
            subject.as_str(),
            objective.action,
            objective.target.id(),
        ));
        experience += outcome.total_experience();
        events += u32::try_from(outcome.rewards.len()).unwrap_or(u32::MAX);
    }

    ensure!(
        h.sink.shown().is_empty(),
        "notification shown before the window closed"
    );
    let pending = h
        .engine
        .notifier()
        .pending_summary(&subject)
        .context("burst left no pending summary")?;
    ensure!(
        pending.events == events,
        "summary merged {} events, expected {events}",
        pending.events
    );
    ensure!(
        approx_eq(pending.experience, experience),
        "summary holds {} exp, expected {experience}",
        pending.experience
    );

    tokio::time::sleep(Duration::from_millis(WINDOW_MILLIS) + SLACK).await;
    let shown = h.sink.shown();
    ensure!(shown.len() == 1, "expected one notification, saw {}", shown.len());
    ensure!(
        shown[0].text.contains("EXP"),
        "notification text '{}' omits experience",
        shown[0].text
    );
    if ctx.verbose {
        println!("  ↳ shown: {}", shown[0].text);
    }

    tokio::time::sleep(Duration::from_millis(WINDOW_MILLIS) + SLACK).await;
    ensure!(
        h.sink.dismissed().contains(&subject),
        "notification was never dismissed"
    );
    Ok(())
}

fn check_chat(ctx: &ScenarioCtx<'_>, objective: &ObjectiveRef) -> Result<()> {
    let mut config = ctx.assets.config.clone();
    config.notifications.style = NotificationStyle::Chat;
    config.notifications.exp_notifications = true;
    let h = Harness::with_config(ctx.assets, config, ctx.seed)?;

    let subject = SubjectId::new("chatty");
    h.engine.on_role_join(&subject, &objective.role)?;
    let mut rewards = 0;
    for _ in 0..BURST {
        rewards += h
            .engine
            .on_action(&ActionEvent::new(
                subject.as_str(),
                objective.action,
                objective.target.id(),
            ))
            .rewards
            .len();
    }
    let shown = h.sink.shown().len();
    ensure!(
        shown == rewards,
        "chat style showed {shown} messages for {rewards} rewards"
    );
    ensure!(
        h.engine.notifier().pending_summary(&subject).is_none(),
        "chat style kept a pending summary"
    );
    Ok(())
}
