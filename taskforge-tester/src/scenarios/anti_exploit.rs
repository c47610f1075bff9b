use anyhow::{Result, ensure};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use taskforge_engine::{ActionEvent, ActionKind, LocationKey, SubjectId};

use super::{Scenario, ScenarioCtx, find_objective};
use crate::harness::Harness;

const PLACED_AT: u64 = 1_000;

/// Place-then-break around the natural-time boundary.
pub struct AntiExploit;

#[async_trait::async_trait]
impl Scenario for AntiExploit {
    fn name(&self) -> &'static str {
        "anti-exploit"
    }

    fn description(&self) -> &'static str {
        "Breaking a recently placed resource is refused until it is natural again"
    }

    async fn run(&self, ctx: &ScenarioCtx<'_>) -> Result<()> {
        let h = Harness::build(ctx.assets, ctx.seed)?;
        let protection = h.engine.config().anti_exploit.clone();
        let Some(objective) = find_objective(h.engine.catalog(), |action, target, _| {
            action == ActionKind::Break && protection.tracks(target.id())
        }) else {
            log::info!("anti-exploit scenario skipped: no tracked break objective");
            return Ok(());
        };

        let subject = SubjectId::new("builder");
        h.engine.on_role_join(&subject, &objective.role)?;
        let mut rng = ChaCha20Rng::seed_from_u64(ctx.seed);
        let location = LocationKey::new(
            "world",
            rng.gen_range(-10_000..10_000),
            rng.gen_range(-64..320),
            rng.gen_range(-10_000..10_000),
        );
        let event = |kind| {
            ActionEvent::new(subject.as_str(), kind, objective.target.id()).at(location.clone())
        };

        h.clock.set(PLACED_AT);
        let placed = h.engine.on_action(&event(ActionKind::Place));
        ensure!(
            placed.placement_recorded == protection.enabled,
            "placement recorded: {}, protection enabled: {}",
            placed.placement_recorded,
            protection.enabled
        );

        let natural_time = protection.natural_time;
        if !protection.enabled || natural_time == 0 {
            let broken = h.engine.on_action(&event(ActionKind::Break));
            ensure!(!broken.blocked, "break was blocked with protection off");
            return Ok(());
        }

        h.clock.set(PLACED_AT + natural_time - 1);
        let early = h.engine.on_action(&event(ActionKind::Break));
        ensure!(early.blocked, "break one millisecond early was rewarded");
        ensure!(early.rewards.is_empty(), "blocked break still paid rewards");
        ensure!(
            h.engine.tracker().remaining_exclusion(&location, PLACED_AT + natural_time - 1)
                == Some(1),
            "remaining exclusion is not one millisecond"
        );

        h.clock.set(PLACED_AT + natural_time);
        let on_time = h.engine.on_action(&event(ActionKind::Break));
        ensure!(!on_time.blocked, "break at the boundary was refused");
        ensure!(
            h.engine.tracker().is_empty(),
            "expired placement was not evicted"
        );

        let untouched = LocationKey::new("world", 0, 0, 0);
        let wild = h.engine.on_action(
            &ActionEvent::new(subject.as_str(), ActionKind::Break, objective.target.id())
                .at(untouched),
        );
        ensure!(!wild.blocked, "a never-placed location was refused");

        let now = PLACED_AT + natural_time;
        h.engine.on_action(&event(ActionKind::Place));
        ensure!(h.engine.tracker().len() == 1, "second placement not tracked");
        ensure!(
            h.engine.tracker().sweep(now + natural_time - 1) == 0,
            "sweep evicted a live placement"
        );
        ensure!(
            h.engine.tracker().sweep(now + natural_time) == 1,
            "sweep kept an expired placement"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::TesterAssets;

    async fn run(assets: &TesterAssets, seed: u64) -> Result<()> {
        AntiExploit
            .run(&ScenarioCtx {
                assets,
                seed,
                verbose: false,
            })
            .await
    }

    #[tokio::test]
    async fn boundary_holds_with_default_protection() {
        let assets = TesterAssets::load(None, None).unwrap();
        run(&assets, 3).await.unwrap();
    }

    #[tokio::test]
    async fn disabled_protection_never_blocks() {
        let mut assets = TesterAssets::load(None, None).unwrap();
        assets.config.anti_exploit.enabled = false;
        run(&assets, 4).await.unwrap();
        assets.config.anti_exploit.enabled = true;
        assets.config.anti_exploit.natural_time = 0;
        run(&assets, 5).await.unwrap();
    }
}
