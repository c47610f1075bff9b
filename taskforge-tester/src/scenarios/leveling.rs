use anyhow::{Context, Result, ensure};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use taskforge_engine::constants::SUBJECT_PLACEHOLDER;
use taskforge_engine::{LevelRewardKind, SubjectId};

use super::{Scenario, ScenarioCtx};
use crate::harness::Harness;
use crate::util::approx_eq;

const MAX_GRANTS_PER_ROLE: usize = 40;

/// Random experience grants per role, checking levels and one-shot level rewards.
pub struct Leveling;

#[async_trait::async_trait]
impl Scenario for Leveling {
    fn name(&self) -> &'static str {
        "leveling"
    }

    fn description(&self) -> &'static str {
        "Grant random experience and verify levels and level rewards"
    }

    async fn run(&self, ctx: &ScenarioCtx<'_>) -> Result<()> {
        let h = Harness::build(ctx.assets, ctx.seed)?;
        let curve = *h.engine.progress().curve();
        let mut rng = ChaCha20Rng::seed_from_u64(ctx.seed);

        for role in h.engine.catalog().ids() {
            let definition = h
                .engine
                .catalog()
                .get(&role)
                .with_context(|| format!("role {role} vanished from the catalog"))?;
            let subject = SubjectId::new(format!("leveler-{role}"));
            h.engine.on_role_join(&subject, &role)?;

            let mut level = 1;
            let mut total = 0.0;
            let mut fired_levels = Vec::new();
            for _ in 0..MAX_GRANTS_PER_ROLE {
                if level >= curve.max_level() {
                    break;
                }
                let ceiling = curve.exp_required_for_level(level) * 1.5;
                let grant = rng.gen_range(0.0..ceiling);
                let (gain, fired) = h.engine.grant_experience(&subject, &role, grant)?;
                total += grant;

                let expected_level = curve.level_from_experience(total);
                ensure!(
                    gain.previous_level == level,
                    "{role}: gain started at level {} instead of {level}",
                    gain.previous_level
                );
                ensure!(
                    gain.new_level == expected_level,
                    "{role}: reached level {} but {total:.2} exp means {expected_level}",
                    gain.new_level
                );

                let expected_rewards: Vec<u32> = definition
                    .rewards_crossed(level, expected_level)
                    .map(|(reward_level, _)| reward_level)
                    .collect();
                let fired_now: Vec<u32> = fired.iter().map(|reward| reward.level).collect();
                ensure!(
                    fired_now == expected_rewards,
                    "{role}: fired {fired_now:?} moving {level} -> {expected_level}, expected {expected_rewards:?}"
                );
                fired_levels.extend(fired_now);
                level = expected_level;
            }

            let mut unique = fired_levels.clone();
            unique.dedup();
            ensure!(
                unique.len() == fired_levels.len(),
                "{role}: level rewards repeated: {fired_levels:?}"
            );
            let stored = h.engine.get_experience(&subject, &role).unwrap_or_default();
            ensure!(
                approx_eq(stored, total),
                "{role}: engine holds {stored} exp, granted {total}"
            );
            if ctx.verbose {
                println!("  ↳ {role}: level {level}, rewards {fired_levels:?}");
            }

            let commands_expected = definition
                .rewards_crossed(1, level)
                .filter(|(_, reward)| matches!(reward.kind, LevelRewardKind::Command { .. }))
                .count();
            let commands_seen = h
                .rewards
                .commands()
                .into_iter()
                .filter(|(target, _)| *target == subject)
                .inspect(|(_, command)| log::debug!("{subject} command: {command}"))
                .filter(|(_, command)| !command.contains(SUBJECT_PLACEHOLDER))
                .count();
            ensure!(
                commands_seen == commands_expected,
                "{role}: {commands_seen} substituted commands ran, expected {commands_expected}"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::TesterAssets;

    #[tokio::test]
    async fn leveling_passes_for_several_seeds() {
        let assets = TesterAssets::load(None, None).unwrap();
        for seed in [1, 7, 1337] {
            let ctx = ScenarioCtx {
                assets: &assets,
                seed,
                verbose: false,
            };
            Leveling.run(&ctx).await.unwrap();
        }
    }
}
