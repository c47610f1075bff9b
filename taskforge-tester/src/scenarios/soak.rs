use anyhow::{Result, ensure};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::time::Duration;
use taskforge_engine::{ActionEvent, RewardKind, SubjectId};

use super::salary::money_of;
use super::{Scenario, ScenarioCtx, all_objectives};
use crate::harness::Harness;
use crate::util::approx_eq;

/// Random multi-subject load checking money conservation and the level invariant.
pub struct Soak {
    pub subjects: usize,
    pub steps: usize,
}

impl Default for Soak {
    fn default() -> Self {
        Self {
            subjects: 12,
            steps: 3_000,
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    deferred: f64,
    direct: f64,
    actions: usize,
    payout_cycles: usize,
    reloads: usize,
}

#[async_trait::async_trait]
impl Scenario for Soak {
    fn name(&self) -> &'static str {
        "soak"
    }

    fn description(&self) -> &'static str {
        "Random multi-subject load; money is conserved and levels match experience"
    }

    async fn run(&self, ctx: &ScenarioCtx<'_>) -> Result<()> {
        let h = Harness::build(ctx.assets, ctx.seed)?;
        h.engine.start().await?;
        let mut rng = ChaCha20Rng::seed_from_u64(ctx.seed);
        let objectives = all_objectives(h.engine.catalog());
        ensure!(!objectives.is_empty(), "catalog has no objectives");

        let roles = h.engine.catalog().ids();
        let max_roles = h.engine.config().settings.max_roles;
        let subjects: Vec<SubjectId> = (0..self.subjects).map(Harness::subject).collect();
        for subject in &subjects {
            let wanted = rng.gen_range(1..=max_roles.min(roles.len()));
            for role in roles.choose_multiple(&mut rng, wanted) {
                h.engine.on_role_join(subject, role)?;
            }
            h.sessions.set_online(subject, rng.gen_bool(0.5));
        }

        let mut loaded = vec![true; subjects.len()];
        let mut tally = Tally::default();
        for _ in 0..self.steps {
            let index = rng.gen_range(0..subjects.len());
            let subject = &subjects[index];
            match rng.gen_range(0..100) {
                0..=84 => {
                    let Some(objective) = objectives.choose(&mut rng) else {
                        continue;
                    };
                    h.clock.advance(rng.gen_range(0..50));
                    let outcome = h.engine.on_action(&ActionEvent::new(
                        subject.as_str(),
                        objective.action,
                        objective.target.id(),
                    ));
                    let (deferred, direct) = money_of(&outcome);
                    tally.deferred += deferred;
                    tally.direct += direct;
                    tally.actions += 1;
                }
                85..=89 => h.sessions.set_online(subject, rng.gen_bool(0.5)),
                90..=93 => {
                    h.engine.run_payout_cycle();
                    tally.payout_cycles += 1;
                }
                94..=95 => {
                    if let Err(err) = h.engine.force_payout(subject) {
                        log::debug!("forced payout for {subject} refused: {err}");
                    }
                }
                96..=97 => {
                    if loaded[index] {
                        h.engine.on_subject_quit(subject);
                    } else {
                        h.engine.on_subject_join(subject).await?;
                        tally.reloads += 1;
                    }
                    loaded[index] = !loaded[index];
                }
                _ => {
                    let kind = if rng.gen_bool(0.5) {
                        RewardKind::Experience
                    } else {
                        RewardKind::Money
                    };
                    h.engine
                        .boosters()
                        .set_personal(subject, kind, rng.gen_range(1.0..3.0))?;
                }
            }
        }

        for (subject, was_loaded) in subjects.iter().zip(&loaded) {
            h.sessions.set_online(subject, true);
            if !was_loaded {
                h.engine.on_subject_join(subject).await?;
            }
        }
        h.engine.run_payout_cycle();

        let totals = h.engine.salary().totals();
        ensure!(
            approx_eq(totals.credited, tally.deferred),
            "salary credited {} but dispatch deferred {}",
            totals.credited,
            tally.deferred
        );
        ensure!(
            approx_eq(totals.paid, tally.deferred),
            "salary paid {} of {}",
            totals.paid,
            tally.deferred
        );
        ensure!(
            h.engine.salary().total_pending().abs() < 1e-6,
            "{} still pending after the final payout",
            h.engine.salary().total_pending()
        );
        ensure!(
            approx_eq(h.ledger.total_deposited(), totals.paid + tally.direct),
            "ledger received {}, expected {} salary + {} direct",
            h.ledger.total_deposited(),
            totals.paid,
            tally.direct
        );

        let curve = *h.engine.progress().curve();
        for progress in h.engine.progress().snapshot() {
            ensure!(
                progress.level == curve.level_from_experience(progress.experience),
                "{} {}: level {} for {} exp",
                progress.subject,
                progress.role,
                progress.level,
                progress.experience
            );
            ensure!(
                (1..=curve.max_level()).contains(&progress.level),
                "level {} out of range",
                progress.level
            );
        }
        for subject in &subjects {
            ensure!(
                h.engine.roles_of(subject).len() <= max_roles,
                "{subject} holds more than {max_roles} roles"
            );
        }
        for role in &roles {
            let board = h.engine.leaderboard(role, usize::MAX);
            let ordered = board.windows(2).all(|pair| {
                pair[0].level > pair[1].level
                    || (pair[0].level == pair[1].level
                        && pair[0].experience >= pair[1].experience)
            });
            ensure!(ordered, "{role} leaderboard is out of order");
        }

        h.engine.shutdown(Duration::from_secs(5)).await?;
        for progress in h.engine.progress().snapshot() {
            let stored = h.store.progress(&progress.subject, &progress.role);
            ensure!(
                stored.is_some_and(|stored| stored.level == progress.level),
                "{} {} not persisted at level {}",
                progress.subject,
                progress.role,
                progress.level
            );
        }

        if ctx.verbose {
            println!(
                "  ↳ {} actions, {} payout cycles, {} reloads, {:.2} deferred, {:.2} direct",
                tally.actions, tally.payout_cycles, tally.reloads, tally.deferred, tally.direct
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
    async fn short_soak_conserves_money() {
        let assets = TesterAssets::load(None, None).unwrap();
        let soak = Soak {
            subjects: 5,
            steps: 600,
        };
        for seed in [1_u64, 0xC0FFEE] {
            let ctx = ScenarioCtx {
                assets: &assets,
                seed,
                verbose: false,
            };
            soak.run(&ctx).await.unwrap();
        }
    }

    #[tokio::test]
    async fn soak_holds_when_salaries_are_paid_directly() {
        let mut assets = TesterAssets::load(None, None).unwrap();
        assets.config.salary.enabled = false;
        let soak = Soak {
            subjects: 3,
            steps: 300,
        };
        let ctx = ScenarioCtx {
            assets: &assets,
            seed: 77,
            verbose: false,
        };
        soak.run(&ctx).await.unwrap();
    }
}
