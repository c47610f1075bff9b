use anyhow::{Context, Result, ensure};
use std::time::Duration;
use taskforge_engine::{ActionEvent, RoleError, RoleId};

use super::{Scenario, ScenarioCtx};
use crate::harness::Harness;

/// Joins as many roles as allowed, fires every objective once, then quits.
pub struct Smoke;

#[async_trait::async_trait]
impl Scenario for Smoke {
    fn name(&self) -> &'static str {
        "smoke"
    }

    fn description(&self) -> &'static str {
        "Join roles, perform every objective once, quit and persist"
    }

    async fn run(&self, ctx: &ScenarioCtx<'_>) -> Result<()> {
        let h = Harness::build(ctx.assets, ctx.seed)?;
        h.engine.start().await?;

        let subject = Harness::subject(0);
        let max_roles = h.engine.config().settings.max_roles;
        let all_roles = h.engine.catalog().ids();
        let roles: Vec<RoleId> = all_roles.iter().take(max_roles).cloned().collect();
        for role in &roles {
            h.engine.on_role_join(&subject, role)?;
        }
        ensure!(
            h.engine.roles_of(&subject).len() == roles.len(),
            "expected {} memberships",
            roles.len()
        );
        if let Some(extra) = all_roles.get(max_roles) {
            let refused = h.engine.on_role_join(&subject, extra);
            ensure!(
                matches!(refused, Err(RoleError::RoleLimitReached { .. })),
                "joining past the role limit returned {refused:?}"
            );
        }

        let mut rewarded = 0_usize;
        for role in &roles {
            let definition = h
                .engine
                .catalog()
                .get(role)
                .with_context(|| format!("role {role} vanished from the catalog"))?;
            for (action, target, _) in definition.objectives_sorted() {
                let outcome = h
                    .engine
                    .on_action(&ActionEvent::new(subject.as_str(), action, target.id()));
                ensure!(
                    !outcome.unresolved_target,
                    "{action} {target} did not resolve"
                );
                rewarded += outcome.rewards.len();
            }
        }
        if ctx.verbose {
            println!("  ↳ {rewarded} rewards across {} roles", roles.len());
        }

        let curve = h.engine.progress().curve();
        for role in &roles {
            let progress = h
                .engine
                .get_progress(&subject, role)
                .with_context(|| format!("no progress for {role}"))?;
            ensure!(
                progress.level == curve.level_from_experience(progress.experience),
                "{role}: level {} does not match {} exp",
                progress.level,
                progress.experience
            );
        }

        h.engine.on_subject_quit(&subject);
        ensure!(
            h.engine.roles_of(&subject).is_empty(),
            "subject still loaded after quitting"
        );
        h.engine.shutdown(Duration::from_secs(5)).await?;
        for role in &roles {
            ensure!(
                h.store.progress(&subject, role).is_some(),
                "{role} progress was not persisted"
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
    async fn smoke_passes_on_the_bundled_catalog() {
        let assets = TesterAssets::load(None, None).unwrap();
        let ctx = ScenarioCtx {
            assets: &assets,
            seed: 1337,
            verbose: false,
        };
        Smoke.run(&ctx).await.unwrap();
    }
}
