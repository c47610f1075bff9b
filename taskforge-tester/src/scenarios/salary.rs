use anyhow::{Result, ensure};
use taskforge_engine::{
    ActionEvent, DispatchOutcome, LevelRewardKind, MoneyDelivery, MoneyRoute, PayoutError,
    SubjectId,
};

use super::{Scenario, ScenarioCtx, find_objective};
use crate::harness::Harness;
use crate::util::approx_eq;

const ACTIONS: usize = 60;

/// Accrues deferred pay while offline and checks it is paid exactly once.
pub struct Salary;

#[async_trait::async_trait]
impl Scenario for Salary {
    fn name(&self) -> &'static str {
        "salary"
    }

    fn description(&self) -> &'static str {
        "Deferred salary accrues offline and pays out exactly once"
    }

    async fn run(&self, ctx: &ScenarioCtx<'_>) -> Result<()> {
        let h = Harness::build(ctx.assets, ctx.seed)?;
        if h.engine.money_route() != MoneyRoute::Deferred {
            log::info!(
                "salary scenario skipped: money route is {:?}",
                h.engine.money_route()
            );
            return Ok(());
        }
        let Some(objective) = find_objective(h.engine.catalog(), |_, _, spec| {
            spec.money.max > 0.0 && spec.chance_percent > 0.0
        }) else {
            log::info!("salary scenario skipped: no objective pays money");
            return Ok(());
        };

        let subject = SubjectId::new("earner");
        h.engine.on_role_join(&subject, &objective.role)?;

        let mut deferred = 0.0;
        let mut direct = 0.0;
        for _ in 0..ACTIONS {
            let outcome = h.engine.on_action(&ActionEvent::new(
                subject.as_str(),
                objective.action,
                objective.target.id(),
            ));
            let (owed, paid) = money_of(&outcome);
            deferred += owed;
            direct += paid;
        }
        ensure!(
            approx_eq(h.engine.get_pending_salary(&subject), deferred),
            "pending {} but {deferred} was deferred",
            h.engine.get_pending_salary(&subject)
        );

        let offline = h.engine.run_payout_cycle();
        ensure!(
            offline.paid.is_empty(),
            "offline subject was paid: {:?}",
            offline.paid
        );
        ensure!(
            approx_eq(h.engine.get_pending_salary(&subject), deferred),
            "offline payout cycle changed the pending balance"
        );
        ensure!(
            approx_eq(h.ledger.balance(&subject), direct),
            "ledger holds {} before payout, expected direct rewards {direct}",
            h.ledger.balance(&subject)
        );

        h.sessions.set_online(&subject, true);
        let online = h.engine.run_payout_cycle();
        if deferred > 0.0 {
            ensure!(
                approx_eq(online.total_paid(), deferred),
                "paid {} of {deferred}",
                online.total_paid()
            );
        }
        ensure!(
            h.engine.get_pending_salary(&subject).abs() < f64::EPSILON,
            "pending balance remains after payout"
        );
        ensure!(
            approx_eq(h.ledger.balance(&subject), deferred + direct),
            "ledger holds {}, expected {}",
            h.ledger.balance(&subject),
            deferred + direct
        );
        ensure!(
            h.engine.force_payout(&subject) == Err(PayoutError::NothingPending(subject.clone())),
            "second payout was not refused"
        );

        let totals = h.engine.salary().totals();
        ensure!(
            approx_eq(totals.credited, totals.paid),
            "credited {} but paid {}",
            totals.credited,
            totals.paid
        );
        if ctx.verbose {
            println!("  ↳ deferred {deferred:.2}, direct {direct:.2}");
        }
        Ok(())
    }
}

/// Money from one dispatch, split into (deferred, deposited directly).
pub fn money_of(outcome: &DispatchOutcome) -> (f64, f64) {
    let mut deferred = 0.0;
    let mut direct = 0.0;
    for reward in &outcome.rewards {
        match reward.money_delivery {
            MoneyDelivery::Deferred => deferred += reward.money,
            MoneyDelivery::Deposited => direct += reward.money,
            _ => {}
        }
        for fired in &reward.fired_rewards {
            if let (LevelRewardKind::Money { amount }, MoneyDelivery::Deposited) =
                (&fired.kind, &fired.delivery)
            {
                direct += amount;
            }
        }
    }
    (deferred, direct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::TesterAssets;

    #[tokio::test]
    async fn salary_passes_on_the_bundled_catalog() {
        let assets = TesterAssets::load(None, None).unwrap();
        let ctx = ScenarioCtx {
            assets: &assets,
            seed: 99,
            verbose: false,
        };
        Salary.run(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn salary_is_skipped_when_paid_directly() {
        let mut assets = TesterAssets::load(None, None).unwrap();
        assets.config.salary.enabled = false;
        let ctx = ScenarioCtx {
            assets: &assets,
            seed: 5,
            verbose: false,
        };
        Salary.run(&ctx).await.unwrap();
    }
}
