use anyhow::Result;
use taskforge_engine::{ActionKind, ObjectiveSpec, RoleCatalog, RoleId, Target};

use crate::harness::TesterAssets;

pub mod anti_exploit;
pub mod debounce;
pub mod leveling;
pub mod salary;
pub mod smoke;
pub mod soak;

/// Per-iteration inputs handed to a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioCtx<'a> {
    pub assets: &'a TesterAssets,
    pub seed: u64,
    pub verbose: bool,
}

#[async_trait::async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Drive a fresh engine and check expectations; any error fails the iteration.
    async fn run(&self, ctx: &ScenarioCtx<'_>) -> Result<()>;
}

#[must_use]
pub fn all_scenarios() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(smoke::Smoke),
        Box::new(leveling::Leveling),
        Box::new(salary::Salary),
        Box::new(anti_exploit::AntiExploit),
        Box::new(debounce::Debounce),
        Box::new(soak::Soak::default()),
    ]
}

#[must_use]
pub fn get_scenario(name: &str) -> Option<Box<dyn Scenario>> {
    all_scenarios()
        .into_iter()
        .find(|scenario| scenario.name().eq_ignore_ascii_case(name.trim()))
}

#[must_use]
pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    all_scenarios()
        .iter()
        .map(|scenario| (scenario.name(), scenario.description()))
        .collect()
}

/// An objective picked out of the catalog.
#[derive(Debug, Clone)]
pub struct ObjectiveRef {
    pub role: RoleId,
    pub action: ActionKind,
    pub target: Target,
    pub spec: ObjectiveSpec,
}

/// First objective, in role then action order, accepted by `filter`.
pub fn find_objective(
    catalog: &RoleCatalog,
    filter: impl Fn(ActionKind, &Target, &ObjectiveSpec) -> bool,
) -> Option<ObjectiveRef> {
    catalog.ids().into_iter().find_map(|role| {
        let definition = catalog.get(&role)?;
        definition
            .objectives_sorted()
            .into_iter()
            .find(|(action, target, spec)| filter(*action, *target, *spec))
            .map(|(action, target, spec)| ObjectiveRef {
                role: role.clone(),
                action,
                target: target.clone(),
                spec: *spec,
            })
    })
}

/// Every objective in the catalog.
pub fn all_objectives(catalog: &RoleCatalog) -> Vec<ObjectiveRef> {
    catalog
        .ids()
        .into_iter()
        .filter_map(|role| catalog.get(&role).map(|definition| (role, definition)))
        .flat_map(|(role, definition)| {
            definition
                .objectives_sorted()
                .into_iter()
                .map(|(action, target, spec)| ObjectiveRef {
                    role: role.clone(),
                    action,
                    target: target.clone(),
                    spec: *spec,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_names_are_unique_and_resolvable() {
        let names: Vec<&str> = list_scenarios().into_iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["smoke", "leveling", "salary", "anti-exploit", "debounce", "soak"]
        );
        for name in names {
            assert!(get_scenario(name).is_some());
        }
        assert!(get_scenario(" SMOKE ").is_some());
        assert!(get_scenario("unknown").is_none());
    }

    #[test]
    fn bundled_catalog_has_deferred_money_objectives() {
        let assets = TesterAssets::load(None, None).unwrap();
        let found = find_objective(&assets.catalog, |_, _, spec| spec.money.min > 0.0);
        assert!(found.is_some());
        assert!(all_objectives(&assets.catalog).len() >= 10);
    }
}
