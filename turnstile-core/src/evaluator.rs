//! Rule evaluation.

use crate::registry::GroupRegistry;
use crate::rules::{ActorBreakdown, Breakdown, Rules};

/// Whether any group bound in `rules` matches `actor`.
///
/// Groups missing from the registry are skipped, so a feature whose rules
/// only reference unknown groups is disabled for everyone.
pub fn evaluate<A>(rules: &Rules, actor: &A, registry: &GroupRegistry<A>) -> bool {
    rules
        .iter()
        .any(|(group, values)| registry.matches(group.as_str(), actor, values))
}

/// Evaluate every feature of a raw breakdown for one actor.
pub fn evaluate_all<A>(
    breakdown: &Breakdown,
    actor: &A,
    registry: &GroupRegistry<A>,
) -> ActorBreakdown {
    breakdown
        .iter()
        .map(|(feature, rules)| (feature.clone(), evaluate(rules, actor, registry)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::{FeatureName, GroupName};
    use crate::value::{RuleValue, ValueSet, value_set};

    struct User {
        id: i64,
        staff: bool,
    }

    fn registry() -> GroupRegistry<User> {
        let registry = GroupRegistry::new();
        registry.register("staff", |user: &User, _| user.staff).unwrap();
        registry
            .register("ids", |user: &User, values| {
                values.contains(&RuleValue::Int(user.id))
            })
            .unwrap();
        registry.register("nobody", |_: &User, _| false).unwrap();
        registry
    }

    fn rules(pairs: &[(&str, ValueSet)]) -> Rules {
        pairs
            .iter()
            .map(|(group, values)| (GroupName::new(group).unwrap(), values.clone()))
            .collect()
    }

    #[test]
    fn test_any_group_enables() {
        let registry = registry();
        let rules = rules(&[("nobody", ValueSet::new()), ("ids", value_set([1]))]);

        assert!(evaluate(&rules, &User { id: 1, staff: false }, &registry));
        assert!(!evaluate(&rules, &User { id: 2, staff: false }, &registry));
    }

    #[test]
    fn test_empty_rules_disabled() {
        let registry = registry();
        assert!(!evaluate(&Rules::new(), &User { id: 1, staff: true }, &registry));
    }

    #[test]
    fn test_unknown_group_is_inert() {
        let registry = registry();
        let rules = rules(&[("ghosts", value_set([1]))]);
        assert!(!evaluate(&rules, &User { id: 1, staff: true }, &registry));
    }

    #[test]
    fn test_evaluate_all() {
        let registry = registry();
        let mut breakdown = Breakdown::new();
        breakdown.insert(
            FeatureName::new("search").unwrap(),
            rules(&[("staff", ValueSet::new())]),
        );
        breakdown.insert(FeatureName::new("empty").unwrap(), Rules::new());

        let result = evaluate_all(&breakdown, &User { id: 5, staff: true }, &registry);
        assert_eq!(result[&FeatureName::new("search").unwrap()], true);
        assert_eq!(result[&FeatureName::new("empty").unwrap()], false);
    }
}
