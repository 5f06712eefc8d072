//! Rule maps and the merge/diff algebra every backend applies.

use crate::name::{FeatureName, GroupName};
use crate::value::ValueSet;
use std::collections::BTreeMap;

/// The rules of one feature: group name to the values bound to it.
pub type Rules = BTreeMap<GroupName, ValueSet>;

/// Raw dump of every known feature and its rules.
pub type Breakdown = BTreeMap<FeatureName, Rules>;

/// Per-actor evaluation of every known feature.
pub type ActorBreakdown = BTreeMap<FeatureName, bool>;

/// Union `incoming` into `existing`.
pub fn merge(existing: &mut ValueSet, incoming: &ValueSet) {
    existing.extend(incoming.iter().cloned());
}

/// Remove every value of `outgoing` from `existing`.
pub fn difference(existing: &mut ValueSet, outgoing: &ValueSet) {
    existing.retain(|value| !outgoing.contains(value));
}

/// Apply an enable to a rule map.
pub fn apply_enable(rules: &mut Rules, group: &GroupName, values: &ValueSet) {
    merge(rules.entry(group.clone()).or_default(), values);
}

/// Apply a disable to a rule map.
///
/// An empty `values` drops the group entry; otherwise only the listed values
/// are removed and the entry is kept even when it ends up empty. Returns
/// whether the rule map changed.
pub fn apply_disable(rules: &mut Rules, group: &GroupName, values: &ValueSet) -> bool {
    if values.is_empty() {
        return rules.remove(group).is_some();
    }

    match rules.get_mut(group) {
        Some(existing) => {
            let before = existing.len();
            difference(existing, values);
            existing.len() != before
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::value_set;

    fn group(name: &str) -> GroupName {
        GroupName::new(name).unwrap()
    }

    #[test]
    fn test_enable_merges() {
        let mut rules = Rules::new();
        apply_enable(&mut rules, &group("ids"), &value_set([3, 1]));
        apply_enable(&mut rules, &group("ids"), &value_set([2, 3]));
        assert_eq!(rules[&group("ids")], value_set([1, 2, 3]));
    }

    #[test]
    fn test_enable_without_values_creates_entry() {
        let mut rules = Rules::new();
        apply_enable(&mut rules, &group("staff"), &ValueSet::new());
        assert!(rules[&group("staff")].is_empty());
    }

    #[test]
    fn test_disable_with_values_keeps_entry() {
        let mut rules = Rules::new();
        apply_enable(&mut rules, &group("ids"), &value_set([1, 2]));
        assert!(apply_disable(&mut rules, &group("ids"), &value_set([1, 2])));
        assert!(rules.contains_key("ids"));
        assert!(rules[&group("ids")].is_empty());
    }

    #[test]
    fn test_disable_without_values_drops_entry() {
        let mut rules = Rules::new();
        apply_enable(&mut rules, &group("ids"), &value_set([1]));
        assert!(apply_disable(&mut rules, &group("ids"), &ValueSet::new()));
        assert!(rules.is_empty());
    }

    #[test]
    fn test_disable_missing_group_is_noop() {
        let mut rules = Rules::new();
        assert!(!apply_disable(&mut rules, &group("ids"), &value_set([1])));
        assert!(rules.is_empty());
    }
}
