//! Rule values.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Ordered, deduplicated set of values bound to one group of a feature.
pub type ValueSet = BTreeSet<RuleValue>;

/// A single value stored in a rule.
///
/// Values are usually small integers (percentages) or strings (allow-lists).
/// The type is totally ordered so value sets iterate deterministically;
/// floats are ordered with [`f64::total_cmp`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl RuleValue {
    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::Str(_) => 4,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl Ord for RuleValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for RuleValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RuleValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RuleValue {}

impl Hash for RuleValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(n) => n.hash(state),
            // total_cmp equality is bitwise equality
            Self::Float(f) => f.to_bits().hash(state),
            Self::Str(s) => s.hash(state),
        }
    }
}

impl fmt::Display for RuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{}", n),
            Self::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for RuleValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for RuleValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for RuleValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for RuleValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u8> for RuleValue {
    fn from(value: u8) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for RuleValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for RuleValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for RuleValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Build a [`ValueSet`] from anything convertible into rule values.
///
/// ```
/// use turnstile_core::value_set;
///
/// let set = value_set([3, 1, 3]);
/// assert_eq!(set.len(), 2);
/// ```
pub fn value_set<I, V>(values: I) -> ValueSet
where
    I: IntoIterator<Item = V>,
    V: Into<RuleValue>,
{
    values.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_across_kinds() {
        let mut values = vec![
            RuleValue::from("b"),
            RuleValue::from(2),
            RuleValue::Null,
            RuleValue::from(true),
            RuleValue::from(1.5),
            RuleValue::from("a"),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                RuleValue::Null,
                RuleValue::from(true),
                RuleValue::from(2),
                RuleValue::from(1.5),
                RuleValue::from("a"),
                RuleValue::from("b"),
            ]
        );
    }

    #[test]
    fn test_untagged_json() {
        let values: Vec<RuleValue> = serde_json::from_str(r#"[1, "one", true, null, 2.5]"#).unwrap();
        assert_eq!(
            values,
            vec![
                RuleValue::Int(1),
                RuleValue::Str("one".into()),
                RuleValue::Bool(true),
                RuleValue::Null,
                RuleValue::Float(2.5),
            ]
        );
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"[1,"one",true,null,2.5]"#);
    }

    #[test]
    fn test_value_set_dedupes() {
        let set = value_set(["x", "y", "x"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&RuleValue::from("x")));
    }

    #[test]
    fn test_float_nan_is_self_equal() {
        let nan = RuleValue::Float(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert_ne!(RuleValue::Float(0.0), RuleValue::Float(-0.0));
    }
}
