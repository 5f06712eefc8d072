//! Validated feature and group names.
//!
//! Backends only ever see these types, so a malformed name is rejected at the
//! call boundary and never reaches storage.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// A normalized (trimmed, lower-cased) feature name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeatureName(String);

impl FeatureName {
    /// Normalize and validate a feature name.
    ///
    /// # Examples
    ///
    /// ```
    /// use turnstile_core::FeatureName;
    ///
    /// let name = FeatureName::new("  New-Search ").unwrap();
    /// assert_eq!(name.as_str(), "new-search");
    /// assert!(FeatureName::new("   ").is_err());
    /// ```
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let raw = name.as_ref();
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(Error::InvalidFeatureName(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// A trimmed group name. Case is preserved since it must match the name the
/// application registered its predicate under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupName(String);

impl GroupName {
    /// Validate a group name.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let raw = name.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidGroupName(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

macro_rules! impl_name_traits {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(value: &str) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

impl_name_traits!(FeatureName);
impl_name_traits!(GroupName);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_name_normalization() {
        let name = FeatureName::new("\tSearch\n").unwrap();
        assert_eq!(name.as_str(), "search");
        assert_eq!(name, FeatureName::new("SEARCH").unwrap());
    }

    #[test]
    fn test_empty_names_rejected() {
        assert!(matches!(
            FeatureName::new(""),
            Err(Error::InvalidFeatureName(_))
        ));
        assert!(matches!(
            GroupName::new("  "),
            Err(Error::InvalidGroupName(_))
        ));
    }

    #[test]
    fn test_group_name_keeps_case() {
        let group = GroupName::new(" Staff ").unwrap();
        assert_eq!(group.as_str(), "Staff");
    }

    #[test]
    fn test_deserialize_normalizes() {
        let name: FeatureName = serde_json::from_str("\" Beta \"").unwrap();
        assert_eq!(name.as_str(), "beta");
        assert!(serde_json::from_str::<FeatureName>("\"\"").is_err());
    }
}
