//! Ready-made group predicates.
//!
//! # Percentage rollout
//!
//! ```
//! use std::sync::Arc;
//! use turnstile_core::{MemoryStore, Turnstile, predicates};
//!
//! struct User { id: u64 }
//!
//! # #[tokio::main]
//! # async fn main() -> turnstile_core::Result<()> {
//! let flags = Turnstile::new(Arc::new(MemoryStore::new()));
//! flags.register("percentage", predicates::percentage(|user: &User| user.id.to_string()))?;
//!
//! // Roll out to 25% of users
//! flags.enable_with("new-algorithm", "percentage", [25]).await?;
//! # Ok(())
//! # }
//! ```

use crate::value::{RuleValue, ValueSet};
use sha2::{Digest, Sha256};

/// Map an identifier to a stable bucket in `0..100`.
pub fn bucket(identifier: &str) -> u8 {
    let digest = Sha256::digest(identifier.as_bytes());
    let prefix = u16::from_be_bytes([digest[0], digest[1]]) as u32;
    ((prefix * 100) >> 16) as u8
}

/// Enabled for actors whose bucket is below the largest integer in the
/// rule's values. Values above 100 are clamped; a rule without integers
/// matches nobody.
pub fn percentage<A, F>(identifier: F) -> impl Fn(&A, &ValueSet) -> bool + Send + Sync + 'static
where
    A: 'static,
    F: Fn(&A) -> String + Send + Sync + 'static,
{
    move |actor: &A, values: &ValueSet| {
        let Some(threshold) = values.iter().filter_map(RuleValue::as_i64).max() else {
            return false;
        };
        i64::from(bucket(&identifier(actor))) < threshold.min(100)
    }
}

/// Enabled for actors whose identifier appears in the rule's values.
pub fn member_of<A, F, K>(identifier: F) -> impl Fn(&A, &ValueSet) -> bool + Send + Sync + 'static
where
    A: 'static,
    F: Fn(&A) -> K + Send + Sync + 'static,
    K: Into<RuleValue>,
{
    move |actor: &A, values: &ValueSet| values.contains(&identifier(actor).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::value_set;

    struct User {
        id: u64,
        email: &'static str,
    }

    #[test]
    fn test_bucket_is_stable_and_bounded() {
        for i in 0..1000 {
            let id = format!("user-{}", i);
            let b = bucket(&id);
            assert!(b < 100);
            assert_eq!(b, bucket(&id));
        }
    }

    #[test]
    fn test_percentage_distribution() {
        let check = percentage(|user: &User| user.id.to_string());
        let values = value_set([50]);

        let enabled = (0..1000)
            .filter(|id| check(&User { id: *id, email: "" }, &values))
            .count();

        // Should be close to 50%
        assert!((400..=600).contains(&enabled), "enabled = {}", enabled);
    }

    #[test]
    fn test_percentage_bounds() {
        let check = percentage(|user: &User| user.id.to_string());
        let user = User { id: 42, email: "" };

        assert!(!check(&user, &value_set([0])));
        assert!(check(&user, &value_set([100])));
        assert!(check(&user, &value_set([250])));
        assert!(!check(&user, &value_set(["fifty"])));
    }

    #[test]
    fn test_member_of() {
        let check = member_of(|user: &User| user.email);
        let values = value_set(["a@example.com", "b@example.com"]);

        assert!(check(&User { id: 1, email: "a@example.com" }, &values));
        assert!(!check(&User { id: 2, email: "c@example.com" }, &values));
    }
}
