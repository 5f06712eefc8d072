//! Turnstile Core
//!
//! Runtime feature toggles with pluggable rule storage.
//!
//! Applications register named *groups* (predicates over an actor), bind
//! *features* to groups through *rules*, and ask whether a feature is enabled
//! for a given actor. A feature is enabled when any group bound to it matches.
//!
//! # Features
//!
//! - 🚦 **Runtime toggling** - Enable and disable features without restarts
//! - 🎯 **Group rules** - Each rule carries a value set the predicate can use
//! - 🎲 **Percentage rollout** - Stable hash bucketing of actors
//! - 🔌 **Pluggable storage** - One [`RuleStore`] contract, several backends
//! - 💾 **Backups** - Dump and load every rule as a JSON document
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use turnstile_core::*;
//!
//! struct User { id: i64, staff: bool }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let flags = Turnstile::new(Arc::new(MemoryStore::new()));
//!
//! flags.register("staff", |user: &User, _| user.staff)?;
//! flags.register("ids", predicates::member_of(|user: &User| user.id))?;
//!
//! flags.enable("new-ui", "staff").await?;
//! flags.enable_with("new-ui", "ids", [42]).await?;
//!
//! assert!(flags.is_enabled("new-ui", &User { id: 42, staff: false }).await?);
//! assert!(!flags.is_enabled("new-ui", &User { id: 7, staff: false }).await?);
//! # Ok(())
//! # }
//! ```
//!
//! # Merge semantics
//!
//! Enabling a group that already has values merges the new values in;
//! disabling with values removes only those values. Disabling without values
//! unbinds the group.
//!
//! ```
//! # use std::sync::Arc;
//! # use turnstile_core::*;
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! # let flags: Turnstile<()> = Turnstile::new(Arc::new(MemoryStore::new()));
//! flags.enable_with("beta", "ids", [1, 2]).await?;
//! flags.enable_with("beta", "ids", [2, 3]).await?;
//! flags.disable_with("beta", "ids", [1]).await?;
//!
//! let breakdown = flags.breakdown().await?;
//! let ids = &breakdown[&FeatureName::new("beta")?]["ids"];
//! assert_eq!(ids, &value_set([2, 3]));
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod error;
pub mod evaluator;
pub mod flags;
pub mod memory;
pub mod name;
pub mod predicates;
pub mod registry;
pub mod rules;
pub mod serializer;
pub mod store;
pub mod value;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{BackupError, Error, Result};
pub use flags::Turnstile;
pub use memory::MemoryStore;
pub use name::{FeatureName, GroupName};
pub use registry::{GroupRegistry, Predicate};
pub use rules::{ActorBreakdown, Breakdown, Rules};
pub use serializer::{CborSerializer, JsonSerializer, Serializer, SerializerKind};
pub use store::RuleStore;
pub use value::{RuleValue, ValueSet, value_set};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::flags::Turnstile;
    pub use crate::memory::MemoryStore;
    pub use crate::name::{FeatureName, GroupName};
    pub use crate::registry::GroupRegistry;
    pub use crate::store::RuleStore;
    pub use crate::value::{RuleValue, ValueSet, value_set};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_memory_store_conformance() {
        testing::run_all(Arc::new(MemoryStore::new())).await;
    }
}
