//! Backup and restore of the raw breakdown as a JSON document.
//!
//! The document maps feature → group → values:
//!
//! ```json
//! { "search": { "staff": [], "ids": [1, 2] } }
//! ```

use crate::error::{BackupError, Result};
use crate::rules::Breakdown;
use crate::store::RuleStore;
use futures::future::try_join_all;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

/// Serialize a breakdown into the backup document.
pub fn to_json(breakdown: &Breakdown) -> Result<String> {
    Ok(serde_json::to_string_pretty(breakdown).map_err(BackupError::from)?)
}

/// Parse a backup document. Feature names are normalized while parsing.
pub fn from_json(document: &str) -> std::result::Result<Breakdown, BackupError> {
    Ok(serde_json::from_str(document)?)
}

/// Re-apply every rule of `breakdown` through `enable`.
///
/// Existing data is not cleared first. Features without rules are re-created
/// with `add`. Features are restored concurrently, the groups of one feature
/// in order. Returns the number of features touched.
pub async fn restore(store: &dyn RuleStore, breakdown: &Breakdown) -> Result<usize> {
    let restores = breakdown.iter().map(|(feature, rules)| async move {
        if rules.is_empty() {
            return store.add(feature).await;
        }
        for (group, values) in rules {
            store.enable(feature, group, values).await?;
        }
        Ok(())
    });

    try_join_all(restores).await?;
    Ok(breakdown.len())
}

/// Write the store's breakdown to `path`.
pub async fn dump(store: &dyn RuleStore, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let breakdown = store.breakdown().await?;
    let document = to_json(&breakdown)?;

    tokio::fs::write(path, document)
        .await
        .map_err(BackupError::from)?;

    info!(path = %path.display(), features = breakdown.len(), "Dumped feature rules");
    Ok(breakdown.len())
}

/// Load a backup file from `path` into the store.
pub async fn load(store: &dyn RuleStore, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let document = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => BackupError::NotFound(path.to_path_buf()),
            _ => BackupError::Io(e),
        })?;

    let breakdown = from_json(&document)?;
    debug!(path = %path.display(), features = breakdown.len(), "Parsed backup");

    let loaded = restore(store, &breakdown).await?;
    info!(path = %path.display(), features = loaded, "Loaded feature rules");
    Ok(loaded)
}
