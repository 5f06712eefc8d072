//! End-to-end flows through the public API on the in-process backend.

use std::sync::Arc;
use tokio::task::JoinSet;
use turnstile::prelude::*;
use turnstile::{BackupError, predicates};

#[derive(Debug)]
struct User {
    id: i64,
    email: String,
    staff: bool,
}

impl User {
    fn new(id: i64, staff: bool) -> Self {
        Self {
            id,
            email: format!("user{}@example.com", id),
            staff,
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn flags() -> Turnstile<User> {
    init_tracing();
    let store = turnstile::connect(BackendConfig::Memory).await.unwrap();
    let flags = Turnstile::new(store);
    flags.register("staff", |user: &User, _| user.staff).unwrap();
    flags
        .register("ids", predicates::member_of(|user: &User| user.id))
        .unwrap();
    flags
        .register("emails", predicates::member_of(|user: &User| user.email.clone()))
        .unwrap();
    flags
        .register("percentage", predicates::percentage(|user: &User| user.id.to_string()))
        .unwrap();
    flags
}

#[tokio::test]
async fn test_staff_rollout() {
    let flags = flags().await;
    let alice = User::new(1, true);
    let bob = User::new(2, false);

    flags.enable("new-dashboard", "staff").await.unwrap();
    assert!(flags.is_enabled("new-dashboard", &alice).await.unwrap());
    assert!(!flags.is_enabled("new-dashboard", &bob).await.unwrap());

    // Any matching group enables the feature.
    flags.enable_with("new-dashboard", "ids", [2]).await.unwrap();
    assert!(flags.is_enabled("new-dashboard", &bob).await.unwrap());

    flags.disable("new-dashboard", "staff").await.unwrap();
    assert!(!flags.is_enabled("new-dashboard", &alice).await.unwrap());
    assert!(flags.is_enabled("new-dashboard", &bob).await.unwrap());
}

#[tokio::test]
async fn test_unregistered_group_is_inert() {
    let flags = flags().await;
    flags.enable("search", "beta-testers").await.unwrap();

    assert!(flags.exists_in_group("search", "beta-testers").await.unwrap());
    assert!(!flags.is_enabled("search", &User::new(1, true)).await.unwrap());
}

#[tokio::test]
async fn test_email_allow_list() {
    let flags = flags().await;
    flags
        .enable_with("export", "emails", ["user3@example.com", "user4@example.com"])
        .await
        .unwrap();
    flags
        .disable_with("export", "emails", ["user4@example.com"])
        .await
        .unwrap();

    assert!(flags.is_enabled("export", &User::new(3, false)).await.unwrap());
    assert!(!flags.is_enabled("export", &User::new(4, false)).await.unwrap());
}

#[tokio::test]
async fn test_percentage_rollout_is_monotonic() {
    let flags = flags().await;
    let users: Vec<User> = (0..200).map(|id| User::new(id, false)).collect();

    flags.enable_with("checkout", "percentage", [10]).await.unwrap();
    let mut at_ten = Vec::new();
    for user in &users {
        at_ten.push(flags.is_enabled("checkout", user).await.unwrap());
    }

    // Raising the percentage only adds actors.
    flags.enable_with("checkout", "percentage", [60]).await.unwrap();
    for (user, was_enabled) in users.iter().zip(at_ten) {
        if was_enabled {
            assert!(flags.is_enabled("checkout", user).await.unwrap(), "{user:?}");
        }
    }
}

#[tokio::test]
async fn test_rename_clobbers_destination() {
    let flags = flags().await;
    flags.enable_with("old-search", "ids", [1]).await.unwrap();
    flags.enable("search", "staff").await.unwrap();

    flags.rename("old-search", "search").await.unwrap();

    assert!(!flags.exists("old-search").await.unwrap());
    assert!(flags.is_enabled("search", &User::new(1, false)).await.unwrap());
    assert!(!flags.is_enabled("search", &User::new(2, true)).await.unwrap());
}

#[tokio::test]
async fn test_feature_listing() {
    let flags = flags().await;
    flags.add("zeta").await.unwrap();
    flags.enable("alpha", "staff").await.unwrap();
    flags.enable_with("beta", "ids", [1]).await.unwrap();

    let names: Vec<String> = flags
        .features()
        .await
        .unwrap()
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(names, vec!["alpha", "beta", "zeta"]);

    let staff: Vec<String> = flags
        .features_in_group("staff")
        .await
        .unwrap()
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(staff, vec!["alpha"]);
}

#[tokio::test]
async fn test_backup_file_round_trip() {
    let source = flags().await;
    source.enable_with("search", "ids", [1, 2, 3]).await.unwrap();
    source.enable("search", "staff").await.unwrap();
    source.enable_with("export", "emails", ["a@example.com"]).await.unwrap();
    source.add("parked").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("features.json");
    assert_eq!(source.dump(&path).await.unwrap(), 3);

    let target = flags().await;
    target.enable_with("search", "ids", [9]).await.unwrap();
    assert_eq!(target.load(&path).await.unwrap(), 3);

    // Loading merges into existing rules rather than replacing them.
    let breakdown = target.breakdown().await.unwrap();
    let search = &breakdown[&FeatureName::new("search").unwrap()];
    assert_eq!(search["ids"], value_set([1, 2, 3, 9]));
    assert!(search["staff"].is_empty());
    assert!(breakdown[&FeatureName::new("parked").unwrap()].is_empty());
}

#[tokio::test]
async fn test_backup_errors() {
    let flags = flags().await;
    let dir = tempfile::tempdir().unwrap();

    let missing = flags.load(dir.path().join("missing.json")).await;
    assert!(matches!(
        missing,
        Err(Error::Backup(BackupError::NotFound(_)))
    ));

    let garbage = dir.path().join("garbage.json");
    tokio::fs::write(&garbage, "{ not json").await.unwrap();
    assert!(matches!(
        flags.load(&garbage).await,
        Err(Error::Backup(BackupError::Malformed(_)))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enables_from_many_handles() {
    let flags = flags().await;

    let mut tasks = JoinSet::new();
    for id in 0..64_i64 {
        let flags = flags.clone();
        tasks.spawn(async move { flags.enable_with("beta", "ids", [id]).await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    for id in [0, 31, 63] {
        assert!(flags.is_enabled("beta", &User::new(id, false)).await.unwrap());
    }
    let breakdown = flags.breakdown().await.unwrap();
    assert_eq!(
        breakdown[&FeatureName::new("beta").unwrap()]["ids"],
        value_set(0..64_i64)
    );
}

#[tokio::test]
async fn test_breakdown_for_actor() {
    let flags = flags().await;
    flags.enable("search", "staff").await.unwrap();
    flags.enable_with("export", "ids", [5]).await.unwrap();

    let breakdown = flags.breakdown_for(&User::new(5, false)).await.unwrap();
    assert_eq!(breakdown[&FeatureName::new("export").unwrap()], true);
    assert_eq!(breakdown[&FeatureName::new("search").unwrap()], false);
}

#[tokio::test]
async fn test_shared_registry() {
    init_tracing();
    let registry = Arc::new(GroupRegistry::new());
    registry.register("staff", |user: &User, _| user.staff).unwrap();

    let first = Turnstile::with_registry(Arc::new(MemoryStore::new()), Arc::clone(&registry));
    let second = Turnstile::with_registry(Arc::new(MemoryStore::new()), registry);
    first.enable("a", "staff").await.unwrap();
    second.enable("b", "staff").await.unwrap();

    let staff = User::new(1, true);
    assert!(first.is_enabled("a", &staff).await.unwrap());
    assert!(second.is_enabled("b", &staff).await.unwrap());
    assert!(!second.is_enabled("a", &staff).await.unwrap());
}
