/// Optimistic update tests
///
/// Lost-update prevention under racing writers and the partial-update
/// contract of the watch/commit path.
/// Run with: cargo test --test optimistic_update_tests
mod common;

use common::{GatedStore, SlowStore, ann, engine_over};
use personkv::{
    ConflictRetryPolicy, DateOfBirth, EngineConfig, EngineError, InMemoryLockService, Person,
    PersonPatch, RecordStore,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_sentinel_partial_update_scenario() {
    let engine = personkv::in_memory(EngineConfig::default()).unwrap();
    engine.create(ann()).await.unwrap();

    let partial: PersonPatch = serde_json::from_str(
        r#"{"id":"u1","name":"","address":"2 Oak Ave","dateOfBirth":"01/01/0001"}"#,
    )
    .unwrap();
    let updated = engine.update_optimistic(partial).await.unwrap();

    let expected = Person::new(
        "u1",
        "Ann",
        "2 Oak Ave",
        Some(DateOfBirth::from_ymd(1990, 5, 1).unwrap()),
    );
    assert_eq!(updated, expected);
    assert_eq!(engine.get("u1").await.unwrap(), expected);
}

#[tokio::test]
async fn test_missing_record_reports_not_found() {
    let engine = personkv::in_memory(EngineConfig::default()).unwrap();

    let err = engine
        .update_optimistic(PersonPatch::new("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_racing_updates_one_commits_one_conflicts() {
    let store = Arc::new(GatedStore::new(2));
    let engine = engine_over(
        store.clone(),
        Arc::new(InMemoryLockService::new()),
        EngineConfig::default(),
    );
    // seed outside the gate
    store
        .inner
        .set("u1", ann().to_bytes().unwrap(), None)
        .await
        .unwrap();

    let left = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .update_optimistic(PersonPatch::new("u1").name("Left"))
                .await
        })
    };
    let right = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .update_optimistic(PersonPatch::new("u1").address("Right St"))
                .await
        })
    };

    let outcomes = [left.await.unwrap(), right.await.unwrap()];
    let committed: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(EngineError::Conflict(_))))
        .count();

    assert_eq!(committed.len(), 1, "outcomes: {outcomes:?}");
    assert_eq!(conflicts, 1, "outcomes: {outcomes:?}");

    // the winner's write is what the store holds
    let stored = Person::from_bytes(&store.inner.get("u1").await.unwrap().unwrap()).unwrap();
    assert_eq!(&stored, committed[0]);

    // the loser re-issues against the new state and succeeds
    let loser_patch = if committed[0].name == "Left" {
        PersonPatch::new("u1").address("Right St")
    } else {
        PersonPatch::new("u1").name("Left")
    };
    let retried = engine.update_optimistic(loser_patch).await.unwrap();
    assert_eq!(retried.name, "Left");
    assert_eq!(retried.address, "Right St");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_retry_helper_applies_every_writer() {
    let engine = personkv::in_memory(EngineConfig::default()).unwrap();
    engine.create(ann()).await.unwrap();

    let policy = ConflictRetryPolicy {
        max_attempts: 200,
        base_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(10),
    };

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        let policy = policy.clone();
        handles.push(tokio::spawn(async move {
            engine
                .update_optimistic_with_retry(
                    PersonPatch::new("u1").name(format!("writer-{i}")),
                    &policy,
                )
                .await
        }));
    }

    let results = futures::future::join_all(handles).await;
    for result in results {
        result.unwrap().unwrap();
    }

    let stored = engine.get("u1").await.unwrap();
    assert!(stored.name.starts_with("writer-"));
    assert_eq!(stored.address, "1 Main St");
}

#[tokio::test]
async fn test_slow_store_surfaces_timeout() {
    let store = Arc::new(SlowStore::new());
    let engine = engine_over(
        store.clone(),
        Arc::new(InMemoryLockService::new()),
        EngineConfig::default()
            .store_op_timeout(Duration::from_millis(20))
            .lock_lease(Duration::from_secs(1)),
    );
    engine.create(ann()).await.unwrap();
    store.slow_down(Duration::from_millis(200));

    let err = engine
        .update_optimistic(PersonPatch::new("u1").name("Late"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Timeout(_)));
    assert!(err.is_retryable());
    assert_eq!(store.inner.get("u1").await.unwrap(), Some(ann().to_bytes().unwrap()));
}

#[tokio::test]
async fn test_slow_commit_surfaces_timeout() {
    let store = Arc::new(SlowStore::new());
    let engine = engine_over(
        store.clone(),
        Arc::new(InMemoryLockService::new()),
        EngineConfig::default()
            .store_op_timeout(Duration::from_millis(20))
            .lock_lease(Duration::from_secs(1)),
    );
    engine.create(ann()).await.unwrap();
    store.slow_commits(Duration::from_millis(200));

    let err = engine
        .update_optimistic(PersonPatch::new("u1").name("Late"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Timeout(ref message) if message.contains("commit")), "{err:?}");
    assert!(err.is_retryable());
    // the abandoned commit never reached the store
    assert_eq!(store.inner.get("u1").await.unwrap(), Some(ann().to_bytes().unwrap()));
}
