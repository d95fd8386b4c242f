//! End-to-end tests for the profile sync pipeline.

use super::memory::{InMemoryProfileCache, InMemoryUserStore, RecordingNotifier, StaticEnricher};
use super::*;
use crate::errors::FailureKind;
use crate::events::CollectingEventSink;
use crate::pipeline::Invocation;
use crate::testing::{assert_failed_with, assert_succeeded};
use mockall::predicate::eq;
use pretty_assertions::assert_eq;
use std::time::Duration;

/// `missing` has no user, `error` fails, every other id exists.
fn stub_store() -> MockUserStore {
    let mut store = MockUserStore::new();
    store.expect_find_user().returning(|id| match id {
        "missing" => Ok(None),
        "error" => Err(CollaboratorError::Unavailable("DB error".to_string())),
        _ => Ok(Some(User::new(id, format!("{id}@test.com"), "Test User"))),
    });
    store
}

fn stub_enricher() -> MockEnricher {
    let mut enricher = MockEnricher::new();
    enricher
        .expect_enrich()
        .returning(|user| Ok(EnrichedUser::from_user(user)));
    enricher
}

fn unused_cache() -> MockProfileCache {
    let mut cache = MockProfileCache::new();
    cache.expect_set().times(0);
    cache
}

fn unused_notifier() -> MockNotifier {
    let mut notifier = MockNotifier::new();
    notifier.expect_notify().times(0);
    notifier
}

fn unused_enricher() -> MockEnricher {
    let mut enricher = MockEnricher::new();
    enricher.expect_enrich().times(0);
    enricher
}

#[tokio::test]
async fn test_existing_user_completes() {
    let mut cache = MockProfileCache::new();
    cache
        .expect_set()
        .withf(|key, value| key == "user:user-1" && value.enriched)
        .times(1)
        .returning(|_, _| Ok(()));
    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .with(eq("user-1@test.com"), eq("Profile updated"))
        .times(1)
        .returning(|_, _| Ok(()));

    let pipeline = profile_sync_pipeline(
        Arc::new(stub_store()),
        Arc::new(stub_enricher()),
        Arc::new(cache),
        Arc::new(notifier),
    )
    .unwrap();

    let report = pipeline.run("user-1".to_string()).await.unwrap();

    assert_eq!(
        report,
        SyncReport {
            user_id: "user-1".to_string(),
            status: SyncStatus::Complete,
            cached: true,
            notified: true,
        }
    );
    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        serde_json::json!({
            "user_id": "user-1",
            "status": "complete",
            "cached": true,
            "notified": true,
        })
    );
}

#[tokio::test]
async fn test_missing_user_fails_at_lookup() {
    let pipeline = profile_sync_pipeline(
        Arc::new(stub_store()),
        Arc::new(unused_enricher()),
        Arc::new(unused_cache()),
        Arc::new(unused_notifier()),
    )
    .unwrap();

    let outcome = pipeline.run("missing".to_string()).await;

    assert_failed_with(&outcome, FailureKind::NotFound, "lookup");
    assert!(outcome.unwrap_err().message.to_lowercase().contains("not found"));
}

#[tokio::test]
async fn test_db_error_propagates_unchanged() {
    let pipeline = profile_sync_pipeline(
        Arc::new(stub_store()),
        Arc::new(unused_enricher()),
        Arc::new(unused_cache()),
        Arc::new(unused_notifier()),
    )
    .unwrap();

    let outcome = pipeline.run("error".to_string()).await;

    assert_failed_with(&outcome, FailureKind::Upstream, "lookup");
    assert_eq!(outcome.unwrap_err().message, "DB error");
}

#[tokio::test]
async fn test_enrich_failure_skips_cache_and_notify() {
    let mut enricher = MockEnricher::new();
    enricher
        .expect_enrich()
        .times(1)
        .returning(|_| Err(CollaboratorError::Unavailable("enrichment service down".to_string())));

    let pipeline = profile_sync_pipeline(
        Arc::new(stub_store()),
        Arc::new(enricher),
        Arc::new(unused_cache()),
        Arc::new(unused_notifier()),
    )
    .unwrap();

    let outcome = pipeline.run("user-1".to_string()).await;

    assert_failed_with(&outcome, FailureKind::Upstream, "enrich");
    assert_eq!(outcome.unwrap_err().message, "enrichment service down");
}

#[tokio::test]
async fn test_notify_timeout_is_reported_from_notify() {
    let cache = Arc::new(InMemoryProfileCache::new());
    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .returning(|_, _| Err(CollaboratorError::TimedOut("smtp timed out".to_string())));

    let pipeline = profile_sync_pipeline(
        Arc::new(stub_store()),
        Arc::new(StaticEnricher),
        cache.clone(),
        Arc::new(notifier),
    )
    .unwrap();

    let outcome = pipeline.run("user-1".to_string()).await;

    assert_failed_with(&outcome, FailureKind::Timeout, "notify");
    // The cache write is a completed side effect of an earlier stage.
    assert!(cache.get("user:user-1").is_some());
}

#[tokio::test]
async fn test_in_memory_collaborators() {
    let store = InMemoryUserStore::new().with_user(User::new("42", "ada@example.com", "Ada"));
    let cache = Arc::new(InMemoryProfileCache::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let sink = Arc::new(CollectingEventSink::new());

    let config = PipelineConfig::new("profile-sync-demo").with_timeout(Duration::from_secs(5));
    let pipeline = PipelineBuilder::<String, String>::from_config(config)
        .with_event_sink(sink.clone())
        .stage(LookupStage::new(Arc::new(store)))
        .unwrap()
        .stage(EnrichStage::new(Arc::new(StaticEnricher)))
        .unwrap()
        .stage(CacheWriteStage::new(cache.clone()))
        .unwrap()
        .stage(NotifyStage::new(notifier.clone()))
        .unwrap()
        .build();

    assert_eq!(pipeline.stage_names(), vec!["lookup", "enrich", "cache-write", "notify"]);

    let outcome = pipeline.run("42".to_string()).await;
    assert_succeeded(&outcome);

    let cached = cache.get("user:42").unwrap();
    assert_eq!(cached.user.name, "Ada");
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(notifier.sent()[0].email, "ada@example.com");
    assert_eq!(notifier.sent()[0].message, NOTIFICATION_MESSAGE);

    let started: Vec<String> = sink
        .events_of_type("stage.started")
        .iter()
        .filter_map(|e| e.data["kind"].as_str().map(str::to_string))
        .collect();
    assert_eq!(started, vec!["lookup", "enrich", "persist", "notify"]);
}

#[tokio::test]
async fn test_concurrent_syncs_share_one_pipeline() {
    let store = InMemoryUserStore::new();
    for i in 0..20 {
        store.insert(User::new(i.to_string(), format!("{i}@test.com"), format!("User {i}")));
    }
    let cache = Arc::new(InMemoryProfileCache::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let pipeline = profile_sync_pipeline(
        Arc::new(store),
        Arc::new(StaticEnricher),
        cache.clone(),
        notifier.clone(),
    )
    .unwrap();

    let invocations: Vec<_> = (0..25).map(|i| pipeline.run(i.to_string())).collect();
    let outcomes = futures::future::join_all(invocations.into_iter().map(Invocation::wait)).await;

    for (i, outcome) in outcomes.into_iter().enumerate() {
        if i < 20 {
            assert_eq!(outcome.unwrap().user_id, i.to_string());
        } else {
            assert_failed_with(&outcome, FailureKind::NotFound, "lookup");
        }
    }
    assert_eq!(cache.len(), 20);
    assert_eq!(notifier.sent().len(), 20);
}
