use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use common_errors::RequestError;
use query_cache::{
    CacheEventKind, CancellationToken, KeyParams, MutationCoordinator,
    MutationPlan, QueryCache, QueryCacheConfig, QueryFn, QueryKey,
    QueryObserver, QueryResult, QueryStatus, QueryView, ReadPolicy,
    RefetchType, query_fn,
};
use serde_json::{Value, json};
use tokio::sync::Semaphore;

fn events_key() -> QueryKey { QueryKey::new("events") }

fn detail_key(id: &str) -> QueryKey { QueryKey::new("events").tag(id) }

fn counting_fn(calls: Arc<AtomicUsize>, value: Value) -> QueryFn {
    query_fn(move |_cancel| {
        let calls = calls.clone();
        let value = value.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, RequestError>(value)
        }
    })
}

fn gated_fn(
    calls: Arc<AtomicUsize>, gate: Arc<Semaphore>,
    outcome: Result<Value, RequestError>,
) -> QueryFn {
    query_fn(move |_cancel| {
        let calls = calls.clone();
        let gate = gate.clone();
        let outcome = outcome.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let _permit = gate
                .acquire()
                .await
                .map_err(|err| RequestError::Transport(err.to_string()))?;
            outcome
        }
    })
}

/// Answers `["v1"]`, `["v2"]`, ... in call order once the gate lets it
/// through.
fn versioned_fn(calls: Arc<AtomicUsize>, gate: Arc<Semaphore>) -> QueryFn {
    query_fn(move |_cancel| {
        let calls = calls.clone();
        let gate = gate.clone();
        async move {
            let version = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let _permit = gate
                .acquire()
                .await
                .map_err(|err| RequestError::Transport(err.to_string()))?;
            Ok::<_, RequestError>(json!([format!("v{}", version)]))
        }
    })
}

async fn wait_for_fetch(cache: &QueryCache) {
    while cache.fetching_count() == 0 {
        tokio::task::yield_now().await;
    }
}

async fn wait_for_settle(observer: &QueryObserver) {
    while let Some(event) = observer.changed().await {
        if event.kind == CacheEventKind::FetchSettled {
            return;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_reads_share_one_request() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fn(calls.clone(), json!([{"id": "1"}]));
    let policy = ReadPolicy::default();
    let key = events_key();

    let (first, second) = tokio::join!(
        cache.read(&key, &policy, fetch.clone(), None),
        cache.read(&key, &policy, fetch.clone(), None),
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.status, QueryStatus::Success);
    assert_eq!(first.value, second.value);
    assert_eq!(cache.fetching_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_first_read_reports_loading_then_success() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let fetch = gated_fn(calls.clone(), gate.clone(), Ok(json!(["a"])));
    let key = events_key();

    let reader = {
        let cache = cache.clone();
        let key = key.clone();
        tokio::spawn(async move {
            cache.read(&key, &ReadPolicy::default(), fetch, None).await
        })
    };
    wait_for_fetch(&cache).await;

    let loading = cache.peek(&key).unwrap();
    assert_eq!(loading.status, QueryStatus::Loading);
    assert!(loading.is_fetching);
    assert!(loading.value.is_none());

    gate.add_permits(1);
    let entry = reader.await.unwrap().unwrap();
    assert_eq!(entry.status, QueryStatus::Success);
    assert_eq!(entry.value, Some(json!(["a"])));
    assert!(!entry.is_fetching);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_entry_is_served_without_refetch() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fn(calls.clone(), json!({"id": "1"}));
    let policy = ReadPolicy::default().stale_time(Duration::from_secs(10));
    let key = detail_key("1");

    cache.read(&key, &policy, fetch.clone(), None).await.unwrap();
    let again = cache.read(&key, &policy, fetch.clone(), None).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(again.value, Some(json!({"id": "1"})));
    assert!(!again.is_fetching);
}

#[tokio::test(start_paused = true)]
async fn test_stale_entry_served_while_revalidating() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fn(calls.clone(), json!(["fresh"]));
    let policy = ReadPolicy::default().stale_time(Duration::from_secs(10));
    let key = events_key();
    cache.write(&key, json!(["old"]));
    let observer = cache.observe(&key);

    tokio::time::advance(Duration::from_secs(11)).await;
    let stale = cache.read(&key, &policy, fetch.clone(), None).await.unwrap();

    assert_eq!(stale.value, Some(json!(["old"])));
    assert!(stale.is_fetching);
    assert_eq!(stale.status, QueryStatus::Success);

    wait_for_settle(&observer).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.peek(&key).unwrap().value, Some(json!(["fresh"])));
}

#[tokio::test(start_paused = true)]
async fn test_stale_entry_not_refetched_when_refetch_disabled() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fn(calls.clone(), json!(["fresh"]));
    let policy = ReadPolicy::default().refetch_on_observe(false);
    let key = events_key();
    cache.write(&key, json!(["old"]));
    cache.invalidate(&key, RefetchType::None);

    let entry = cache.read(&key, &policy, fetch, None).await.unwrap();

    assert_eq!(entry.value, Some(json!(["old"])));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(cache.fetching_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_read_is_idle_and_never_fetches() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fn(calls.clone(), json!([]));
    let key = events_key().params(KeyParams::new().with::<&str>("search", None));

    let entry = cache
        .read(&key, &ReadPolicy::default().enabled(false), fetch, None)
        .await
        .unwrap();

    assert_eq!(entry.status, QueryStatus::Idle);
    assert!(!entry.is_fetching);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_first_fetch_propagates_error() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(1));
    let failure = RequestError::request_failed(500, Some("boom".to_string()));
    let fetch = gated_fn(calls, gate, Err(failure.clone()));
    let key = events_key();

    let err = cache
        .read(&key, &ReadPolicy::default(), fetch, None)
        .await
        .unwrap_err();

    assert_eq!(err, failure);
    let entry = cache.peek(&key).unwrap();
    assert_eq!(entry.status, QueryStatus::Error);
    assert_eq!(entry.error, Some(failure));
    assert!(entry.value.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_restores_previous_status() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let fetch = gated_fn(calls, gate, Ok(json!([])));
    let key = events_key();

    let reader = {
        let cache = cache.clone();
        let key = key.clone();
        tokio::spawn(async move {
            cache.read(&key, &ReadPolicy::default(), fetch, None).await
        })
    };
    wait_for_fetch(&cache).await;

    cache.cancel(&key).await;

    let result = reader.await.unwrap();
    assert!(matches!(result, Err(RequestError::Cancelled)));
    let entry = cache.peek(&key).unwrap();
    assert_eq!(entry.status, QueryStatus::Idle);
    assert!(!entry.is_fetching);
    assert_eq!(cache.fetching_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_caller_cancellation_only_affects_that_caller() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let fetch = gated_fn(calls.clone(), gate.clone(), Ok(json!(["x"])));
    let key = events_key();
    let token = CancellationToken::new();

    let impatient = {
        let (cache, key, fetch, token) =
            (cache.clone(), key.clone(), fetch.clone(), token.clone());
        tokio::spawn(async move {
            cache
                .read(&key, &ReadPolicy::default(), fetch, Some(&token))
                .await
        })
    };
    wait_for_fetch(&cache).await;
    let patient = {
        let (cache, key) = (cache.clone(), key.clone());
        tokio::spawn(async move {
            cache.read(&key, &ReadPolicy::default(), fetch, None).await
        })
    };
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    token.cancel();
    let cancelled = impatient.await.unwrap();
    assert!(matches!(cancelled, Err(RequestError::Cancelled)));

    gate.add_permits(1);
    let entry = patient.await.unwrap().unwrap();
    assert_eq!(entry.value, Some(json!(["x"])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_marks_prefix_and_leaves_other_namespaces() {
    let cache = QueryCache::default();
    let list = events_key().params(KeyParams::new().with("max", Some(3)));
    let detail = detail_key("1");
    let images = QueryKey::new("events-images");
    cache.write(&list, json!([]));
    cache.write(&detail, json!({"id": "1"}));
    cache.write(&images, json!([]));

    let matched = cache.invalidate(&events_key(), RefetchType::None);

    assert_eq!(matched, 2);
    assert!(cache.peek(&list).unwrap().invalidated);
    assert!(cache.peek(&detail).unwrap().invalidated);
    assert!(!cache.peek(&images).unwrap().invalidated);
    assert_eq!(cache.peek(&list).unwrap().value, Some(json!([])));
    assert_eq!(cache.fetching_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_refetches_observed_entries() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fn(calls.clone(), json!(["v"]));
    let observed = events_key();
    let unobserved = detail_key("9");

    cache
        .read(&observed, &ReadPolicy::default(), fetch.clone(), None)
        .await
        .unwrap();
    cache
        .read(&unobserved, &ReadPolicy::default(), fetch.clone(), None)
        .await
        .unwrap();
    let observer = cache.observe(&observed);
    observer.pending();

    cache.invalidate(&events_key(), RefetchType::Active);

    assert_eq!(cache.fetching_count(), 1);
    wait_for_settle(&observer).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(!cache.peek(&observed).unwrap().invalidated);
    assert!(cache.peek(&unobserved).unwrap().invalidated);
}

#[tokio::test(start_paused = true)]
async fn test_optimistic_write_and_exact_rollback() {
    let cache = QueryCache::default();
    let coordinator = MutationCoordinator::new(cache.clone());
    let key = detail_key("1");
    let original = json!({"id": "1", "title": "Old"});
    cache.write(&key, original.clone());
    let gate = Arc::new(Semaphore::new(0));

    let mutation = {
        let (coordinator, key, gate) =
            (coordinator.clone(), key.clone(), gate.clone());
        tokio::spawn(async move {
            let plan = MutationPlan::new()
                .optimistic(key, json!({"id": "1", "title": "New"}))
                .invalidate(QueryKey::new("events"), RefetchType::None);
            coordinator
                .run("update-event", plan, async move {
                    let _permit = gate.acquire().await;
                    Err::<Value, _>(RequestError::request_failed(500, None))
                })
                .await
        })
    };
    while cache.pending_mutations() == 0
        || cache.peek(&key).unwrap().value == Some(original.clone())
    {
        tokio::task::yield_now().await;
    }

    assert_eq!(
        cache.peek(&key).unwrap().value,
        Some(json!({"id": "1", "title": "New"}))
    );

    gate.add_permits(1);
    let err = mutation.await.unwrap().unwrap_err();
    assert_eq!(err.status(), Some(500));

    let entry = cache.peek(&key).unwrap();
    assert_eq!(entry.value, Some(original));
    assert_eq!(entry.status, QueryStatus::Success);
    assert_eq!(cache.pending_mutations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rollback_of_entry_without_value_clears_it() {
    let cache = QueryCache::default();
    let coordinator = MutationCoordinator::new(cache.clone());
    let key = detail_key("2");

    let plan = MutationPlan::new().optimistic(key.clone(), json!({"id": "2"}));
    let result = coordinator
        .run("update-event", plan, async {
            Err::<(), _>(RequestError::Transport("refused".to_string()))
        })
        .await;

    assert!(result.is_err());
    let entry = cache.peek(&key).unwrap();
    assert!(entry.value.is_none());
    assert_eq!(entry.status, QueryStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_mutation_keeps_newer_write() {
    let cache = QueryCache::default();
    let coordinator = MutationCoordinator::new(cache.clone());
    let key = detail_key("1");
    cache.write(&key, json!({"title": "base"}));
    let first_gate = Arc::new(Semaphore::new(0));
    let second_gate = Arc::new(Semaphore::new(0));

    let first = {
        let (coordinator, key, gate) =
            (coordinator.clone(), key.clone(), first_gate.clone());
        tokio::spawn(async move {
            let plan = MutationPlan::new().optimistic(key, json!({"title": "a"}));
            coordinator
                .run("first", plan, async move {
                    let _permit = gate.acquire().await;
                    Err::<(), _>(RequestError::request_failed(500, None))
                })
                .await
        })
    };
    while cache.pending_mutations() < 1 {
        tokio::task::yield_now().await;
    }
    let second = {
        let (coordinator, key, gate) =
            (coordinator.clone(), key.clone(), second_gate.clone());
        tokio::spawn(async move {
            let plan = MutationPlan::new().optimistic(key, json!({"title": "b"}));
            coordinator
                .run("second", plan, async move {
                    let _permit = gate.acquire().await;
                    Ok::<(), RequestError>(())
                })
                .await
        })
    };
    while cache.peek(&key).unwrap().value != Some(json!({"title": "b"})) {
        tokio::task::yield_now().await;
    }

    first_gate.add_permits(1);
    assert!(first.await.unwrap().is_err());
    assert_eq!(cache.peek(&key).unwrap().value, Some(json!({"title": "b"})));

    second_gate.add_permits(1);
    assert!(second.await.unwrap().is_ok());
    assert_eq!(cache.peek(&key).unwrap().value, Some(json!({"title": "b"})));
}

#[tokio::test(start_paused = true)]
async fn test_delete_removes_detail_and_marks_lists_stale_without_refetch() {
    let cache = QueryCache::default();
    let coordinator = MutationCoordinator::new(cache.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fn(calls.clone(), json!([{"id": "1"}]));
    let list = events_key();
    let detail = detail_key("1");

    cache
        .read(&list, &ReadPolicy::default(), fetch, None)
        .await
        .unwrap();
    let _observer = cache.observe(&list);
    cache.write(&detail, json!({"id": "1"}));

    let plan = MutationPlan::new()
        .invalidate(events_key(), RefetchType::None)
        .remove_on_success(detail.clone());
    coordinator
        .run("delete-event", plan, async { Ok::<(), RequestError>(()) })
        .await
        .unwrap();

    assert!(cache.peek(&detail).is_none());
    let list_entry = cache.peek(&list).unwrap();
    assert!(list_entry.invalidated);
    assert!(list_entry.is_stale());
    assert_eq!(cache.fetching_count(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_garbage_collection_spares_observed_entries() {
    let cache = QueryCache::new(QueryCacheConfig {
        stale_time_ms: 0,
        gc_time_ms: 1_000,
    });
    let idle = detail_key("1");
    let watched = detail_key("2");
    cache.write(&idle, json!({}));
    cache.write(&watched, json!({}));
    let observer = cache.observe(&watched);

    tokio::time::advance(Duration::from_millis(500)).await;
    assert_eq!(cache.collect_garbage(), 0);

    tokio::time::advance(Duration::from_millis(600)).await;
    assert_eq!(cache.collect_garbage(), 1);
    assert!(cache.peek(&idle).is_none());
    assert!(cache.peek(&watched).is_some());

    drop(observer);
    tokio::time::advance(Duration::from_millis(1_000)).await;
    assert_eq!(cache.collect_garbage(), 1);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_all_sees_every_key() {
    let cache = QueryCache::default();
    let events = cache.subscribe_all();

    cache.write(&events_key(), json!([]));
    cache.write(&QueryKey::new("events-images"), json!([]));
    cache.remove(&events_key());

    let kinds: Vec<(String, CacheEventKind)> = events
        .try_iter()
        .map(|envelope| (envelope.topic, envelope.payload.kind))
        .collect();
    assert_eq!(kinds, vec![
        ("events".to_string(), CacheEventKind::Updated),
        ("events-images".to_string(), CacheEventKind::Updated),
        ("events".to_string(), CacheEventKind::Removed),
    ]);
}

#[tokio::test(start_paused = true)]
async fn test_invalidation_while_refetching_triggers_another_fetch() {
    let cache = QueryCache::new(QueryCacheConfig {
        stale_time_ms: 60_000,
        gc_time_ms: 300_000,
    });
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let fetch = versioned_fn(calls.clone(), gate.clone());
    let key = events_key();
    cache.write(&key, json!(["cached"]));
    assert!(!cache.prefetch(&key, &ReadPolicy::default(), fetch));
    let observer = cache.observe(&key);

    cache.invalidate(&key, RefetchType::Active);
    wait_for_fetch(&cache).await;
    cache.invalidate(&key, RefetchType::Active);
    gate.add_permits(1);

    wait_for_settle(&observer).await;
    wait_for_settle(&observer).await;

    let entry = cache.peek(&key).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(entry.value, Some(json!(["v2"])));
    assert!(!entry.invalidated);
    assert!(!entry.is_stale());
}

#[tokio::test(start_paused = true)]
async fn test_unobserved_entry_invalidated_mid_fetch_stays_stale() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let fetch = versioned_fn(calls.clone(), gate.clone());
    let key = events_key();

    let reader = {
        let (cache, key) = (cache.clone(), key.clone());
        tokio::spawn(async move {
            cache.read(&key, &ReadPolicy::default(), fetch, None).await
        })
    };
    wait_for_fetch(&cache).await;
    cache.invalidate(&key, RefetchType::Active);
    gate.add_permits(1);

    let entry = reader.await.unwrap().unwrap();
    assert_eq!(entry.value, Some(json!(["v1"])));
    assert!(entry.invalidated);
    assert_eq!(cache.fetching_count(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_revalidation_survives_blocking_caller_leaving() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let fetch = gated_fn(calls.clone(), gate.clone(), Ok(json!(["new"])));
    let key = events_key();
    let policy = ReadPolicy::default();
    cache.write(&key, json!(["old"]));
    tokio::time::advance(Duration::from_millis(1)).await;
    let token = CancellationToken::new();

    let blocking = {
        let (cache, key, fetch, token) =
            (cache.clone(), key.clone(), fetch.clone(), token.clone());
        tokio::spawn(async move {
            cache
                .fetch(&key, &ReadPolicy::default(), fetch, Some(&token))
                .await
        })
    };
    wait_for_fetch(&cache).await;

    let stale = cache.read(&key, &policy, fetch, None).await.unwrap();
    assert_eq!(stale.value, Some(json!(["old"])));
    assert!(stale.is_fetching);

    token.cancel();
    assert!(blocking.await.unwrap().unwrap_err().is_cancelled());
    gate.add_permits(1);
    while cache.fetching_count() > 0 {
        tokio::task::yield_now().await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.peek(&key).unwrap().value, Some(json!(["new"])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_joiner_cancelling_at_once_keeps_request_for_starter() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let fetch = gated_fn(calls.clone(), gate.clone(), Ok(json!(["x"])));
    let key = events_key();

    let starter = {
        let (cache, key, fetch) = (cache.clone(), key.clone(), fetch.clone());
        tokio::spawn(async move {
            cache.read(&key, &ReadPolicy::default(), fetch, None).await
        })
    };
    wait_for_fetch(&cache).await;

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let err = cache
        .read(&key, &ReadPolicy::default(), fetch, Some(&cancelled))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    gate.add_permits(1);
    let entry = starter.await.unwrap().unwrap();
    assert_eq!(entry.value, Some(json!(["x"])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_background_refetch_keeps_stale_value() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(1));
    let failure = RequestError::request_failed(503, Some("down".to_string()));
    let fetch = gated_fn(calls, gate, Err(failure.clone()));
    let key = events_key();
    cache.write(&key, json!(["old"]));
    tokio::time::advance(Duration::from_millis(1)).await;
    let observer = cache.observe(&key);

    let served = cache
        .read(&key, &ReadPolicy::default(), fetch, None)
        .await
        .unwrap();
    assert_eq!(served.value, Some(json!(["old"])));
    assert!(served.is_fetching);
    wait_for_settle(&observer).await;

    let entry = cache.peek(&key).unwrap();
    assert_eq!(entry.status, QueryStatus::Error);
    assert_eq!(entry.error, Some(failure));
    assert_eq!(entry.value, Some(json!(["old"])));

    let result = QueryResult::<Vec<String>>::from_entry(&entry).unwrap();
    assert_eq!(result.view(), QueryView::Data(&vec!["old".to_string()]));
}

#[tokio::test(start_paused = true)]
async fn test_observer_attaching_to_stale_entry_refetches() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = counting_fn(calls.clone(), json!(["new"]));
    let stale = events_key();
    let held = detail_key("1");
    cache.write(&stale, json!(["old"]));
    cache.write(&held, json!({"id": "1"}));
    tokio::time::advance(Duration::from_millis(1)).await;

    let observer =
        cache.observe_with(&stale, &ReadPolicy::default(), fetch.clone());
    wait_for_settle(&observer).await;
    assert_eq!(observer.current().unwrap().value, Some(json!(["new"])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let _quiet = cache.observe_with(
        &held,
        &ReadPolicy::default().refetch_on_observe(false),
        fetch.clone(),
    );
    let _fresh = cache.observe_with(
        &stale,
        &ReadPolicy::default().stale_time(Duration::from_secs(60)),
        fetch,
    );
    assert_eq!(cache.fetching_count(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
