//! Integration tests for optimistic mutations reconciled against the store
//! and its change feed.
//!
//! Drives `TaskListController` step by step so the interleaving of the
//! creation response and the feed's `Inserted` event is deterministic.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::similar_names,
    clippy::redundant_clone
)]

use std::sync::Arc;

use tasklist::enrich::{EnrichmentConfig, EnrichmentPipeline, FixedEnricher};
use tasklist::store::memory::Operation;
use tasklist::store::{InMemoryStore, RemoteStore, StoreError, Subscription};
use tasklist::tasks::{TaskDraft, TaskError, TaskListConfig, TaskListController, resolve_new_task};
use tasklist_proto::{Category, RemoteEvent, SortOrder, Task, TaskId, Timestamp, UserId};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

type Controller = TaskListController<InMemoryStore, FixedEnricher>;

fn alice() -> UserId {
    UserId::new("alice")
}

/// Controller over a signed-in store, with enrichment off.
fn setup() -> (Controller, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::signed_in(alice()));
    let config = TaskListConfig {
        enrichment: EnrichmentConfig::disabled(),
        sort: SortOrder::CreatedAsc,
        ..TaskListConfig::default()
    };
    let pipeline = Arc::new(EnrichmentPipeline::new(
        Arc::new(FixedEnricher::new()),
        config.enrichment.clone(),
    ));
    let controller = TaskListController::new(Arc::clone(&store), pipeline, &config);
    (controller, store)
}

fn make_task(title: &str) -> Task {
    Task {
        id: TaskId::new(),
        owner_id: alice(),
        title: title.to_string(),
        is_complete: false,
        category: Category::Other,
        duration_estimate: None,
        due_date: None,
        created_at: Timestamp::from_millis(0),
        updated_at: None,
    }
}

/// Seeds `titles` into the store and loads them into the controller.
async fn loaded(ctl: &mut Controller, store: &InMemoryStore, titles: &[&str]) -> Vec<Task> {
    let seeded: Vec<Task> = titles.iter().map(|t| store.seed(make_task(t))).collect();
    ctl.load().await.unwrap();
    seeded
}

fn drain(sub: &mut Subscription) -> Vec<RemoteEvent> {
    std::iter::from_fn(|| sub.try_recv()).collect()
}

fn ids(ctl: &Controller) -> Vec<TaskId> {
    ctl.list().tasks().iter().map(|t| t.id.clone()).collect()
}

// ===========================================================================
// Create confirmation vs. change feed
// ===========================================================================

#[tokio::test]
async fn insert_event_before_confirmation_yields_single_task() {
    let (mut ctl, store) = setup();
    let mut sub = store.subscribe(16).unwrap();

    let prepared = ctl.prepare_add(TaskDraft::new("Call dentist")).unwrap().unwrap();
    let new_task = resolve_new_task(ctl.pipeline(), prepared).await;
    let (_, compensation) = ctl.begin_add(&new_task);
    let created = store.create(&new_task).await;

    // The feed delivers the insert before the create response is applied.
    for event in drain(&mut sub) {
        assert!(ctl.apply_remote_event(event));
    }
    assert_eq!(ctl.list().len(), 2, "provisional and delivered copies coexist");

    let confirmed = ctl.finish_add(compensation, created).unwrap();
    assert_eq!(ids(&ctl), vec![confirmed.id.clone()]);
    assert!(ctl.list().tasks().iter().all(|t| !t.is_provisional()));
    assert_eq!(ctl.list().pending_count(), 0);
}

#[tokio::test]
async fn insert_event_after_confirmation_is_ignored() {
    let (mut ctl, store) = setup();
    let mut sub = store.subscribe(16).unwrap();

    let confirmed = ctl.add(TaskDraft::new("Buy milk")).await.unwrap().unwrap();
    let events = drain(&mut sub);
    assert_eq!(events.len(), 1);

    for event in events {
        assert!(!ctl.apply_remote_event(event));
    }
    assert_eq!(ids(&ctl), vec![confirmed.id]);
}

#[tokio::test]
async fn concurrent_adds_with_early_feed_events_keep_ids_unique() {
    let (mut ctl, store) = setup();
    let mut sub = store.subscribe(16).unwrap();

    let mut in_flight = Vec::new();
    for title in ["one", "two", "three"] {
        let prepared = ctl.prepare_add(TaskDraft::new(title)).unwrap().unwrap();
        let new_task = resolve_new_task(ctl.pipeline(), prepared).await;
        let (_, compensation) = ctl.begin_add(&new_task);
        in_flight.push((compensation, store.create(&new_task).await));
    }
    assert_eq!(ctl.list().len(), 3);

    for event in drain(&mut sub) {
        ctl.apply_remote_event(event);
    }
    // Confirm out of order.
    in_flight.reverse();
    for (compensation, result) in in_flight {
        ctl.finish_add(compensation, result).unwrap();
    }

    let mut seen = ids(&ctl);
    assert_eq!(seen.len(), 3);
    seen.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    seen.dedup();
    assert_eq!(seen.len(), 3);
    assert_eq!(ctl.list().pending_count(), 0);
}

// ===========================================================================
// Failure compensation
// ===========================================================================

#[tokio::test]
async fn failed_create_restores_prior_contents() {
    let (mut ctl, store) = setup();
    loaded(&mut ctl, &store, &["a", "b"]).await;
    let before = ctl.list().tasks().to_vec();

    store.fail_next(Operation::Create);
    let err = ctl.add(TaskDraft::new("doomed")).await.unwrap_err();

    assert!(matches!(err, TaskError::Store(StoreError::Unavailable(_))));
    assert_eq!(ctl.list().tasks(), before.as_slice());
    assert_eq!(ctl.list().pending_count(), 0);
    assert_eq!(store.tasks().len(), 2);
}

#[tokio::test]
async fn failed_delete_puts_task_back_in_place() {
    let (mut ctl, store) = setup();
    let seeded = loaded(&mut ctl, &store, &["a", "b", "c"]).await;
    let before = ctl.list().tasks().to_vec();

    store.fail_next(Operation::Delete);
    let err = ctl.remove(&seeded[1].id).await.unwrap_err();

    assert!(matches!(err, TaskError::Store(_)));
    assert_eq!(ctl.list().tasks(), before.as_slice());
    assert!(!ctl.list().is_pending(&seeded[1].id));
}

#[tokio::test]
async fn failed_toggle_reverts_completion() {
    let (mut ctl, store) = setup();
    let seeded = loaded(&mut ctl, &store, &["a"]).await;
    let id = seeded[0].id.clone();

    store.fail_next(Operation::Update);
    assert!(ctl.toggle_complete(&id).await.is_err());
    assert!(!ctl.list().get(&id).unwrap().is_complete);

    // A later toggle goes through.
    assert_eq!(ctl.toggle_complete(&id).await, Ok(true));
    assert!(ctl.list().get(&id).unwrap().is_complete);
    assert!(store.tasks()[0].is_complete);
}

#[tokio::test]
async fn delete_event_during_failed_removal_keeps_task_gone() {
    let (mut ctl, store) = setup();
    let seeded = loaded(&mut ctl, &store, &["a", "b"]).await;
    let id = seeded[0].id.clone();

    let pending = ctl.begin_remove(&id).unwrap().unwrap();
    // Another client deleted it first; our own delete then fails.
    ctl.apply_remote_event(RemoteEvent::Deleted(id.clone()));
    ctl.finish_remove(
        pending.compensation,
        Err(StoreError::NotFound(id.clone())),
    )
    .unwrap_err();

    assert!(ctl.list().get(&id).is_none());
    assert_eq!(ctl.list().len(), 1);
}

#[tokio::test]
async fn failed_toggle_keeps_remote_title_change() {
    let (mut ctl, store) = setup();
    let seeded = loaded(&mut ctl, &store, &["a"]).await;
    let id = seeded[0].id.clone();

    let pending = ctl.begin_toggle(&id).unwrap().unwrap();
    let mut remote = ctl.list().get(&id).unwrap().clone();
    remote.title = "renamed elsewhere".to_string();
    ctl.apply_remote_event(RemoteEvent::Updated(remote));
    ctl.finish_update(pending.compensation, Err(StoreError::Unavailable("down".into())))
        .unwrap_err();

    let task = ctl.list().get(&id).unwrap();
    assert_eq!(task.title, "renamed elsewhere");
    assert!(!task.is_complete);
}

#[tokio::test]
async fn operations_on_in_flight_task_are_busy() {
    let (mut ctl, store) = setup();
    let seeded = loaded(&mut ctl, &store, &["a"]).await;
    let id = seeded[0].id.clone();

    let _pending = ctl.begin_toggle(&id).unwrap().unwrap();
    assert_eq!(ctl.begin_toggle(&id).unwrap_err(), TaskError::Busy(id.clone()));
    assert_eq!(ctl.begin_remove(&id).unwrap_err(), TaskError::Busy(id));
}

// ===========================================================================
// Idempotent feed application
// ===========================================================================

#[tokio::test]
async fn repeated_events_apply_once() {
    let (mut ctl, store) = setup();
    loaded(&mut ctl, &store, &["a"]).await;

    let other = make_task("from another client");
    assert!(ctl.apply_remote_event(RemoteEvent::Inserted(other.clone())));
    assert!(!ctl.apply_remote_event(RemoteEvent::Inserted(other.clone())));
    assert_eq!(ctl.list().len(), 2);

    let mut done = other.clone();
    done.is_complete = true;
    assert!(ctl.apply_remote_event(RemoteEvent::Updated(done.clone())));
    assert!(!ctl.apply_remote_event(RemoteEvent::Updated(done)));

    assert!(ctl.apply_remote_event(RemoteEvent::Deleted(other.id.clone())));
    assert!(!ctl.apply_remote_event(RemoteEvent::Deleted(other.id.clone())));
    // A stale insert of a deleted task does not resurrect it.
    assert!(!ctl.apply_remote_event(RemoteEvent::Inserted(other.clone())));
    assert!(ctl.list().get(&other.id).is_none());
    assert_eq!(ctl.list().len(), 1);
}

#[tokio::test]
async fn reload_after_delete_omits_stale_rows() {
    let (mut ctl, store) = setup();
    let seeded = loaded(&mut ctl, &store, &["a", "b"]).await;
    ctl.apply_remote_event(RemoteEvent::Deleted(seeded[0].id.clone()));

    // The store still returns the row, e.g. from a lagging replica.
    let count = ctl.finish_load(Ok(seeded.clone())).unwrap();
    assert_eq!(count, 1);
    assert_eq!(ids(&ctl), vec![seeded[1].id.clone()]);
}
