//! Integration tests for category and duration enrichment.
//!
//! Covers preview reuse at submission, fallbacks on timeout and failure,
//! and the HTTP enricher against a mock functions endpoint.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::similar_names,
    clippy::redundant_clone
)]

use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use serde_json::json;

use tasklist::enrich::{
    EnrichmentConfig, EnrichmentPipeline, Enricher, FixedEnricher, HttpEnricher, SlotState,
    SuggestionKind,
};
use tasklist::session::Session;
use tasklist::store::InMemoryStore;
use tasklist::tasks::{TaskDraft, TaskListConfig, TaskListController, TaskListEvent};
use tasklist_proto::{Category, DurationEstimate, Task, UserId};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn dentist() -> FixedEnricher {
    FixedEnricher::new()
        .with_category("Call dentist", "health")
        .with_duration("Call dentist", "15min")
}

fn signed_in_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::signed_in(UserId::new("alice")))
}

fn controller<E: Enricher>(
    enricher: Arc<E>,
    enrichment: EnrichmentConfig,
) -> (TaskListController<InMemoryStore, E>, Arc<InMemoryStore>) {
    let store = signed_in_store();
    let config = TaskListConfig {
        enrichment,
        ..TaskListConfig::default()
    };
    let pipeline = Arc::new(EnrichmentPipeline::new(enricher, config.enrichment.clone()));
    (
        TaskListController::new(Arc::clone(&store), pipeline, &config),
        store,
    )
}

async fn next_matching(
    session: &mut Session,
    pred: impl Fn(&TaskListEvent) -> bool,
) -> TaskListEvent {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let event = session.next_event().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

async fn next_added(session: &mut Session) -> Task {
    match next_matching(session, |e| matches!(e, TaskListEvent::Added(_))).await {
        TaskListEvent::Added(task) => task,
        other => panic!("unexpected event: {other:?}"),
    }
}

/// Waits until both slots have settled with a ready suggestion.
async fn wait_for_ready_suggestions(session: &mut Session) {
    for _ in 0..2 {
        next_matching(session, |e| {
            matches!(
                e,
                TaskListEvent::Suggested(update) if matches!(update.state, SlotState::Ready(_))
            )
        })
        .await;
    }
}

// ===========================================================================
// Preview and submission through a session
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn previewed_suggestions_are_used_without_new_calls() {
    let enricher = Arc::new(dentist());
    let mut session = Session::sign_in(
        signed_in_store(),
        Arc::clone(&enricher),
        &TaskListConfig::default(),
    )
    .await
    .unwrap();

    session.handle().input("Call dentist").await.unwrap();
    wait_for_ready_suggestions(&mut session).await;
    assert_eq!(enricher.calls().len(), 2);

    session
        .handle()
        .add(TaskDraft::new("Call dentist"))
        .await
        .unwrap();
    let task = next_added(&mut session).await;

    assert_eq!(task.title, "Call dentist");
    assert_eq!(task.category, Category::Health);
    assert_eq!(task.duration_estimate, Some(DurationEstimate::Minutes15));
    assert_eq!(enricher.calls().len(), 2, "submission reused the previews");

    let suggestions = session.handle().suggestions().await.unwrap();
    assert_eq!(suggestions.category, SlotState::Idle);
    assert_eq!(suggestions.duration, SlotState::Idle);

    session.sign_out().await;
}

#[tokio::test(start_paused = true)]
async fn suggestions_for_other_text_are_not_reused() {
    let enricher = Arc::new(dentist());
    let mut session = Session::sign_in(
        signed_in_store(),
        Arc::clone(&enricher),
        &TaskListConfig::default(),
    )
    .await
    .unwrap();

    session.handle().input("Call dentist").await.unwrap();
    wait_for_ready_suggestions(&mut session).await;

    session.handle().add(TaskDraft::new("Buy milk")).await.unwrap();
    let task = next_added(&mut session).await;

    assert_eq!(task.category, Category::Other);
    assert_eq!(task.duration_estimate, Some(DurationEstimate::Minutes30));
    assert_eq!(
        enricher.calls_for(SuggestionKind::Category),
        vec!["Call dentist".to_string(), "Buy milk".to_string()]
    );

    session.sign_out().await;
}

// ===========================================================================
// Submission without previews
// ===========================================================================

#[tokio::test]
async fn submission_calls_service_for_missing_fields() {
    let enricher = Arc::new(dentist());
    let (mut ctl, store) = controller(Arc::clone(&enricher), EnrichmentConfig::default());

    let task = ctl
        .add(TaskDraft::new("Call dentist"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(task.category, Category::Health);
    assert_eq!(task.duration_estimate, Some(DurationEstimate::Minutes15));
    assert_eq!(enricher.calls_for(SuggestionKind::Category).len(), 1);
    assert_eq!(enricher.calls_for(SuggestionKind::Duration).len(), 1);
    assert_eq!(store.tasks(), vec![task]);
}

#[tokio::test(start_paused = true)]
async fn slow_service_falls_back_after_submit_timeout() {
    let enricher = Arc::new(dentist().with_latency(Duration::from_secs(10)));
    let (mut ctl, _store) = controller(Arc::clone(&enricher), EnrichmentConfig::default());

    let started = tokio::time::Instant::now();
    let task = ctl
        .add(TaskDraft::new("Call dentist").with_fallbacks(Category::Work, None))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(task.category, Category::Work);
    assert_eq!(task.duration_estimate, None);
    // Both lookups run concurrently under one timeout each.
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn failing_service_uses_defaults() {
    let enricher = Arc::new(FixedEnricher::failing());
    let (mut ctl, _store) = controller(Arc::clone(&enricher), EnrichmentConfig::default());

    let task = ctl
        .add(TaskDraft::new("Call dentist"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(task.category, Category::Other);
    assert_eq!(task.duration_estimate, Some(DurationEstimate::BASELINE));
}

#[tokio::test]
async fn disabled_enrichment_makes_no_calls() {
    let enricher = Arc::new(dentist());
    let (mut ctl, _store) = controller(Arc::clone(&enricher), EnrichmentConfig::disabled());

    ctl.on_input("Call dentist");
    let task = ctl
        .add(TaskDraft::new("Call dentist"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(task.category, Category::Other);
    assert!(enricher.calls().is_empty());
    assert_eq!(ctl.suggestions().category, SlotState::Idle);
}

// ===========================================================================
// HTTP enricher
// ===========================================================================

#[tokio::test]
async fn http_answers_are_normalized_into_the_taxonomy() {
    let mut server = mockito::Server::new_async().await;
    let categorize = server
        .mock("POST", "/categorize-todo")
        .match_header("authorization", "Bearer anon")
        .match_body(Matcher::Json(json!({"title": "Call dentist"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"category":"  Health "}"#)
        .create_async()
        .await;
    let estimate = server
        .mock("POST", "/estimate-time")
        .match_header("authorization", "Bearer anon")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"timeEstimate":"about 2 hours"}"#)
        .create_async()
        .await;

    let enricher = HttpEnricher::new(
        format!("{}/", server.url()),
        Some("anon".to_string()),
        Duration::from_secs(5),
    )
    .unwrap();
    let (mut ctl, _store) = controller(Arc::new(enricher), EnrichmentConfig::default());

    let task = ctl
        .add(TaskDraft::new("Call dentist"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(task.category, Category::Health);
    assert_eq!(task.duration_estimate, Some(DurationEstimate::Hours2));
    categorize.assert_async().await;
    estimate.assert_async().await;
}

#[tokio::test]
async fn http_errors_fall_back_and_still_create() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/categorize-todo")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;
    server
        .mock("POST", "/estimate-time")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let enricher = HttpEnricher::new(server.url(), None, Duration::from_secs(5)).unwrap();
    let (mut ctl, store) = controller(Arc::new(enricher), EnrichmentConfig::default());

    let task = ctl
        .add(
            TaskDraft::new("Renew passport")
                .with_fallbacks(Category::Personal, Some(DurationEstimate::Hours1)),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(task.category, Category::Personal);
    assert_eq!(task.duration_estimate, Some(DurationEstimate::Hours1));
    assert_eq!(store.tasks().len(), 1);
}
