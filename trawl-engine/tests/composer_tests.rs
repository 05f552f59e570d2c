//! Synthesis composer: preconditions and the draft lifecycle

mod helpers;

use chrono::Utc;
use helpers::*;
use std::sync::Arc;
use trawl_common::models::{Draft, DraftStatus, MergeStrategy, Platform};
use trawl_engine::analysis::AnalysisEngine;
use trawl_engine::compose::Composer;
use trawl_engine::config::AnalysisConfig;
use trawl_engine::store::{Repository, SqliteStore};
use trawl_engine::ErrorKind;

fn backend() -> Arc<ScriptedBackend> {
    ScriptedBackend::new(|kind, title| {
        let topic = title.unwrap_or("untitled");
        match kind {
            CallKind::Compose => Reply::Json(compose_json()),
            CallKind::Full => Reply::Json(full_json(topic, 88.0, "write-worthy")),
            _ => Reply::Json(lite_json(topic, 70.0, "write-worthy")),
        }
    })
}

/// Seed `ids`, lite-score them, escalate the first `full` of them
async fn prepared_store(ids: &[&str], full: usize, backend: Arc<ScriptedBackend>) -> SqliteStore {
    let now = Utc::now();
    let store = create_test_store().await;
    let items: Vec<_> = ids
        .iter()
        .map(|id| test_item(id, &format!("Story {}", id), 1, now))
        .collect();
    seed_items(&store, &items).await;

    let persona = test_persona();
    let engine = AnalysisEngine::new(backend, store.clone(), AnalysisConfig::default());
    engine.score_lite(&persona, &items, false).await.unwrap();
    for id in ids.iter().take(full) {
        engine.escalate_full(&persona, id).await.unwrap();
    }
    store
}

#[tokio::test]
async fn test_compose_rejects_items_without_full_pack() {
    // Given: a, b at full tier; c only lite; d never stored
    let backend = backend();
    let store = prepared_store(&["a", "b", "c"], 2, backend.clone()).await;
    let composer = Composer::new(backend.clone(), store, AnalysisConfig::default());
    let persona = test_persona();
    let draft = composer
        .create_draft(
            &persona,
            Platform::Blog,
            MergeStrategy::Synthesis,
            vec!["a".into(), "c".into(), "b".into(), "d".into()],
            String::new(),
        )
        .await
        .unwrap();
    let calls_before = backend.total_calls();

    // When
    let err = composer.compose(&persona, draft.id).await.unwrap_err();

    // Then: every offending id named, no model call made
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(err.offending_ids().to_vec(), vec!["c".to_string(), "d".to_string()]);
    assert_eq!(backend.total_calls(), calls_before);
    assert_eq!(backend.calls(CallKind::Compose), 0);
}

#[tokio::test]
async fn test_empty_selection_rejected() {
    let backend = backend();
    let store = create_test_store().await;
    let composer = Composer::new(backend, store, AnalysisConfig::default());

    let err = composer
        .create_draft(&test_persona(), Platform::Blog, MergeStrategy::Roundup, vec![], String::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[tokio::test]
async fn test_compose_then_export_lifecycle() {
    let backend = backend();
    let store = prepared_store(&["a", "b"], 2, backend.clone()).await;
    let composer = Composer::new(backend.clone(), store.clone(), AnalysisConfig::default());
    let persona = test_persona();
    let draft = composer
        .create_draft(
            &persona,
            Platform::Blog,
            MergeStrategy::Synthesis,
            vec!["b".into(), "a".into()],
            "Both point at compute.".into(),
        )
        .await
        .unwrap();
    assert_eq!(draft.status, DraftStatus::Selected);

    // Export before compose is refused
    let early = composer.export(draft.id).await.unwrap_err();
    assert_eq!(early.kind(), ErrorKind::Precondition);

    let report = composer.compose(&persona, draft.id).await.unwrap();
    assert_eq!(report.calls, 1);
    assert_eq!(report.draft.status, DraftStatus::Composed);
    assert_eq!(report.draft.item_ids, vec!["b".to_string(), "a".to_string()]);
    let output = report.draft.output.as_ref().unwrap();
    assert_eq!(output.title_candidates, vec!["What the money buys".to_string()]);
    assert_eq!(output.citations[0].title.as_deref(), Some("Source A"));

    let bundle = composer.export(draft.id).await.unwrap();
    assert!(bundle.rendered.starts_with("# What the money buys"));
    assert!(bundle.rendered.contains("## Sources"));
    assert!(bundle.rendered.contains("Tags: #ai #funding"));
    assert_eq!(
        bundle.source_urls,
        vec![
            "https://www.reuters.com/tech/b".to_string(),
            "https://www.reuters.com/tech/a".to_string()
        ]
    );

    let stored: Draft = store.find(&draft.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DraftStatus::Exported);

    // Exported is terminal
    assert_eq!(composer.compose(&persona, draft.id).await.unwrap_err().kind(), ErrorKind::Precondition);
    assert_eq!(composer.export(draft.id).await.unwrap_err().kind(), ErrorKind::Precondition);
    assert_eq!(backend.calls(CallKind::Compose), 1);
}

#[tokio::test]
async fn test_thread_export_numbers_posts() {
    let backend = ScriptedBackend::new(|kind, title| match kind {
        CallKind::Compose => {
            let mut value = compose_json();
            value["platform_extension"] = serde_json::json!({"posts": ["First take.", "Second take."]});
            Reply::Json(value)
        }
        CallKind::Full => Reply::Json(full_json(title.unwrap_or(""), 80.0, "write-worthy")),
        _ => Reply::Json(lite_json(title.unwrap_or(""), 80.0, "write-worthy")),
    });
    let store = prepared_store(&["a"], 1, backend.clone()).await;
    let composer = Composer::new(backend, store, AnalysisConfig::default());
    let persona = test_persona();
    let draft = composer
        .create_draft(&persona, Platform::Thread, MergeStrategy::Roundup, vec!["a".into()], String::new())
        .await
        .unwrap();
    composer.compose(&persona, draft.id).await.unwrap();

    let bundle = composer.export(draft.id).await.unwrap();

    assert!(bundle.rendered.contains("1/3"), "{}", bundle.rendered);
    assert!(bundle.rendered.contains("First take."));
    assert!(bundle.rendered.contains("Sources:"));
}

#[tokio::test]
async fn test_compose_with_wrong_persona_rejected() {
    let backend = backend();
    let store = prepared_store(&["a"], 1, backend.clone()).await;
    let composer = Composer::new(backend, store, AnalysisConfig::default());
    let draft = composer
        .create_draft(&test_persona(), Platform::Blog, MergeStrategy::Synthesis, vec!["a".into()], String::new())
        .await
        .unwrap();
    let mut other = test_persona();
    other.id = "someone-else".to_string();

    let err = composer.compose(&other, draft.id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(err.offending_ids().to_vec(), vec![draft.id.to_string()]);
}

fn numeric_citation_title() -> serde_json::Value {
    let mut value = compose_json();
    value["citations"] = serde_json::json!([{"url": "https://www.reuters.com/tech/a", "title": 5}]);
    value
}

#[tokio::test]
async fn test_mistyped_citation_goes_through_repair() {
    // Given: the compose reply carries a numeric citation title, the repair fixes it
    let backend = ScriptedBackend::new(|kind, title| match kind {
        CallKind::Compose => Reply::Json(numeric_citation_title()),
        CallKind::Repair => Reply::Json(compose_json()),
        CallKind::Full => Reply::Json(full_json(title.unwrap_or(""), 80.0, "write-worthy")),
        CallKind::Lite => Reply::Json(lite_json(title.unwrap_or(""), 80.0, "write-worthy")),
    });
    let store = prepared_store(&["a"], 1, backend.clone()).await;
    let composer = Composer::new(backend.clone(), store, AnalysisConfig::default());
    let persona = test_persona();
    let draft = composer
        .create_draft(&persona, Platform::Blog, MergeStrategy::Synthesis, vec!["a".into()], String::new())
        .await
        .unwrap();

    // When
    let report = composer.compose(&persona, draft.id).await.unwrap();

    // Then
    assert_eq!(report.calls, 2);
    assert_eq!(backend.calls(CallKind::Repair), 1);
    let output = report.draft.output.as_ref().unwrap();
    assert_eq!(output.citations[0].title.as_deref(), Some("Source A"));
}

#[tokio::test]
async fn test_mistyped_citation_after_repair_is_validation_error() {
    let backend = ScriptedBackend::new(|kind, title| match kind {
        CallKind::Compose | CallKind::Repair => Reply::Json(numeric_citation_title()),
        CallKind::Full => Reply::Json(full_json(title.unwrap_or(""), 80.0, "write-worthy")),
        CallKind::Lite => Reply::Json(lite_json(title.unwrap_or(""), 80.0, "write-worthy")),
    });
    let store = prepared_store(&["a"], 1, backend.clone()).await;
    let composer = Composer::new(backend.clone(), store.clone(), AnalysisConfig::default());
    let persona = test_persona();
    let draft = composer
        .create_draft(&persona, Platform::Blog, MergeStrategy::Synthesis, vec!["a".into()], String::new())
        .await
        .unwrap();

    let err = composer.compose(&persona, draft.id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(backend.calls(CallKind::Repair), 1);
    let stored: Draft = store.find(&draft.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DraftStatus::Selected);
}
