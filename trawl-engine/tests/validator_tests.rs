//! Structured output validation and the bounded repair call

mod helpers;

use chrono::Utc;
use helpers::*;
use serde_json::json;
use trawl_common::models::{AnalysisPack, PackStatus, Tier};
use trawl_engine::analysis::schemas::lite_schema;
use trawl_engine::analysis::AnalysisEngine;
use trawl_engine::ai::CompletionRequest;
use trawl_engine::config::AnalysisConfig;
use trawl_engine::store::{PackKey, Repository};
use trawl_engine::validation::call_validated;
use trawl_engine::ErrorKind;

fn request() -> CompletionRequest {
    CompletionRequest {
        system: "evaluate".to_string(),
        user: "Title: Funding round\n<<<CONTENT\nbody\nCONTENT>>>".to_string(),
        max_tokens: 100,
        temperature: 0.2,
    }
}

/// Lite output whose dimension scores omit `depth`
fn missing_depth() -> serde_json::Value {
    json!({
        "topic": "funding",
        "summary_short": "s",
        "dimension_scores": {"novelty": 80},
        "action": "write-worthy",
        "reasons": ["r"]
    })
}

#[tokio::test]
async fn test_valid_output_needs_one_call() {
    let backend = ScriptedBackend::new(|_, _| Reply::Json(lite_json("funding", 70.0, "write-worthy")));
    let schema = lite_schema(&test_persona());

    let outcome = call_validated(backend.as_ref(), &request(), &schema).await;

    assert!(outcome.result.is_ok());
    assert_eq!(outcome.stats.calls, 1);
    assert!(!outcome.stats.repaired);
    assert_eq!(outcome.model.as_deref(), Some("scripted"));
}

#[tokio::test]
async fn test_fenced_output_accepted_without_repair() {
    let fenced = format!("```json\n{}\n```", lite_json("funding", 70.0, "skip"));
    let backend = ScriptedBackend::new(move |_, _| Reply::Raw(fenced.clone()));
    let schema = lite_schema(&test_persona());

    let outcome = call_validated(backend.as_ref(), &request(), &schema).await;

    assert!(outcome.result.is_ok());
    assert_eq!(backend.calls(CallKind::Repair), 0);
}

#[tokio::test]
async fn test_one_line_fenced_output_accepted_without_repair() {
    let fenced = format!("```json {}```", lite_json("funding", 70.0, "skip"));
    let backend = ScriptedBackend::new(move |_, _| Reply::Raw(fenced.clone()));
    let schema = lite_schema(&test_persona());

    let outcome = call_validated(backend.as_ref(), &request(), &schema).await;

    assert!(outcome.result.is_ok());
    assert_eq!(outcome.stats.calls, 1);
    assert_eq!(backend.calls(CallKind::Repair), 0);
}

#[tokio::test]
async fn test_repair_fixes_output() {
    let backend = ScriptedBackend::new(|kind, _| match kind {
        CallKind::Repair => Reply::Json(lite_json("funding", 70.0, "write-worthy")),
        _ => Reply::Raw("not json at all".to_string()),
    });
    let schema = lite_schema(&test_persona());

    let outcome = call_validated(backend.as_ref(), &request(), &schema).await;

    assert!(outcome.result.is_ok());
    assert_eq!(outcome.stats.calls, 2);
    assert!(outcome.stats.repaired);
    assert_eq!(outcome.stats.usage.total(), 240);
}

/// A missing persona dimension key fails validation, triggers exactly one
/// repair, and a repair with the same gap is terminal
#[tokio::test]
async fn test_missing_dimension_key_fails_after_single_repair() {
    let backend = ScriptedBackend::new(|_, _| Reply::Json(missing_depth()));
    let schema = lite_schema(&test_persona());

    let outcome = call_validated(backend.as_ref(), &request(), &schema).await;

    let err = outcome.result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let message = err.to_string();
    assert!(message.contains("depth"), "{}", message);
    assert_eq!(backend.calls(CallKind::Lite), 1);
    assert_eq!(backend.calls(CallKind::Repair), 1);
    assert_eq!(outcome.stats.calls, 2);
}

#[tokio::test]
async fn test_transport_failure_is_not_repaired() {
    let backend = ScriptedBackend::new(|_, _| Reply::Fail("connection reset".to_string()));
    let schema = lite_schema(&test_persona());

    let outcome = call_validated(backend.as_ref(), &request(), &schema).await;

    assert_eq!(outcome.result.unwrap_err().kind(), ErrorKind::Transport);
    assert_eq!(backend.total_calls(), 1);
}

#[tokio::test]
async fn test_failed_repair_call_reports_validation() {
    let backend = ScriptedBackend::new(|kind, _| match kind {
        CallKind::Repair => Reply::Fail("timeout".to_string()),
        _ => Reply::Json(missing_depth()),
    });
    let schema = lite_schema(&test_persona());

    let outcome = call_validated(backend.as_ref(), &request(), &schema).await;

    let err = outcome.result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("repair call failed"));
    assert_eq!(outcome.stats.calls, 2);
}

/// End to end through lite scoring: the unit is marked failed and excluded
/// from ranked results
#[tokio::test]
async fn test_unrepairable_item_marked_failed_and_excluded() {
    // Given: two items, one whose output never carries the `depth` key
    let now = Utc::now();
    let store = create_test_store().await;
    let good = test_item("good", "Good item", 1, now);
    let bad = test_item("bad", "Bad item", 1, now);
    seed_items(&store, &[good.clone(), bad.clone()]).await;

    let backend = ScriptedBackend::new(|_, title| match title {
        Some("Bad item") => Reply::Json(missing_depth()),
        _ => Reply::Json(lite_json("good topic", 80.0, "write-worthy")),
    });
    let persona = test_persona();
    let engine = AnalysisEngine::new(backend.clone(), store.clone(), AnalysisConfig::default());

    // When: both are lite scored
    let report = engine.score_lite(&persona, &[good, bad], false).await.unwrap();

    // Then: one scored, one failed after exactly one repair
    assert_eq!(report.scored, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].0, "bad");
    assert_eq!(report.calls, 3);
    assert_eq!(backend.calls(CallKind::Repair), 1);

    let pack: AnalysisPack = store.find(&PackKey::new("bad", &persona.id)).await.unwrap().unwrap();
    assert_eq!(pack.status, PackStatus::Failed);
    assert_eq!(pack.tier, Tier::Lite);
    assert!(pack.overall_score.is_none());

    let top = store
        .top_packs(&persona.id, now - chrono::Duration::hours(1), None, 10)
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].item_id, "good");
}
