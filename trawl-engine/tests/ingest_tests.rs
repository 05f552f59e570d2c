//! Feed ingest adapter and delivery digest

mod helpers;

use chrono::{Duration, Utc};
use helpers::*;
use std::sync::atomic::Ordering;
use trawl_common::models::{ActionLabel, Tier};
use trawl_engine::analysis::AnalysisEngine;
use trawl_engine::config::AnalysisConfig;
use trawl_engine::delivery::delivery_digest;
use trawl_engine::ingest::{FeedIngestor, JsonFileFeed, SourceFeed};

#[tokio::test]
async fn test_ingest_is_idempotent_and_isolates_failures() {
    let now = Utc::now();
    let store = create_test_store().await;
    let good = VecFeed::new("wire", vec![test_item("a", "A", 1, now), test_item("b", "B", 2, now)]);
    let fetches = good.fetches.clone();
    let feeds: Vec<Box<dyn SourceFeed>> = vec![Box::new(good), Box::new(VecFeed::failing("down"))];
    let ingestor = FeedIngestor::new(store.clone(), 500);

    let first = ingestor.ingest_all(&feeds).await.unwrap();
    let second = ingestor.ingest_all(&feeds).await.unwrap();

    assert_eq!(first.items_new, 2);
    assert_eq!(first.sources_failed, 1);
    assert_eq!(first.failures[0].0, "down");
    assert_eq!(second.items_seen, 2);
    assert_eq!(second.items_new, 0);
    assert_eq!(fetches.load(Ordering::SeqCst), 2);

    let latest = store
        .latest_successful_fetch(&["down".to_string()])
        .await
        .unwrap();
    assert!(latest.is_none());
}

#[tokio::test]
async fn test_reused_item_id_across_sources_does_not_stop_ingest() {
    // Given: two feeds numbering their items "1" with different urls, then a third feed
    let now = Utc::now();
    let store = create_test_store().await;
    let first = test_item("1", "Chip export rules tighten", 1, now);
    let mut clash = test_item("1", "GPU cloud prices fall", 2, now);
    clash.guid = Some("blog-guid-1".to_string());
    clash.url = "https://blog.example/posts/1".to_string();
    let feeds: Vec<Box<dyn SourceFeed>> = vec![
        Box::new(VecFeed::new("wire", vec![first])),
        Box::new(VecFeed::new("blog", vec![clash])),
        Box::new(VecFeed::new("later", vec![test_item("z", "Later item", 1, now)])),
    ];

    // When
    let report = FeedIngestor::new(store.clone(), 500).ingest_all(&feeds).await.unwrap();

    // Then: the first delivery keeps the id and every source completes
    assert_eq!(report.sources_fetched, 3);
    assert_eq!(report.sources_failed, 0);
    assert_eq!(report.items_seen, 3);
    assert_eq!(report.items_new, 2);
    let kept = store.get_item("1").await.unwrap().unwrap();
    assert_eq!(kept.source_id, "wire");
    assert_eq!(kept.title, "Chip export rules tighten");
    assert_eq!(store.get_item("z").await.unwrap().unwrap().source_id, "later");
    let latest = store
        .latest_successful_fetch(&["later".to_string()])
        .await
        .unwrap();
    assert!(latest.is_some());
}

#[tokio::test]
async fn test_same_content_from_two_sources_flagged() {
    let now = Utc::now();
    let store = create_test_store().await;
    let original = test_item("wire-1", "OpenAI raises funding", 1, now);
    let mut copy = original.clone();
    copy.id = "agg-1".to_string();
    copy.guid = Some("aggregator-guid".to_string());
    copy.url = "https://aggregator.example/1".to_string();
    let feeds: Vec<Box<dyn SourceFeed>> = vec![
        Box::new(VecFeed::new("wire", vec![original])),
        Box::new(VecFeed::new("aggregator", vec![copy])),
    ];

    let report = FeedIngestor::new(store.clone(), 500).ingest_all(&feeds).await.unwrap();

    assert_eq!(report.items_new, 2);
    assert_eq!(report.duplicates_flagged, 1);
    assert!(!store.get_item("wire-1").await.unwrap().unwrap().is_duplicate);
    let flagged = store.get_item("agg-1").await.unwrap().unwrap();
    assert!(flagged.is_duplicate);
    assert_eq!(flagged.source_id, "aggregator");
}

#[tokio::test]
async fn test_json_inbox_discovery() {
    let dir = tempfile::TempDir::new().unwrap();
    let now = Utc::now();
    let items = vec![test_item("x", "X", 1, now)];
    std::fs::write(dir.path().join("hn.json"), serde_json::to_string(&items).unwrap()).unwrap();
    std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let feeds = JsonFileFeed::discover(dir.path()).unwrap();
    let ids: Vec<&str> = feeds.iter().map(|f| f.source_id()).collect();
    assert_eq!(ids, vec!["broken", "hn"]);

    let store = create_test_store().await;
    let report = FeedIngestor::new(store.clone(), 500).ingest_all(&feeds).await.unwrap();
    assert_eq!(report.sources_fetched, 1);
    assert_eq!(report.sources_failed, 1);
    assert_eq!(store.get_item("x").await.unwrap().unwrap().source_id, "hn");

    assert!(JsonFileFeed::discover(&dir.path().join("missing")).unwrap().is_empty());
}

#[tokio::test]
async fn test_delivery_digest_ranks_and_filters() {
    // Given: full pack at 80, lite packs at 80 and 90, a skip and a failure
    let now = Utc::now();
    let store = create_test_store().await;
    let items: Vec<_> = ["full", "lite", "top", "skipped", "broken"]
        .iter()
        .map(|id| test_item(id, &format!("Item {}", id), 1, now))
        .collect();
    seed_items(&store, &items).await;
    let backend = ScriptedBackend::new(|kind, title| match (kind, title) {
        (_, Some("Item top")) => Reply::Json(lite_json("top", 90.0, "pitch-worthy")),
        (_, Some("Item skipped")) => Reply::Json(lite_json("skipped", 99.0, "skip")),
        (_, Some("Item broken")) => Reply::Fail("reset".to_string()),
        (CallKind::Full, Some(t)) => Reply::Json(full_json(t, 80.0, "write-worthy")),
        (_, t) => Reply::Json(lite_json(t.unwrap_or(""), 80.0, "write-worthy")),
    });
    let persona = test_persona();
    let engine = AnalysisEngine::new(backend, store.clone(), AnalysisConfig::default());
    engine.score_lite(&persona, &items, false).await.unwrap();
    engine.escalate_full(&persona, "full").await.unwrap();

    // When
    let digest = delivery_digest(&store, &persona.id, 24, 10, Utc::now() + Duration::seconds(1))
        .await
        .unwrap();

    // Then
    let order: Vec<&str> = digest.iter().map(|e| e.item_id.as_str()).collect();
    assert_eq!(order, vec!["top", "full", "lite"]);
    assert_eq!(digest[0].action, Some(ActionLabel::PitchWorthy));
    assert_eq!(digest[1].tier, Tier::Full);
    assert_eq!(digest[1].title.as_deref(), Some("Item full"));
    assert_eq!(digest[2].suggested_angle.as_deref(), Some("what it means for builders"));
}
