//! Database Test Utilities

use chrono::Utc;
use trawl_common::db::init_memory_database;
use trawl_common::models::CandidateItem;
use trawl_engine::ingest::{content_fingerprint, dedup_key};
use trawl_engine::store::{SqliteStore, StoredItem};

/// In-memory store with the schema applied
pub async fn create_test_store() -> SqliteStore {
    let pool = init_memory_database().await.expect("in-memory database");
    SqliteStore::new(pool)
}

/// Insert items directly, bypassing the feed adapter
pub async fn seed_items(store: &SqliteStore, items: &[CandidateItem]) {
    for item in items {
        let stored = StoredItem {
            item: item.clone(),
            dedup_key: dedup_key(item),
            content_hash: content_fingerprint(item, 500),
            fetched_at: Utc::now(),
        };
        assert!(store.insert_item(&stored).await.unwrap(), "duplicate seed {}", item.id);
    }
}
