//! Feed ingest adapter
//!
//! Pulls [`CandidateItem`]s from pluggable [`SourceFeed`]s into the store.
//! Each source is isolated: one failing feed is recorded and skipped. Items
//! are keyed by a hash of guid-or-canonical-url, and content arriving from
//! more than one source is flagged as a duplicate.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use trawl_common::models::CandidateItem;

use crate::error::{PipelineError, PipelineResult};
use crate::store::{FetchStatus, SqliteStore, StoredItem};
use crate::topic_dedup::normalize;

/// Upstream collaborator supplying candidate items
#[async_trait]
pub trait SourceFeed: Send + Sync {
    fn source_id(&self) -> &str;

    async fn fetch(&self) -> PipelineResult<Vec<CandidateItem>>;
}

fn sha256_hex(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// SHA-256 of guid-or-canonical-url
pub fn dedup_key(item: &CandidateItem) -> String {
    sha256_hex(item.dedup_source().trim())
}

/// SHA-256 of the normalized title and the first `text_chars` normalized
/// characters of the text
pub fn content_fingerprint(item: &CandidateItem, text_chars: usize) -> String {
    let text: String = normalize(&item.text).chars().take(text_chars).collect();
    sha256_hex(&format!("{}\n{}", normalize(&item.title), text))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub sources_fetched: usize,
    pub sources_failed: usize,
    /// Items offered by feeds
    pub items_seen: usize,
    /// Items written (not already stored)
    pub items_new: usize,
    pub duplicates_flagged: usize,
    /// `(source_id, error)` per failed feed
    pub failures: Vec<(String, String)>,
}

pub struct FeedIngestor {
    store: SqliteStore,
    fingerprint_chars: usize,
}

impl FeedIngestor {
    pub fn new(store: SqliteStore, fingerprint_chars: usize) -> Self {
        Self {
            store,
            fingerprint_chars,
        }
    }

    /// Fetch every feed in turn
    ///
    /// A feed that fails to fetch, or whose items cannot be stored, is
    /// recorded as failed and the next feed still runs. Only failing to
    /// record the fetch itself aborts.
    pub async fn ingest_all(&self, feeds: &[Box<dyn SourceFeed>]) -> PipelineResult<IngestReport> {
        let mut report = IngestReport::default();

        for feed in feeds {
            let source_id = feed.source_id().to_string();
            let outcome = match feed.fetch().await {
                Ok(items) => self.store_items(&source_id, items, &mut report).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(count) => {
                    self.store
                        .record_source_fetch(&source_id, FetchStatus::Ok, count, None)
                        .await?;
                    report.sources_fetched += 1;
                }
                Err(e) => {
                    let error = e.to_string();
                    warn!(source = %source_id, error = %error, "Source ingest failed");
                    self.store
                        .record_source_fetch(&source_id, FetchStatus::Failed, 0, Some(&error))
                        .await?;
                    report.sources_failed += 1;
                    report.failures.push((source_id, error));
                }
            }
        }

        info!(
            sources_fetched = report.sources_fetched,
            sources_failed = report.sources_failed,
            items_new = report.items_new,
            duplicates = report.duplicates_flagged,
            "Ingest complete"
        );
        Ok(report)
    }

    async fn store_items(
        &self,
        source_id: &str,
        items: Vec<CandidateItem>,
        report: &mut IngestReport,
    ) -> PipelineResult<usize> {
        let count = items.len();
        for item in items {
            report.items_seen += 1;
            let (inserted, duplicate) = self.ingest_item(source_id, item).await?;
            if inserted {
                report.items_new += 1;
                if duplicate {
                    report.duplicates_flagged += 1;
                }
            }
        }
        Ok(count)
    }

    async fn ingest_item(&self, source_id: &str, mut item: CandidateItem) -> PipelineResult<(bool, bool)> {
        item.source_id = source_id.to_string();
        let content_hash = content_fingerprint(&item, self.fingerprint_chars);
        if self
            .store
            .content_seen_from_other_source(&content_hash, source_id)
            .await?
        {
            item.is_duplicate = true;
        }
        let duplicate = item.is_duplicate;

        let stored = StoredItem {
            dedup_key: dedup_key(&item),
            content_hash,
            fetched_at: trawl_common::time::now(),
            item,
        };
        let inserted = self.store.insert_item(&stored).await?;
        Ok((inserted, duplicate))
    }
}

// ============================================================================
// JSON inbox feed
// ============================================================================

/// Reads a JSON array of items dropped by an external fetcher
///
/// The source id is the file stem: `<inbox>/hn.json` is source `hn`.
pub struct JsonFileFeed {
    source_id: String,
    path: PathBuf,
}

impl JsonFileFeed {
    pub fn new(source_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.into(),
        }
    }

    /// One feed per `*.json` file in `dir`; a missing directory yields none
    pub fn discover(dir: &Path) -> PipelineResult<Vec<Box<dyn SourceFeed>>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(trawl_common::Error::from)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();

        Ok(paths
            .into_iter()
            .filter_map(|path| {
                let stem = path.file_stem()?.to_str()?.to_string();
                Some(Box::new(JsonFileFeed::new(stem, path)) as Box<dyn SourceFeed>)
            })
            .collect())
    }
}

#[async_trait]
impl SourceFeed for JsonFileFeed {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch(&self) -> PipelineResult<Vec<CandidateItem>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| PipelineError::Transport(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| PipelineError::Transport(format!("{}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(guid: Option<&str>, url: &str, title: &str, text: &str) -> CandidateItem {
        CandidateItem {
            id: url.to_string(),
            source_id: String::new(),
            title: title.to_string(),
            url: url.to_string(),
            guid: guid.map(str::to_string),
            published_at: Utc::now(),
            language: Some("en".to_string()),
            word_count: Some(300),
            source_domain: "example.com".to_string(),
            text: text.to_string(),
            is_duplicate: false,
        }
    }

    #[test]
    fn test_dedup_key_uses_guid_then_url() {
        let a = item(Some("g-1"), "https://a/1", "t", "x");
        let b = item(Some("g-1"), "https://a/other", "t", "x");
        let c = item(None, "https://a/1", "t", "x");
        assert_eq!(dedup_key(&a), dedup_key(&b));
        assert_ne!(dedup_key(&a), dedup_key(&c));
        assert_eq!(dedup_key(&a).len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_case_and_punctuation() {
        let a = item(None, "https://a/1", "OpenAI Raises!", "Big  news today.");
        let b = item(None, "https://b/9", "openai raises", "big news today");
        assert_eq!(content_fingerprint(&a, 500), content_fingerprint(&b, 500));
        let c = item(None, "https://b/9", "openai raises", "different body");
        assert_ne!(content_fingerprint(&a, 500), content_fingerprint(&c, 500));
    }
}
