//! INGEST stage: refresh the item pool unless sources are fresh

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use trawl_common::events::{PipelineEvent, Stage};
use trawl_common::time;

use super::statistics::IngestStats;
use super::PipelineOrchestrator;
use crate::error::PipelineResult;
use crate::ingest::FeedIngestor;

impl PipelineOrchestrator {
    pub(super) async fn phase_ingest(&self, now: DateTime<Utc>) -> PipelineResult<IngestStats> {
        let started = self.stage_started(Stage::Ingest);

        let source_ids: Vec<String> = self
            .sources
            .iter()
            .map(|feed| feed.source_id().to_string())
            .collect();
        let staleness = Duration::minutes(i64::from(self.config.ingest.staleness_minutes));

        if let Some(latest) = self.store.latest_successful_fetch(&source_ids).await? {
            if now - latest < staleness {
                debug!(latest = %latest, "Sources fetched within staleness window");
                let stats = IngestStats {
                    skipped: true,
                    ..Default::default()
                };
                self.stage_finished(Stage::Ingest, started, stats.display_string());
                return Ok(stats);
            }
        }

        let report = FeedIngestor::new(self.store.clone(), self.config.ingest.fingerprint_chars)
            .ingest_all(&self.sources)
            .await?;

        for (source_id, error) in &report.failures {
            self.events.emit_lossy(PipelineEvent::SourceFailed {
                source_id: source_id.clone(),
                error: error.clone(),
                timestamp: time::now(),
            });
        }

        let stats = IngestStats {
            skipped: false,
            sources_fetched: report.sources_fetched,
            sources_failed: report.sources_failed,
            items_seen: report.items_seen,
            items_new: report.items_new,
            duplicates_flagged: report.duplicates_flagged,
        };
        self.stage_finished(Stage::Ingest, started, stats.display_string());
        Ok(stats)
    }
}
