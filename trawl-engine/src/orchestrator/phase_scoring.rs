//! PREFILTER and LITE SCORE stages

use chrono::{DateTime, Utc};
use trawl_common::events::Stage;
use trawl_common::models::CandidateItem;
use trawl_common::PersonaProfile;

use super::statistics::{LiteStats, PrefilterStats};
use super::PipelineOrchestrator;
use crate::error::{PipelineError, PipelineResult};
use crate::prefilter::Prefilter;
use crate::topic_dedup::topic_penalties;

impl PipelineOrchestrator {
    /// Rank the lookback window and return the lite budget slice
    pub(super) async fn phase_prefilter(
        &self,
        persona: &PersonaProfile,
        now: DateTime<Utc>,
    ) -> PipelineResult<(PrefilterStats, Vec<CandidateItem>)> {
        let started = self.stage_started(Stage::Prefilter);

        let penalties =
            topic_penalties(&self.store, &persona.id, &self.config.topic_dedup, now).await?;
        let prefilter = Prefilter::new(self.store.clone(), self.config.heuristics.clone());
        let outcome = prefilter.run(persona, &penalties, now).await?;

        if outcome.ranked.is_empty() {
            return Err(PipelineError::precondition(format!(
                "no candidate items in the lookback window for persona '{}'",
                persona.id
            )));
        }

        let budget_slice: Vec<CandidateItem> = outcome
            .selected_items()
            .into_iter()
            .take(self.config.pipeline.lite_budget)
            .cloned()
            .collect();

        let stats = PrefilterStats {
            version: outcome.version.clone(),
            scored: outcome.ranked.len(),
            selected: budget_slice.len(),
            used_fallback: outcome.used_fallback,
            penalized_topics: penalties.len(),
        };
        self.stage_finished(Stage::Prefilter, started, stats.display_string());
        Ok((stats, budget_slice))
    }

    pub(super) async fn phase_lite(
        &self,
        persona: &PersonaProfile,
        items: Vec<CandidateItem>,
    ) -> PipelineResult<LiteStats> {
        let started = self.stage_started(Stage::LiteScore);

        let report = self
            .analysis
            .score_lite(persona, &items, self.config.pipeline.force_refresh)
            .await?;
        for (item_id, error) in &report.failures {
            self.item_failed(Stage::LiteScore, item_id, error);
        }

        let stats = LiteStats {
            requested: items.len(),
            scored: report.scored,
            cache_hits: report.cache_hits,
            failed: report.failed,
            calls: report.calls,
        };
        self.stage_finished(Stage::LiteScore, started, stats.display_string());
        Ok(stats)
    }
}
