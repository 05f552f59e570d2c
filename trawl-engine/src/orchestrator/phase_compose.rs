//! COMPOSE stage: draft from survivors, then one synthesis call

use trawl_common::events::Stage;
use trawl_common::models::Draft;
use trawl_common::PersonaProfile;

use super::statistics::ComposeStats;
use super::PipelineOrchestrator;
use crate::error::PipelineResult;

impl PipelineOrchestrator {
    pub(super) async fn phase_compose(
        &self,
        persona: &PersonaProfile,
        item_ids: Vec<String>,
    ) -> PipelineResult<(Draft, ComposeStats)> {
        let started = self.stage_started(Stage::Compose);
        let pipeline = &self.config.pipeline;

        let draft = self
            .composer
            .create_draft(
                persona,
                pipeline.platform,
                pipeline.merge_strategy,
                item_ids,
                pipeline.commentary.clone(),
            )
            .await?;
        let report = self.composer.compose(persona, draft.id).await?;

        let stats = ComposeStats {
            items: report.draft.item_ids.len(),
            calls: report.calls,
        };
        self.stage_finished(Stage::Compose, started, stats.display_string());
        Ok((report.draft, stats))
    }
}
