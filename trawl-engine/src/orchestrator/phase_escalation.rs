//! AUTO-PICK and FULL ESCALATE stages

use chrono::{DateTime, Duration, Utc};
use trawl_common::events::Stage;
use trawl_common::PersonaProfile;

use super::statistics::EscalationStats;
use super::PipelineOrchestrator;
use crate::error::{ErrorKind, PipelineResult};

impl PipelineOrchestrator {
    /// Pick the top packs for escalation
    ///
    /// **Algorithm:**
    /// 1. Top `auto_pick` done packs labelled with the target action, updated
    ///    within the pick lookback window
    /// 2. If short, fill from the top packs of any label in the same window
    ///
    /// Returns the picked item ids and how many matched the target action.
    pub(super) async fn phase_auto_pick(
        &self,
        persona: &PersonaProfile,
        now: DateTime<Utc>,
    ) -> PipelineResult<(Vec<String>, usize)> {
        let started = self.stage_started(Stage::AutoPick);
        let pipeline = &self.config.pipeline;
        let want = pipeline.auto_pick;
        let since = now - Duration::hours(i64::from(pipeline.pick_lookback_hours));

        let mut picks: Vec<String> = self
            .store
            .top_packs(&persona.id, since, Some(pipeline.target_action), want)
            .await?
            .into_iter()
            .map(|pack| pack.item_id)
            .collect();
        let matched = picks.len();

        if picks.len() < want {
            // Over-fetch so already picked packs can be skipped
            let fill = self
                .store
                .top_packs(&persona.id, since, None, want + picks.len())
                .await?;
            for pack in fill {
                if picks.len() >= want {
                    break;
                }
                if !picks.contains(&pack.item_id) {
                    picks.push(pack.item_id);
                }
            }
        }

        self.stage_finished(
            Stage::AutoPick,
            started,
            format!(
                "Auto-pick: {} picked, {} labelled {}",
                picks.len(),
                matched,
                pipeline.target_action.as_str()
            ),
        );
        Ok((picks, matched))
    }

    /// Escalate every pick, isolating failures; returns surviving item ids
    /// in pick order
    pub(super) async fn phase_escalation(
        &self,
        persona: &PersonaProfile,
        picks: &[String],
        stats: &mut EscalationStats,
    ) -> PipelineResult<Vec<String>> {
        let started = self.stage_started(Stage::FullEscalate);
        let calls_before = self.meter.calls();
        let mut survivors = Vec::with_capacity(picks.len());

        for item_id in picks {
            match self.analysis.escalate_full(persona, item_id).await {
                Ok(report) => {
                    if report.escalated {
                        stats.escalated += 1;
                    } else {
                        stats.already_full += 1;
                    }
                    survivors.push(item_id.clone());
                }
                Err(e) if e.kind() == ErrorKind::Store => return Err(e),
                Err(e) => {
                    stats.failed += 1;
                    self.item_failed(Stage::FullEscalate, item_id, &e.to_string());
                }
            }
        }

        stats.calls = self.meter.calls() - calls_before;
        self.stage_finished(Stage::FullEscalate, started, stats.display_string());
        Ok(survivors)
    }
}
