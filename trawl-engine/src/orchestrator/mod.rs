//! Pipeline orchestrator
//!
//! Drives one persona run end to end:
//!
//! INGEST → PREFILTER → LITE SCORE → AUTO-PICK → FULL ESCALATE → COMPOSE
//!
//! # Architecture
//! The budget plan and the Go/No-Go decision come first and are the only
//! cancellation point; nothing is fetched, written or called before both
//! pass. Each stage lives in a `phase_*` module as an `impl` block on
//! [`PipelineOrchestrator`]. Stages report through the [`EventBus`] and fill
//! in [`RunStatistics`].
//!
//! Failure isolation follows the unit of work: a failed source, lite item or
//! escalation is logged, emitted as an event and skipped. Store errors and
//! terminal preconditions end the run.

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use trawl_common::events::{EventBus, PipelineEvent, Stage};
use trawl_common::models::{Draft, TokenUsage};
use trawl_common::persona::PersonaRegistry;
use trawl_common::time;
use trawl_common::PersonaProfile;

use crate::ai::{AiBackend, SpendMeter};
use crate::analysis::AnalysisEngine;
use crate::compose::Composer;
use crate::config::EngineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ingest::SourceFeed;
use crate::store::SqliteStore;

pub mod budget;
pub mod gate;
pub mod statistics;

mod phase_compose;
mod phase_escalation;
mod phase_ingest;
mod phase_scoring;

pub use budget::BudgetPlan;
pub use gate::{AutoApprove, CostLimit, Decision, Deny, GoNoGo};
pub use statistics::RunStatistics;

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Composed draft, ready for export
    pub draft: Draft,
    pub statistics: RunStatistics,
}

pub struct PipelineOrchestrator {
    store: SqliteStore,
    config: EngineConfig,
    personas: PersonaRegistry,
    sources: Vec<Box<dyn SourceFeed>>,
    events: EventBus,
    gate: Box<dyn GoNoGo>,
    meter: Arc<SpendMeter>,
    analysis: AnalysisEngine,
    composer: Composer,
}

impl PipelineOrchestrator {
    /// Build an orchestrator with no sources, a private event bus and an
    /// auto-approving gate
    pub fn new(
        store: SqliteStore,
        backend: Arc<dyn AiBackend>,
        config: EngineConfig,
        personas: PersonaRegistry,
    ) -> Self {
        let meter = Arc::new(SpendMeter::new());
        let analysis = AnalysisEngine::new(backend.clone(), store.clone(), config.analysis.clone())
            .with_meter(meter.clone());
        let composer =
            Composer::new(backend, store.clone(), config.analysis.clone()).with_meter(meter.clone());

        Self {
            store,
            config,
            personas,
            sources: Vec::new(),
            events: EventBus::default(),
            gate: Box::new(AutoApprove),
            meter,
            analysis,
            composer,
        }
    }

    pub fn with_sources(mut self, sources: Vec<Box<dyn SourceFeed>>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_gate(mut self, gate: Box<dyn GoNoGo>) -> Self {
        self.gate = gate;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Budget plan for the configured run sizes
    pub fn plan(&self) -> BudgetPlan {
        let pipeline = &self.config.pipeline;
        BudgetPlan::new(
            pipeline.lite_budget as u32,
            pipeline.auto_pick as u32,
            1,
            &self.config.budget,
        )
    }

    /// Run the whole pipeline for one persona
    ///
    /// **Algorithm:**
    /// 1. Resolve the persona; unknown ids are a precondition error
    /// 2. Check the budget plan against the ceilings (unless overridden)
    /// 3. Ask the Go/No-Go gate; a refusal aborts with no side effects
    /// 4. Run the stages in order, then emit `RunFinished`
    pub async fn run(&self, persona_id: &str) -> PipelineResult<RunOutcome> {
        let persona = self
            .personas
            .get(persona_id)
            .ok_or_else(|| PipelineError::Precondition {
                message: "unknown persona".to_string(),
                ids: vec![persona_id.to_string()],
            })?;

        let plan = self.plan();
        plan.check(&self.config.budget, self.config.pipeline.override_budget)?;

        if let Decision::NoGo(reason) = self.gate.decide(&plan) {
            warn!(persona = %persona.id, reason = %reason, "Run declined at Go/No-Go");
            return Err(PipelineError::Aborted(reason));
        }

        info!(persona = %persona.id, "{}", plan.display_string());
        self.events.emit_lossy(PipelineEvent::RunStarted {
            persona_id: persona.id.clone(),
            planned_calls: plan.total_calls(),
            estimated_cost: plan.estimated_cost,
            timestamp: time::now(),
        });

        let result = self.execute(persona, plan).await;

        self.events.emit_lossy(PipelineEvent::RunFinished {
            persona_id: persona.id.clone(),
            draft_id: result.as_ref().ok().map(|outcome| outcome.draft.id),
            timestamp: time::now(),
        });

        match &result {
            Ok(outcome) => {
                for line in outcome.statistics.summary_lines() {
                    info!(persona = %persona.id, "{}", line);
                }
            }
            Err(e) => warn!(persona = %persona.id, kind = e.kind().as_str(), error = %e, "Run failed"),
        }
        result
    }

    async fn execute(&self, persona: &PersonaProfile, plan: BudgetPlan) -> PipelineResult<RunOutcome> {
        let started = Instant::now();
        let now = time::now();
        let calls_before = self.meter.calls();
        let usage_before = self.meter.usage();
        let mut stats = RunStatistics::new(&persona.id, plan);

        stats.ingest = self.phase_ingest(now).await?;

        let (prefilter, selected) = self.phase_prefilter(persona, now).await?;
        stats.prefilter = prefilter;

        stats.lite = self.phase_lite(persona, selected).await?;

        let (picks, matched_target) = self.phase_auto_pick(persona, now).await?;
        stats.escalation.picked = picks.len();
        stats.escalation.matched_target = matched_target;

        let survivors = self
            .phase_escalation(persona, &picks, &mut stats.escalation)
            .await?;
        if survivors.is_empty() {
            return Err(PipelineError::Precondition {
                message: "no item survived full escalation".to_string(),
                ids: picks,
            });
        }

        let (draft, compose) = self.phase_compose(persona, survivors).await?;
        stats.compose = compose;

        let usage = self.meter.usage();
        stats.actual_calls = self.meter.calls() - calls_before;
        stats.usage = TokenUsage {
            prompt_tokens: usage.prompt_tokens - usage_before.prompt_tokens,
            completion_tokens: usage.completion_tokens - usage_before.completion_tokens,
        };
        stats.actual_cost = budget::estimate_cost(
            stats.lite.calls,
            stats.escalation.calls,
            stats.compose.calls,
            &self.config.budget,
        );
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        Ok(RunOutcome { draft, statistics: stats })
    }

    // ========================================================================
    // Stage events
    // ========================================================================

    fn stage_started(&self, stage: Stage) -> Instant {
        self.events.emit_lossy(PipelineEvent::StageStarted {
            stage,
            timestamp: time::now(),
        });
        Instant::now()
    }

    fn stage_finished(&self, stage: Stage, started: Instant, summary: String) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(stage = stage.as_str(), elapsed_ms, "{}", summary);
        self.events.emit_lossy(PipelineEvent::StageFinished {
            stage,
            summary,
            elapsed_ms,
            timestamp: time::now(),
        });
    }

    fn item_failed(&self, stage: Stage, item_id: &str, error: &str) {
        warn!(stage = stage.as_str(), item_id, error, "Unit failed, continuing");
        self.events.emit_lossy(PipelineEvent::ItemFailed {
            stage,
            item_id: item_id.to_string(),
            error: error.to_string(),
            timestamp: time::now(),
        });
    }
}
