//! Run statistics
//!
//! One struct per stage, each rendering its own summary line, aggregated into
//! [`RunStatistics`] for the caller and for `StageFinished` events.

use serde::Serialize;
use trawl_common::models::TokenUsage;

use super::budget::BudgetPlan;

/// **Ingest** - "skipped (fresh)" or "N sources, M new items, K duplicates"
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    /// Latest fetch was inside the staleness window
    pub skipped: bool,
    pub sources_fetched: usize,
    pub sources_failed: usize,
    pub items_seen: usize,
    pub items_new: usize,
    pub duplicates_flagged: usize,
}

impl IngestStats {
    pub fn display_string(&self) -> String {
        if self.skipped {
            return "Ingest: skipped (sources fresh)".to_string();
        }
        format!(
            "Ingest: {} sources ({} failed), {} items seen, {} new, {} duplicates",
            self.sources_fetched + self.sources_failed,
            self.sources_failed,
            self.items_seen,
            self.items_new,
            self.duplicates_flagged
        )
    }
}

/// **Prefilter** - "N scored, M selected"
#[derive(Debug, Clone, Default, Serialize)]
pub struct PrefilterStats {
    pub version: String,
    pub scored: usize,
    pub selected: usize,
    pub used_fallback: bool,
    /// Topics carrying a repetition penalty
    pub penalized_topics: usize,
}

impl PrefilterStats {
    pub fn display_string(&self) -> String {
        let fallback = if self.used_fallback { " (top-N fallback)" } else { "" };
        format!(
            "Prefilter [{}]: {} scored, {} selected{}, {} penalized topics",
            self.version, self.scored, self.selected, fallback, self.penalized_topics
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LiteStats {
    pub requested: usize,
    pub scored: usize,
    pub cache_hits: usize,
    pub failed: usize,
    pub calls: u32,
}

impl LiteStats {
    pub fn display_string(&self) -> String {
        format!(
            "Lite: {} requested, {} scored, {} cached, {} failed ({} calls)",
            self.requested, self.scored, self.cache_hits, self.failed, self.calls
        )
    }
}

/// Picks and how they fared in escalation
#[derive(Debug, Clone, Default, Serialize)]
pub struct EscalationStats {
    pub picked: usize,
    /// Picks carrying the target action label
    pub matched_target: usize,
    pub escalated: usize,
    pub already_full: usize,
    pub failed: usize,
    pub calls: u32,
}

impl EscalationStats {
    pub fn survivors(&self) -> usize {
        self.escalated + self.already_full
    }

    pub fn display_string(&self) -> String {
        format!(
            "Full: {} picked ({} on target), {} escalated, {} already full, {} failed ({} calls)",
            self.picked,
            self.matched_target,
            self.escalated,
            self.already_full,
            self.failed,
            self.calls
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ComposeStats {
    pub items: usize,
    pub calls: u32,
}

impl ComposeStats {
    pub fn display_string(&self) -> String {
        format!("Compose: {} items merged ({} calls)", self.items, self.calls)
    }
}

/// Aggregate statistics for one run
#[derive(Debug, Clone, Serialize)]
pub struct RunStatistics {
    pub persona_id: String,
    pub plan: BudgetPlan,
    pub ingest: IngestStats,
    pub prefilter: PrefilterStats,
    pub lite: LiteStats,
    pub escalation: EscalationStats,
    pub compose: ComposeStats,
    /// Calls actually issued, failed and repair calls included
    pub actual_calls: u32,
    pub usage: TokenUsage,
    /// Actual calls priced at the per-call estimate
    pub actual_cost: f64,
    pub elapsed_ms: u64,
}

impl RunStatistics {
    pub fn new(persona_id: &str, plan: BudgetPlan) -> Self {
        Self {
            persona_id: persona_id.to_string(),
            plan,
            ingest: IngestStats::default(),
            prefilter: PrefilterStats::default(),
            lite: LiteStats::default(),
            escalation: EscalationStats::default(),
            compose: ComposeStats::default(),
            actual_calls: 0,
            usage: TokenUsage::default(),
            actual_cost: 0.0,
            elapsed_ms: 0,
        }
    }

    /// One line per stage, then totals
    pub fn summary_lines(&self) -> Vec<String> {
        vec![
            self.plan.display_string(),
            self.ingest.display_string(),
            self.prefilter.display_string(),
            self.lite.display_string(),
            self.escalation.display_string(),
            self.compose.display_string(),
            format!(
                "Total: {} calls, {} tokens ({} prompt / {} completion), cost {:.4} actual vs {:.4} planned, {} ms",
                self.actual_calls,
                self.usage.total(),
                self.usage.prompt_tokens,
                self.usage.completion_tokens,
                self.actual_cost,
                self.plan.estimated_cost,
                self.elapsed_ms
            ),
        ]
    }
}
