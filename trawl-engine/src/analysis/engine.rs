//! Lite and full analysis over (item, persona) pairs

use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use trawl_common::models::{
    ActionLabel, AnalysisPack, CandidateItem, PackStatus, Tier, TokenUsage,
};
use trawl_common::PersonaProfile;

use super::{prompts, schemas};
use crate::ai::{AiBackend, SpendMeter};
use crate::config::AnalysisConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::store::{PackKey, Repository, SqliteStore};
use crate::validation::{call_validated, RecordSchema, SchemaCache, SchemaKind};

/// Default number of lite calls driven at once; the backend gate still caps
/// in-flight requests
const DEFAULT_PARALLELISM: usize = 4;

/// Outcome of one lite batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiteReport {
    pub scored: usize,
    pub cache_hits: usize,
    pub failed: usize,
    /// AI calls issued, repair calls included
    pub calls: u32,
    pub usage: TokenUsage,
    /// `(item_id, error)` for every failed unit
    pub failures: Vec<(String, String)>,
}

/// Outcome of one full escalation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FullReport {
    /// False when the pack was already full tier
    pub escalated: bool,
    pub calls: u32,
    pub usage: TokenUsage,
}

enum LiteUnit {
    CacheHit,
    Scored { calls: u32, usage: TokenUsage },
    Failed { item_id: String, error: String, calls: u32, usage: TokenUsage },
}

pub struct AnalysisEngine {
    backend: Arc<dyn AiBackend>,
    store: SqliteStore,
    config: AnalysisConfig,
    schemas: Arc<SchemaCache>,
    meter: Arc<SpendMeter>,
    parallelism: usize,
}

impl AnalysisEngine {
    pub fn new(backend: Arc<dyn AiBackend>, store: SqliteStore, config: AnalysisConfig) -> Self {
        Self {
            backend,
            store,
            config,
            schemas: Arc::new(SchemaCache::new()),
            meter: Arc::new(SpendMeter::new()),
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    /// Share a spend meter with other stages
    pub fn with_meter(mut self, meter: Arc<SpendMeter>) -> Self {
        self.meter = meter;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn meter(&self) -> &Arc<SpendMeter> {
        &self.meter
    }

    pub fn prompt_version(&self) -> &str {
        &self.config.prompt_version
    }

    fn lite_schema(&self, persona: &PersonaProfile) -> Arc<RecordSchema> {
        self.schemas
            .get_or_build(persona.identity_key(), SchemaKind::Lite, || schemas::lite_schema(persona))
    }

    fn full_schema(&self, persona: &PersonaProfile) -> Arc<RecordSchema> {
        self.schemas
            .get_or_build(persona.identity_key(), SchemaKind::Full, || schemas::full_schema(persona))
    }

    /// Lite-score `items`, skipping cached packs unless `force_refresh`
    ///
    /// Per-item failures (transport or validation) are recorded as failed packs
    /// and counted; they never abort the batch. Store errors do.
    pub async fn score_lite(
        &self,
        persona: &PersonaProfile,
        items: &[CandidateItem],
        force_refresh: bool,
    ) -> PipelineResult<LiteReport> {
        let start = Instant::now();
        let schema = self.lite_schema(persona);

        let units: Vec<PipelineResult<LiteUnit>> = stream::iter(items)
            .map(|item| self.score_one(persona, item, &schema, force_refresh))
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        let mut report = LiteReport::default();
        for unit in units {
            match unit? {
                LiteUnit::CacheHit => report.cache_hits += 1,
                LiteUnit::Scored { calls, usage } => {
                    report.scored += 1;
                    report.calls += calls;
                    report.usage.add(usage);
                }
                LiteUnit::Failed {
                    item_id,
                    error,
                    calls,
                    usage,
                } => {
                    report.failed += 1;
                    report.calls += calls;
                    report.usage.add(usage);
                    report.failures.push((item_id, error));
                }
            }
        }
        report.failures.sort();

        info!(
            persona = %persona.id,
            scored = report.scored,
            cache_hits = report.cache_hits,
            failed = report.failed,
            calls = report.calls,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Lite scoring complete"
        );
        Ok(report)
    }

    async fn score_one(
        &self,
        persona: &PersonaProfile,
        item: &CandidateItem,
        schema: &RecordSchema,
        force_refresh: bool,
    ) -> PipelineResult<LiteUnit> {
        let key = PackKey::new(&item.id, &persona.id);
        let existing: Option<AnalysisPack> = self.store.find(&key).await?;

        if let Some(pack) = &existing {
            // Full tier is never regressed, even on force refresh
            if pack.tier == Tier::Full {
                return Ok(LiteUnit::CacheHit);
            }
            if !force_refresh && pack.is_done() && pack.prompt_version == self.config.prompt_version {
                debug!(item_id = %item.id, persona = %persona.id, "Lite cache hit");
                return Ok(LiteUnit::CacheHit);
            }
        }

        let request = prompts::lite_request(persona, item, schema, &self.config);
        let outcome = call_validated(self.backend.as_ref(), &request, schema).await;
        let (calls, usage) = (outcome.stats.calls, outcome.stats.usage);
        self.meter.record(calls, usage);

        let model = outcome
            .model
            .unwrap_or_else(|| self.backend.model_id().to_string());
        let built = outcome.result.map_err(|e| e.to_string()).and_then(|record| {
            pack_from_record(persona, &item.id, Tier::Lite, &record, &model, &self.config.prompt_version, usage)
        });

        match built {
            Ok(pack) => {
                self.store.save_or_update(&key, &pack).await?;
                Ok(LiteUnit::Scored { calls, usage })
            }
            Err(error) => {
                warn!(item_id = %item.id, persona = %persona.id, error = %error, "Lite scoring failed");
                let mut failed = AnalysisPack::failed(
                    &item.id,
                    &persona.id,
                    Tier::Lite,
                    &model,
                    &self.config.prompt_version,
                    error.clone(),
                );
                failed.usage = usage;
                self.store.save_or_update(&key, &failed).await?;
                Ok(LiteUnit::Failed {
                    item_id: item.id.clone(),
                    error,
                    calls,
                    usage,
                })
            }
        }
    }

    /// Escalate one item to full tier
    ///
    /// No-op when the pack is already full and done. Errors propagate; the
    /// existing lite pack is left untouched on failure.
    pub async fn escalate_full(
        &self,
        persona: &PersonaProfile,
        item_id: &str,
    ) -> PipelineResult<FullReport> {
        let key = PackKey::new(item_id, &persona.id);
        let existing: Option<AnalysisPack> = self.store.find(&key).await?;
        if existing.as_ref().is_some_and(|p| p.is_full_done()) {
            debug!(item_id, persona = %persona.id, "Already full tier");
            return Ok(FullReport::default());
        }

        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or_else(|| PipelineError::Precondition {
                message: "item not found".to_string(),
                ids: vec![item_id.to_string()],
            })?;

        let start = Instant::now();
        let schema = self.full_schema(persona);
        let request = prompts::full_request(persona, &item, &schema, &self.config);
        let outcome = call_validated(self.backend.as_ref(), &request, &schema).await;
        let (calls, usage) = (outcome.stats.calls, outcome.stats.usage);
        self.meter.record(calls, usage);

        let record = outcome.result?;
        let model = outcome
            .model
            .unwrap_or_else(|| self.backend.model_id().to_string());
        let pack = pack_from_record(
            persona,
            item_id,
            Tier::Full,
            &record,
            &model,
            &self.config.prompt_version,
            usage,
        )
        .map_err(|e| PipelineError::Validation {
            schema: schema.name().to_string(),
            original: e,
            repair: "not attempted".to_string(),
        })?;
        self.store.save_or_update(&key, &pack).await?;

        info!(
            item_id,
            persona = %persona.id,
            calls,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Escalated to full tier"
        );
        Ok(FullReport {
            escalated: true,
            calls,
            usage,
        })
    }
}

// ============================================================================
// Record → pack
// ============================================================================

fn text(record: &Map<String, Value>, name: &str) -> Option<String> {
    record.get(name).and_then(Value::as_str).map(str::to_string)
}

fn text_list(record: &Map<String, Value>, name: &str) -> Vec<String> {
    record
        .get(name)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Weighted mean of dimension scores using the persona's weights
pub fn overall_score(persona: &PersonaProfile, scores: &BTreeMap<String, f64>) -> f64 {
    let total: f64 = persona
        .dimensions
        .iter()
        .map(|d| d.weight * scores.get(&d.key).copied().unwrap_or(0.0))
        .sum();
    (total * 100.0).round() / 100.0
}

/// Build a done pack from a validated record
fn pack_from_record(
    persona: &PersonaProfile,
    item_id: &str,
    tier: Tier,
    record: &Map<String, Value>,
    model: &str,
    prompt_version: &str,
    usage: TokenUsage,
) -> Result<AnalysisPack, String> {
    let dimension_scores: BTreeMap<String, f64> = record
        .get("dimension_scores")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
                .collect()
        })
        .unwrap_or_default();

    let action: ActionLabel = text(record, "action")
        .ok_or_else(|| "missing action".to_string())?
        .parse()
        .map_err(|e: trawl_common::Error| e.to_string())?;

    Ok(AnalysisPack {
        item_id: item_id.to_string(),
        persona_id: persona.id.clone(),
        tier,
        status: PackStatus::Done,
        topic: text(record, "topic"),
        summary_short: text(record, "summary_short"),
        summary_long: text(record, "summary_long"),
        overall_score: Some(overall_score(persona, &dimension_scores)),
        dimension_scores,
        action: Some(action),
        reasons: text_list(record, "reasons"),
        suggested_angle: text(record, "suggested_angle"),
        key_points: text_list(record, "key_points"),
        quotes: text_list(record, "quotes"),
        model: model.to_string(),
        prompt_version: prompt_version.to_string(),
        usage,
        error: None,
        updated_at: trawl_common::time::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use trawl_common::persona::ScoringDimension;

    #[test]
    fn test_overall_score_is_weighted() {
        let mut persona: PersonaProfile = toml::from_str(
            r#"
            id = "p"
            name = "P"
            [[dimensions]]
            key = "a"
            weight = 0.75
            [[dimensions]]
            key = "b"
            weight = 0.25
            "#,
        )
        .unwrap();
        let scores = BTreeMap::from([("a".to_string(), 80.0), ("b".to_string(), 40.0)]);
        assert_eq!(overall_score(&persona, &scores), 70.0);

        persona.dimensions.push(ScoringDimension {
            key: "c".to_string(),
            weight: 0.0,
            description: String::new(),
        });
        assert_eq!(overall_score(&persona, &scores), 70.0);
    }
}
