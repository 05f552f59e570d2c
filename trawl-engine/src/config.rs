//! Engine configuration
//!
//! Loaded from `trawl.toml` (see [`trawl_common::config::config_file_path`]).
//! Every section is optional; a missing file yields the defaults below.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use trawl_common::config::{load_toml_or_default, LoggingConfig};
use trawl_common::models::{ActionLabel, MergeStrategy, Platform};

use crate::error::{PipelineError, PipelineResult};

/// Environment variable carrying the AI backend API key
pub const API_KEY_ENV_VAR: &str = "TRAWL_AI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overrides the OS default root folder (`TRAWL_ROOT` still wins)
    pub root_folder: Option<PathBuf>,
    /// Directory of persona TOML files; defaults to `<root>/personas`
    pub personas_dir: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub heuristics: HeuristicsConfig,
    pub topic_dedup: TopicDedupConfig,
    pub analysis: AnalysisConfig,
    pub budget: BudgetConfig,
    pub ai: AiConfig,
    pub ingest: IngestConfig,
    pub pipeline: PipelineConfig,
}

// ============================================================================
// Heuristic Prefilter
// ============================================================================

/// Weight applied to each prefilter factor
///
/// The set is persona-independent. Weights need not sum to 1.0; the combined
/// score is clamped to [0, 100] regardless.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicWeights {
    pub freshness: f64,
    pub keyword: f64,
    pub trust: f64,
    pub language: f64,
    pub length: f64,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            freshness: 0.25,
            keyword: 0.30,
            trust: 0.20,
            language: 0.10,
            length: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicsConfig {
    pub weights: HeuristicWeights,
    /// Selection threshold on the clamped score
    pub threshold: f64,
    /// Below this many survivors, fall back to the top-N
    pub min_candidates: usize,
    pub fallback_top_n: usize,
    pub lookback_hours: u32,
    pub freshness_half_life_hours: f64,
    /// Per negative-keyword hit, subtracted from the capped keyword factor
    pub negative_keyword_penalty: f64,
    /// Subtracted from items flagged as cross-source duplicates
    pub duplicate_penalty: f64,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            weights: HeuristicWeights::default(),
            threshold: 65.0,
            min_candidates: 5,
            fallback_top_n: 10,
            lookback_hours: 48,
            freshness_half_life_hours: 24.0,
            negative_keyword_penalty: 10.0,
            duplicate_penalty: 20.0,
        }
    }
}

// ============================================================================
// Topic Dedup
// ============================================================================

/// Penalties are magnitudes; they are applied as negative adjustments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicDedupConfig {
    pub lookback_hours: u32,
    pub exact_penalty: f64,
    pub fuzzy_penalty: f64,
    /// Minimum Jaccard similarity for the fuzzy penalty
    pub fuzzy_threshold: f64,
}

impl Default for TopicDedupConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 72,
            exact_penalty: 30.0,
            fuzzy_penalty: 15.0,
            fuzzy_threshold: 0.5,
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Maximum characters of item text embedded in a prompt
    pub excerpt_chars: usize,
    /// Cache key component; bump to invalidate stored packs
    pub prompt_version: String,
    pub lite_max_tokens: u32,
    pub full_max_tokens: u32,
    pub compose_max_tokens: u32,
    pub temperature: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            excerpt_chars: 4000,
            prompt_version: "v1".to_string(),
            lite_max_tokens: 800,
            full_max_tokens: 2000,
            compose_max_tokens: 3000,
            temperature: 0.2,
        }
    }
}

// ============================================================================
// Budget
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_calls: u32,
    pub max_cost: f64,
    /// Estimated cost of one lite call
    pub per_call_cost: f64,
    /// Full call cost as a multiple of `per_call_cost`
    pub full_multiplier: f64,
    /// Compose call cost as a multiple of `per_call_cost`
    pub compose_multiplier: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_calls: 100,
            max_cost: 1.0,
            per_call_cost: 0.002,
            full_multiplier: 4.0,
            compose_multiplier: 6.0,
        }
    }
}

// ============================================================================
// AI Backend
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// OpenAI-compatible API root, without the `/chat/completions` suffix
    pub base_url: String,
    pub model: String,
    /// Prefer the `TRAWL_AI_API_KEY` environment variable
    pub api_key: Option<String>,
    /// Global ceiling on in-flight calls
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub requests_per_minute: Option<u32>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            concurrency: 4,
            timeout_secs: 60,
            requests_per_minute: None,
        }
    }
}

impl AiConfig {
    /// Resolve the API key
    ///
    /// **Priority:** environment variable, then TOML. An empty value counts as
    /// unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV_VAR) {
            if !key.trim().is_empty() {
                debug!("AI API key from environment");
                return Some(key);
            }
        }
        self.api_key
            .as_ref()
            .filter(|k| !k.trim().is_empty())
            .cloned()
    }
}

// ============================================================================
// Ingest / Pipeline
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Skip ingest when the latest fetch is newer than this
    pub staleness_minutes: u32,
    /// Directory of `<source_id>.json` item batches; defaults to `<root>/inbox`
    pub inbox_dir: Option<PathBuf>,
    /// Leading text characters hashed into the content fingerprint
    pub fingerprint_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            staleness_minutes: 60,
            inbox_dir: None,
            fingerprint_chars: 500,
        }
    }
}

/// Parameters of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub persona: Option<String>,
    /// Maximum candidates sent to lite scoring
    pub lite_budget: usize,
    /// Packs escalated to full tier
    pub auto_pick: usize,
    pub target_action: ActionLabel,
    pub pick_lookback_hours: u32,
    pub platform: Platform,
    pub merge_strategy: MergeStrategy,
    pub commentary: String,
    /// Re-score lite packs even when cached under the current prompt version
    pub force_refresh: bool,
    /// Proceed even when the budget plan exceeds a ceiling
    pub override_budget: bool,
    /// Upper bound on SQLite lock retries per write
    pub max_lock_wait_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            persona: None,
            lite_budget: 30,
            auto_pick: 3,
            target_action: ActionLabel::WriteWorthy,
            pick_lookback_hours: 48,
            platform: Platform::Blog,
            merge_strategy: MergeStrategy::Synthesis,
            commentary: String::new(),
            force_refresh: false,
            override_budget: false,
            max_lock_wait_ms: 5000,
        }
    }
}

impl EngineConfig {
    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let config: EngineConfig = load_toml_or_default(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        let h = &self.heuristics;
        let w = &h.weights;
        if [w.freshness, w.keyword, w.trust, w.language, w.length]
            .iter()
            .any(|v| *v < 0.0 || !v.is_finite())
        {
            return Err(PipelineError::Config(
                "heuristics.weights must be finite and non-negative".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&h.threshold) {
            return Err(PipelineError::Config(format!(
                "heuristics.threshold {} outside [0, 100]",
                h.threshold
            )));
        }
        if h.freshness_half_life_hours <= 0.0 {
            return Err(PipelineError::Config(
                "heuristics.freshness_half_life_hours must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.topic_dedup.fuzzy_threshold) {
            return Err(PipelineError::Config(
                "topic_dedup.fuzzy_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.ai.concurrency == 0 {
            return Err(PipelineError::Config("ai.concurrency must be at least 1".to_string()));
        }
        if self.ai.timeout_secs == 0 {
            return Err(PipelineError::Config("ai.timeout_secs must be at least 1".to_string()));
        }
        if self.analysis.excerpt_chars == 0 {
            return Err(PipelineError::Config(
                "analysis.excerpt_chars must be at least 1".to_string(),
            ));
        }
        if self.budget.per_call_cost < 0.0 || self.budget.max_cost < 0.0 {
            return Err(PipelineError::Config("budget costs must be non-negative".to_string()));
        }
        if h.threshold > 0.0 && h.fallback_top_n < h.min_candidates {
            warn!(
                fallback_top_n = h.fallback_top_n,
                min_candidates = h.min_candidates,
                "Fallback top-N is smaller than the minimum candidate count"
            );
        }
        Ok(())
    }
}
