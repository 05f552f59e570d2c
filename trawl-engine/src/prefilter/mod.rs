//! Heuristic prefilter
//!
//! Scores every candidate in the lookback window without external calls,
//! persists every score under the weight-version tag, and selects the
//! candidates worth sending to lite analysis.

pub mod heuristics;

use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use trawl_common::models::{CandidateItem, HeuristicScore};
use trawl_common::PersonaProfile;

use crate::config::HeuristicsConfig;
use crate::error::PipelineResult;
use crate::store::{Repository, ScoreKey, SqliteStore};

pub use heuristics::version_tag;

/// Scored candidate, in ranking order
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub item: CandidateItem,
    pub score: HeuristicScore,
}

#[derive(Debug, Clone, Default)]
pub struct PrefilterOutcome {
    pub version: String,
    /// Every scored candidate, best first
    pub ranked: Vec<RankedCandidate>,
    /// Ids selected for lite analysis, best first
    pub selected: Vec<String>,
    /// Selection fell back to top-N because too few passed the threshold
    pub used_fallback: bool,
}

impl PrefilterOutcome {
    /// Selected candidates, best first
    pub fn selected_items(&self) -> Vec<&CandidateItem> {
        let selected: HashSet<&str> = self.selected.iter().map(String::as_str).collect();
        self.ranked
            .iter()
            .filter(|c| selected.contains(c.item.id.as_str()))
            .map(|c| &c.item)
            .collect()
    }
}

/// Effective lookback: the tighter of the run window and the persona age limit
pub fn lookback_hours(config: &HeuristicsConfig, persona: &PersonaProfile) -> u32 {
    match persona.constraints.max_age_hours {
        Some(max_age) => config.lookback_hours.min(max_age),
        None => config.lookback_hours,
    }
}

/// Score and rank `items` (pure; nothing is persisted)
///
/// **Ranking:** score descending, then newer publish time, then item id.
pub fn rank_items(
    items: Vec<CandidateItem>,
    persona: &PersonaProfile,
    config: &HeuristicsConfig,
    topic_penalties: &HashMap<String, f64>,
    now: DateTime<Utc>,
) -> Vec<RankedCandidate> {
    let version = version_tag(config);

    let mut ranked: Vec<RankedCandidate> = items
        .into_iter()
        .map(|item| {
            let penalty = topic_penalties.get(&item.id).copied().unwrap_or(0.0);
            let (score, breakdown) = heuristics::score_item(
                &item,
                &persona.signals,
                &persona.constraints,
                config,
                penalty,
                now,
            );
            let score = HeuristicScore {
                item_id: item.id.clone(),
                persona_id: persona.id.clone(),
                version: version.clone(),
                score,
                breakdown,
                computed_at: now,
            };
            RankedCandidate { item, score }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .score
            .partial_cmp(&a.score.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.item.published_at.cmp(&a.item.published_at))
            .then_with(|| a.item.id.cmp(&b.item.id))
    });
    ranked
}

/// Threshold selection with top-N fallback
///
/// Returns the selected ids and whether the fallback applied.
pub fn select(ranked: &[RankedCandidate], config: &HeuristicsConfig) -> (Vec<String>, bool) {
    let passing: Vec<String> = ranked
        .iter()
        .filter(|c| c.score.score >= config.threshold)
        .map(|c| c.item.id.clone())
        .collect();

    if passing.len() >= config.min_candidates {
        return (passing, false);
    }

    let fallback = ranked
        .iter()
        .take(config.fallback_top_n.max(passing.len()))
        .map(|c| c.item.id.clone())
        .collect();
    (fallback, true)
}

/// Prefilter stage bound to a store
pub struct Prefilter {
    store: SqliteStore,
    config: HeuristicsConfig,
}

impl Prefilter {
    pub fn new(store: SqliteStore, config: HeuristicsConfig) -> Self {
        Self { store, config }
    }

    pub fn version(&self) -> String {
        version_tag(&self.config)
    }

    /// Score the lookback window for `persona`, persist every score, select
    pub async fn run(
        &self,
        persona: &PersonaProfile,
        topic_penalties: &HashMap<String, f64>,
        now: DateTime<Utc>,
    ) -> PipelineResult<PrefilterOutcome> {
        let hours = lookback_hours(&self.config, persona);
        let since = now - Duration::hours(i64::from(hours));
        let items = self.store.items_published_since(since).await?;

        let ranked = rank_items(items, persona, &self.config, topic_penalties, now);
        for candidate in &ranked {
            self.store
                .save_or_update(&ScoreKey::of(&candidate.score), &candidate.score)
                .await?;
        }

        let (selected, used_fallback) = select(&ranked, &self.config);
        if used_fallback {
            debug!(
                persona = %persona.id,
                threshold = self.config.threshold,
                min_candidates = self.config.min_candidates,
                "Too few candidates above threshold, using top-N fallback"
            );
        }

        info!(
            persona = %persona.id,
            lookback_hours = hours,
            scored = ranked.len(),
            selected = selected.len(),
            used_fallback,
            "Prefilter complete"
        );

        Ok(PrefilterOutcome {
            version: self.version(),
            ranked,
            selected,
            used_fallback,
        })
    }
}
