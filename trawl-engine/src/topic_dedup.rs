//! Topic duplication detector
//!
//! Compares recently analyzed topic labels by token-set overlap and produces
//! an item id → penalty map for the next prefilter run.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::config::TopicDedupConfig;
use crate::error::PipelineResult;
use crate::store::SqliteStore;

/// Lowercase, drop everything but letters, digits and whitespace, collapse
/// whitespace
///
/// `char::is_alphanumeric` keeps CJK ideographs.
pub fn normalize(topic: &str) -> String {
    let cleaned: String = topic
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace token set of a normalized topic
///
/// ASCII plurals fold to their stem (`raises` → `raise`) so that inflection
/// alone does not hide an overlap.
pub fn tokens(normalized: &str) -> HashSet<String> {
    normalized.split_whitespace().map(fold_plural).collect()
}

fn fold_plural(token: &str) -> String {
    let is_ascii_word = token.chars().all(|c| c.is_ascii_alphabetic());
    if is_ascii_word && token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Penalty map over topic history
///
/// **Algorithm:**
/// 1. Walk `(item_id, topic)` newest first
/// 2. Skip topics that normalize to nothing
/// 3. Exact normalized match with a canonical entry → `-exact_penalty`
/// 4. Else max Jaccard ≥ `fuzzy_threshold` → `-fuzzy_penalty`
/// 5. Else the topic becomes a canonical entry (no penalty)
///
/// Items without a penalty are absent from the map.
pub fn compute_penalties(
    history: &[(String, String)],
    config: &TopicDedupConfig,
) -> HashMap<String, f64> {
    let mut canonical: Vec<(String, HashSet<String>)> = Vec::new();
    let mut penalties = HashMap::new();

    for (item_id, topic) in history {
        let normalized = normalize(topic);
        if normalized.is_empty() {
            continue;
        }
        let token_set = tokens(&normalized);

        let exact = canonical.iter().any(|(n, _)| *n == normalized);
        let best = canonical
            .iter()
            .map(|(_, t)| jaccard(&token_set, t))
            .fold(0.0_f64, f64::max);

        if exact {
            penalties.insert(item_id.clone(), -config.exact_penalty.abs());
        } else if !canonical.is_empty() && best >= config.fuzzy_threshold {
            penalties.insert(item_id.clone(), -config.fuzzy_penalty.abs());
        } else {
            canonical.push((normalized, token_set));
        }
    }

    penalties
}

/// Load the persona's recent topics and compute penalties
pub async fn topic_penalties(
    store: &SqliteStore,
    persona_id: &str,
    config: &TopicDedupConfig,
    now: DateTime<Utc>,
) -> PipelineResult<HashMap<String, f64>> {
    let since = now - Duration::hours(i64::from(config.lookback_hours));
    let history = store.recent_topics(persona_id, since).await?;
    let penalties = compute_penalties(&history, config);
    debug!(
        persona = %persona_id,
        history = history.len(),
        penalized = penalties.len(),
        "Topic penalties computed"
    );
    Ok(penalties)
}
