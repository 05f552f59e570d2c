//! Zero-cost heuristic factors
//!
//! Each factor maps one item attribute to [0, 100]. Missing attributes score a
//! neutral midpoint instead of failing.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use trawl_common::models::{CandidateItem, FactorBreakdown};
use trawl_common::persona::{PersonaConstraints, PersonaSignals};
use trawl_common::time::age_hours;

use crate::config::HeuristicsConfig;

pub const NEUTRAL: f64 = 50.0;
pub const FRESHNESS_FLOOR: f64 = 5.0;
pub const TRUSTED_SCORE: f64 = 90.0;
pub const BLOCKED_SCORE: f64 = 10.0;
/// Keyword factor ceiling once any negative keyword matches
pub const NEGATIVE_KEYWORD_CAP: f64 = 30.0;
/// Above this many words the length factor drops to [`OVERLONG_SCORE`]
pub const OVERLONG_WORDS: u32 = 10_000;
pub const OVERLONG_SCORE: f64 = 80.0;

/// `100 · 2^(−age / half_life)`, floor 5; future-dated items count as age 0
pub fn freshness(published_at: DateTime<Utc>, now: DateTime<Utc>, half_life_hours: f64) -> f64 {
    let age = age_hours(published_at, now);
    (100.0 * (-age / half_life_hours).exp2()).max(FRESHNESS_FLOOR)
}

/// Positive-keyword ratio scaled into [20, 100]
///
/// No positive keywords configured scores neutral. Any negative hit caps the
/// result at 30, then subtracts `negative_penalty` per distinct negative
/// keyword found, floor 0. Matching is case-insensitive substring search.
pub fn keyword_match(haystack: &str, signals: &PersonaSignals, negative_penalty: f64) -> f64 {
    let haystack = haystack.to_lowercase();
    let contains = |kw: &String| {
        let kw = kw.trim().to_lowercase();
        !kw.is_empty() && haystack.contains(&kw)
    };

    let positives: Vec<&String> = signals
        .positive_keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .collect();
    let base = if positives.is_empty() {
        NEUTRAL
    } else {
        let matched = positives.iter().filter(|k| contains(k)).count();
        20.0 + 80.0 * matched as f64 / positives.len() as f64
    };

    let negative_hits = signals.negative_keywords.iter().filter(|k| contains(k)).count();
    if negative_hits == 0 {
        base
    } else {
        (base.min(NEGATIVE_KEYWORD_CAP) - negative_penalty * negative_hits as f64).max(0.0)
    }
}

/// 90 for trusted domains, 10 for blocked ones, else 50
///
/// A subdomain matches its parent entry; a leading `www.` is ignored. The
/// block list wins when a domain appears on both.
pub fn source_trust(domain: &str, signals: &PersonaSignals) -> f64 {
    let domain = normalize_domain(domain);
    if domain.is_empty() {
        return NEUTRAL;
    }
    if signals.blocked_domains.iter().any(|entry| domain_matches(&domain, entry)) {
        BLOCKED_SCORE
    } else if signals.trusted_domains.iter().any(|entry| domain_matches(&domain, entry)) {
        TRUSTED_SCORE
    } else {
        NEUTRAL
    }
}

fn normalize_domain(domain: &str) -> String {
    let lower = domain.trim().trim_end_matches('.').to_lowercase();
    lower.strip_prefix("www.").map(str::to_string).unwrap_or(lower)
}

fn domain_matches(domain: &str, entry: &str) -> bool {
    let entry = normalize_domain(entry);
    !entry.is_empty() && (domain == entry || domain.ends_with(&format!(".{}", entry)))
}

/// Binary against the allowed list; unknown language is neutral, an empty
/// list accepts everything
pub fn language_match(language: Option<&str>, constraints: &PersonaConstraints) -> f64 {
    if constraints.languages.is_empty() {
        return 100.0;
    }
    match language.map(str::trim).filter(|l| !l.is_empty()) {
        None => NEUTRAL,
        Some(lang) => {
            let primary = lang.split(['-', '_']).next().unwrap_or(lang);
            let allowed = constraints
                .languages
                .iter()
                .any(|a| a.eq_ignore_ascii_case(lang) || a.eq_ignore_ascii_case(primary));
            if allowed {
                100.0
            } else {
                0.0
            }
        }
    }
}

/// Linear ramp below the minimum, flat 100 in range, 80 when overlong
pub fn length_sanity(word_count: Option<u32>, min_words: u32) -> f64 {
    match word_count {
        None => NEUTRAL,
        Some(wc) if wc > OVERLONG_WORDS => OVERLONG_SCORE,
        Some(wc) if min_words > 0 && wc < min_words => 100.0 * wc as f64 / min_words as f64,
        Some(_) => 100.0,
    }
}

/// Score one item: weighted factor sum plus penalties, clamped to [0, 100]
///
/// `topic_penalty` is zero or negative.
pub fn score_item(
    item: &CandidateItem,
    signals: &PersonaSignals,
    constraints: &PersonaConstraints,
    config: &HeuristicsConfig,
    topic_penalty: f64,
    now: DateTime<Utc>,
) -> (f64, FactorBreakdown) {
    let haystack = format!("{}\n{}", item.title, item.text);
    let breakdown = FactorBreakdown {
        freshness: freshness(item.published_at, now, config.freshness_half_life_hours),
        keyword: keyword_match(&haystack, signals, config.negative_keyword_penalty),
        trust: source_trust(&item.source_domain, signals),
        language: language_match(item.language.as_deref(), constraints),
        length: length_sanity(item.word_count, constraints.min_words),
        duplicate_penalty: if item.is_duplicate { -config.duplicate_penalty.abs() } else { 0.0 },
        topic_penalty: -topic_penalty.abs(),
    };

    let w = &config.weights;
    let weighted = w.freshness * breakdown.freshness
        + w.keyword * breakdown.keyword
        + w.trust * breakdown.trust
        + w.language * breakdown.language
        + w.length * breakdown.length;

    let score = (weighted + breakdown.duplicate_penalty + breakdown.topic_penalty).clamp(0.0, 100.0);
    (score, breakdown)
}

/// Cache version tag for a heuristic configuration
///
/// `hw-` plus the first 16 hex characters of SHA-256 over a canonical
/// rendering of every parameter that changes a score. Threshold and selection
/// sizes do not participate.
pub fn version_tag(config: &HeuristicsConfig) -> String {
    let w = &config.weights;
    let canonical = format!(
        "freshness={:.6};keyword={:.6};trust={:.6};language={:.6};length={:.6};\
         half_life={:.6};negative_penalty={:.6};duplicate_penalty={:.6}",
        w.freshness,
        w.keyword,
        w.trust,
        w.language,
        w.length,
        config.freshness_half_life_hours,
        config.negative_keyword_penalty,
        config.duplicate_penalty,
    );
    let digest = Sha256::digest(canonical.as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("hw-{}", hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn signals() -> PersonaSignals {
        PersonaSignals {
            positive_keywords: vec!["OpenAI".into(), "funding".into(), "GPU".into()],
            negative_keywords: vec!["sponsored".into(), "giveaway".into()],
            trusted_domains: vec!["reuters.com".into()],
            blocked_domains: vec!["spam.example".into()],
        }
    }

    #[test]
    fn test_freshness_decay_and_floor() {
        let now = Utc::now();
        assert!((freshness(now, now, 24.0) - 100.0).abs() < 1e-9);
        assert!((freshness(now - Duration::hours(24), now, 24.0) - 50.0).abs() < 1e-6);
        assert_eq!(freshness(now - Duration::days(30), now, 24.0), FRESHNESS_FLOOR);
        // Future-dated counts as fresh
        assert!((freshness(now + Duration::hours(5), now, 24.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_ratio_and_negative_cap() {
        let s = signals();
        assert!((keyword_match("openai FUNDING round", &s, 10.0) - (20.0 + 80.0 * 2.0 / 3.0)).abs() < 1e-9);
        assert_eq!(keyword_match("nothing relevant", &s, 10.0), 20.0);
        // Full match capped at 30, minus one hit
        assert_eq!(keyword_match("openai funding gpu sponsored", &s, 10.0), 20.0);
        // Two hits floor at zero
        assert_eq!(keyword_match("sponsored giveaway", &s, 20.0), 0.0);
        assert_eq!(keyword_match("anything", &PersonaSignals::default(), 10.0), NEUTRAL);
    }

    #[test]
    fn test_trust_subdomains_and_block_list() {
        let s = signals();
        assert_eq!(source_trust("reuters.com", &s), TRUSTED_SCORE);
        assert_eq!(source_trust("www.Reuters.com", &s), TRUSTED_SCORE);
        assert_eq!(source_trust("uk.reuters.com", &s), TRUSTED_SCORE);
        assert_eq!(source_trust("notreuters.com", &s), NEUTRAL);
        assert_eq!(source_trust("a.spam.example", &s), BLOCKED_SCORE);
        assert_eq!(source_trust("", &s), NEUTRAL);
    }

    #[test]
    fn test_language_rules() {
        let mut c = PersonaConstraints {
            languages: vec!["en".into()],
            ..Default::default()
        };
        assert_eq!(language_match(Some("en"), &c), 100.0);
        assert_eq!(language_match(Some("en-US"), &c), 100.0);
        assert_eq!(language_match(Some("de"), &c), 0.0);
        assert_eq!(language_match(None, &c), NEUTRAL);
        c.languages.clear();
        assert_eq!(language_match(Some("de"), &c), 100.0);
    }

    #[test]
    fn test_length_ramp() {
        assert_eq!(length_sanity(Some(100), 200), 50.0);
        assert_eq!(length_sanity(Some(200), 200), 100.0);
        assert_eq!(length_sanity(Some(10_000), 200), 100.0);
        assert_eq!(length_sanity(Some(10_001), 200), OVERLONG_SCORE);
        assert_eq!(length_sanity(None, 200), NEUTRAL);
        assert_eq!(length_sanity(Some(0), 0), 100.0);
    }

    #[test]
    fn test_version_tag_tracks_weights_only() {
        let base = HeuristicsConfig::default();
        let tag = version_tag(&base);
        assert!(tag.starts_with("hw-"));
        assert_eq!(tag.len(), 3 + 16);
        assert_eq!(version_tag(&base.clone()), tag);

        let mut threshold_changed = base.clone();
        threshold_changed.threshold = 10.0;
        assert_eq!(version_tag(&threshold_changed), tag);

        let mut weight_changed = base;
        weight_changed.weights.trust += 0.01;
        assert_ne!(version_tag(&weight_changed), tag);
    }
}
