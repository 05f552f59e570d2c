//! Shared data model
//!
//! These types are the contracts between pipeline stages and the store.
//! Candidate items are owned by the upstream feed collaborator and treated as
//! read-only by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

// ============================================================================
// Candidate Items
// ============================================================================

/// A content unit supplied by a source feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// Stable item id
    pub id: String,
    /// Feed that produced the item
    pub source_id: String,
    pub title: String,
    pub url: String,
    /// Feed guid, or canonical URL when the feed has no guid
    pub guid: Option<String>,
    pub published_at: DateTime<Utc>,
    /// ISO 639-1 code when known
    pub language: Option<String>,
    pub word_count: Option<u32>,
    /// Domain used for source trust decisions
    pub source_domain: String,
    /// Extracted article text
    pub text: String,
    /// Flagged when the same content arrived from another source
    pub is_duplicate: bool,
}

impl CandidateItem {
    /// Identity used for dedup across fetches: guid if present, else URL
    pub fn dedup_source(&self) -> &str {
        match self.guid.as_deref() {
            Some(guid) if !guid.trim().is_empty() => guid,
            _ => &self.url,
        }
    }
}

// ============================================================================
// Closed Vocabularies
// ============================================================================

/// Recommendation attached to an analysis pack
///
/// Closed four-value vocabulary shared by lite scoring output and the
/// auto-pick filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionLabel {
    WriteWorthy,
    PitchWorthy,
    RepostWorthy,
    Skip,
}

impl ActionLabel {
    /// Wire values, in the order presented to the model
    pub const ALL: [&'static str; 4] = ["write-worthy", "pitch-worthy", "repost-worthy", "skip"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WriteWorthy => "write-worthy",
            Self::PitchWorthy => "pitch-worthy",
            Self::RepostWorthy => "repost-worthy",
            Self::Skip => "skip",
        }
    }
}

impl FromStr for ActionLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "write-worthy" => Ok(Self::WriteWorthy),
            "pitch-worthy" => Ok(Self::PitchWorthy),
            "repost-worthy" => Ok(Self::RepostWorthy),
            "skip" => Ok(Self::Skip),
            other => Err(Error::InvalidInput(format!("unknown action label: {other}"))),
        }
    }
}

impl fmt::Display for ActionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Analysis depth. Ordered: `Lite < Full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Lite,
    Full,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lite => "lite",
            Self::Full => "full",
        }
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lite" => Ok(Self::Lite),
            "full" => Ok(Self::Full),
            other => Err(Error::InvalidInput(format!("unknown tier: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackStatus {
    Pending,
    Done,
    Failed,
}

impl PackStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for PackStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("unknown pack status: {other}"))),
        }
    }
}

// ============================================================================
// Heuristic Scores
// ============================================================================

/// Per-factor contributions behind a heuristic score
///
/// Factor values are in [0, 100]; penalties are zero or negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub freshness: f64,
    pub keyword: f64,
    pub trust: f64,
    pub language: f64,
    pub length: f64,
    pub duplicate_penalty: f64,
    pub topic_penalty: f64,
}

/// Persisted heuristic score for (item, persona, weight version)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicScore {
    pub item_id: String,
    pub persona_id: String,
    /// Tag derived from the weight configuration hash
    pub version: String,
    pub score: f64,
    pub breakdown: FactorBreakdown,
    pub computed_at: DateTime<Utc>,
}

// ============================================================================
// Analysis Packs
// ============================================================================

/// Token accounting for one or more AI calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Persisted AI judgement for one (item, persona) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPack {
    pub item_id: String,
    pub persona_id: String,
    pub tier: Tier,
    pub status: PackStatus,
    pub topic: Option<String>,
    pub summary_short: Option<String>,
    /// Full tier only
    pub summary_long: Option<String>,
    pub dimension_scores: BTreeMap<String, f64>,
    pub overall_score: Option<f64>,
    pub action: Option<ActionLabel>,
    pub reasons: Vec<String>,
    pub suggested_angle: Option<String>,
    /// Full tier only
    pub key_points: Vec<String>,
    /// Full tier only
    pub quotes: Vec<String>,
    pub model: String,
    pub prompt_version: String,
    pub usage: TokenUsage,
    /// Failure message for `PackStatus::Failed`
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisPack {
    /// Minimal record for a unit whose analysis failed
    pub fn failed(
        item_id: &str,
        persona_id: &str,
        tier: Tier,
        model: &str,
        prompt_version: &str,
        error: String,
    ) -> Self {
        Self {
            item_id: item_id.to_string(),
            persona_id: persona_id.to_string(),
            tier,
            status: PackStatus::Failed,
            topic: None,
            summary_short: None,
            summary_long: None,
            dimension_scores: BTreeMap::new(),
            overall_score: None,
            action: None,
            reasons: Vec::new(),
            suggested_angle: None,
            key_points: Vec::new(),
            quotes: Vec::new(),
            model: model.to_string(),
            prompt_version: prompt_version.to_string(),
            usage: TokenUsage::default(),
            error: Some(error),
            updated_at: crate::time::now(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == PackStatus::Done
    }

    /// Ready for composition
    pub fn is_full_done(&self) -> bool {
        self.tier == Tier::Full && self.status == PackStatus::Done
    }
}

// ============================================================================
// Drafts
// ============================================================================

/// Target platform for a composed draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Blog,
    Newsletter,
    Thread,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blog => "blog",
            Self::Newsletter => "newsletter",
            Self::Thread => "thread",
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blog" => Ok(Self::Blog),
            "newsletter" => Ok(Self::Newsletter),
            "thread" => Ok(Self::Thread),
            other => Err(Error::InvalidInput(format!("unknown platform: {other}"))),
        }
    }
}

/// How selected items are merged into one draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// One section per item
    Roundup,
    /// A single narrative drawing on all items
    Synthesis,
    /// Items set against each other
    Contrast,
}

impl MergeStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Roundup => "roundup",
            Self::Synthesis => "synthesis",
            Self::Contrast => "contrast",
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "roundup" => Ok(Self::Roundup),
            "synthesis" => Ok(Self::Synthesis),
            "contrast" => Ok(Self::Contrast),
            other => Err(Error::InvalidInput(format!("unknown merge strategy: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Selected,
    Composed,
    Exported,
}

impl DraftStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Selected => "selected",
            Self::Composed => "composed",
            Self::Exported => "exported",
        }
    }
}

impl FromStr for DraftStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "selected" => Ok(Self::Selected),
            "composed" => Ok(Self::Composed),
            "exported" => Ok(Self::Exported),
            other => Err(Error::InvalidInput(format!("unknown draft status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
}

/// Output of the synthesis composer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedOutput {
    pub title_candidates: Vec<String>,
    pub body_markdown: String,
    pub tags: Vec<String>,
    pub citations: Vec<Citation>,
    /// Shape varies by platform; opaque to the composer
    pub platform_extension: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: Uuid,
    pub persona_id: String,
    pub platform: Platform,
    pub merge_strategy: MergeStrategy,
    /// Selection order is preserved
    pub item_ids: Vec<String>,
    pub commentary: String,
    pub status: DraftStatus,
    pub output: Option<ComposedOutput>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    pub fn new(
        persona_id: &str,
        platform: Platform,
        merge_strategy: MergeStrategy,
        item_ids: Vec<String>,
        commentary: String,
    ) -> Self {
        let now = crate::time::now();
        Self {
            id: Uuid::new_v4(),
            persona_id: persona_id.to_string(),
            platform,
            merge_strategy,
            item_ids,
            commentary,
            status: DraftStatus::Selected,
            output: None,
            created_at: now,
            updated_at: now,
        }
    }
}
