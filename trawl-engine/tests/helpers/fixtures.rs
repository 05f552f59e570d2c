//! Persona, item and model-output fixtures

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use trawl_common::models::CandidateItem;
use trawl_common::PersonaProfile;
use trawl_engine::ingest::SourceFeed;
use trawl_engine::{PipelineError, PipelineResult};

const PERSONA_TOML: &str = r#"
id = "ai-analyst"
version = 1
name = "AI Industry Analyst"
identity = "Independent analyst covering AI funding and infrastructure"
goals = ["explain what deals mean for builders"]
anti_goals = ["product hype"]

[[dimensions]]
key = "novelty"
weight = 0.5

[[dimensions]]
key = "depth"
weight = 0.5

[signals]
positive_keywords = ["openai", "funding", "gpu"]
negative_keywords = ["sponsored"]
trusted_domains = ["reuters.com"]

[constraints]
languages = ["en"]
min_words = 200

[style]
tone = "plain, skeptical"
structure = "claim, evidence, implication"
"#;

pub fn test_persona() -> PersonaProfile {
    PersonaProfile::from_toml_str(PERSONA_TOML).expect("fixture persona is valid")
}

/// English item on a trusted domain, `hours_ago` old relative to `now`
pub fn test_item(id: &str, title: &str, hours_ago: i64, now: DateTime<Utc>) -> CandidateItem {
    CandidateItem {
        id: id.to_string(),
        source_id: "feed".to_string(),
        title: title.to_string(),
        url: format!("https://www.reuters.com/tech/{}", id),
        guid: Some(format!("guid-{}", id)),
        published_at: now - Duration::hours(hours_ago),
        language: Some("en".to_string()),
        word_count: Some(600),
        source_domain: "reuters.com".to_string(),
        text: format!("{} Body text about OpenAI funding for item {}.", title, id),
        is_duplicate: false,
    }
}

/// Valid lite output for the fixture persona; overall score equals `score`
pub fn lite_json(topic: &str, score: f64, action: &str) -> Value {
    json!({
        "topic": topic,
        "summary_short": format!("Short summary of {}", topic),
        "dimension_scores": {"novelty": score, "depth": score},
        "action": action,
        "reasons": ["relevant to the audience"],
        "suggested_angle": "what it means for builders"
    })
}

/// Valid full output for the fixture persona
pub fn full_json(topic: &str, score: f64, action: &str) -> Value {
    let mut value = lite_json(topic, score, action);
    if let Value::Object(map) = &mut value {
        map.insert("summary_long".into(), json!(format!("Long summary of {}", topic)));
        map.insert("key_points".into(), json!(["first point", "second point"]));
        map.insert("quotes".into(), json!(["a short verbatim quote"]));
    }
    value
}

pub fn compose_json() -> Value {
    json!({
        "title_candidates": ["What the money buys"],
        "body_markdown": "The deals point the same way.\n\nCompute is the moat.",
        "tags": ["ai", "funding"],
        "citations": [{"url": "https://www.reuters.com/tech/a", "title": "Source A"}],
        "platform_extension": {}
    })
}

/// In-memory source feed that counts fetches
///
/// Clone `fetches` before boxing the feed to observe it afterwards.
pub struct VecFeed {
    pub id: String,
    pub items: Vec<CandidateItem>,
    pub fail: bool,
    pub fetches: Arc<AtomicU32>,
}

impl VecFeed {
    pub fn new(id: &str, items: Vec<CandidateItem>) -> Self {
        Self {
            id: id.to_string(),
            items,
            fail: false,
            fetches: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn failing(id: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(id, Vec::new())
        }
    }
}

#[async_trait]
impl SourceFeed for VecFeed {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self) -> PipelineResult<Vec<CandidateItem>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PipelineError::Transport(format!("{} unreachable", self.id)));
        }
        Ok(self.items.clone())
    }
}
