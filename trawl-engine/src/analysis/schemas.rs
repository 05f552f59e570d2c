//! Persona-derived output schemas

use trawl_common::models::ActionLabel;
use trawl_common::PersonaProfile;

use crate::validation::{FieldRule, RecordSchema};

const TOPIC_MAX_CHARS: usize = 200;
const SUMMARY_SHORT_MAX_CHARS: usize = 600;
const SUMMARY_LONG_MAX_CHARS: usize = 4000;
const ANGLE_MAX_CHARS: usize = 400;

fn dimension_rule(persona: &PersonaProfile) -> FieldRule {
    FieldRule::KeyedNumbers {
        keys: persona.dimensions.iter().map(|d| d.key.clone()).collect(),
        min: 0.0,
        max: 100.0,
    }
}

fn with_lite_fields(schema: RecordSchema, persona: &PersonaProfile) -> RecordSchema {
    schema
        .required("topic", FieldRule::Text { max_chars: TOPIC_MAX_CHARS })
        .required(
            "summary_short",
            FieldRule::Text { max_chars: SUMMARY_SHORT_MAX_CHARS },
        )
        .required("dimension_scores", dimension_rule(persona))
        .required(
            "action",
            FieldRule::OneOf(ActionLabel::ALL.iter().map(|a| a.to_string()).collect()),
        )
        .required(
            "reasons",
            FieldRule::TextList {
                min_items: 1,
                max_items: persona.output.max_reasons,
                max_words: None,
            },
        )
        .optional(
            "suggested_angle",
            FieldRule::Text { max_chars: ANGLE_MAX_CHARS },
        )
}

/// Lite judgement: all and only the persona's dimension keys
pub fn lite_schema(persona: &PersonaProfile) -> RecordSchema {
    with_lite_fields(
        RecordSchema::new(format!("lite:{}@{}", persona.id, persona.version)),
        persona,
    )
}

/// Full judgement: lite fields plus long summary, key points and quotes
pub fn full_schema(persona: &PersonaProfile) -> RecordSchema {
    with_lite_fields(
        RecordSchema::new(format!("full:{}@{}", persona.id, persona.version)),
        persona,
    )
    .required(
        "summary_long",
        FieldRule::Text { max_chars: SUMMARY_LONG_MAX_CHARS },
    )
    .required(
        "key_points",
        FieldRule::TextList {
            min_items: 1,
            max_items: persona.output.max_key_points,
            max_words: None,
        },
    )
    .required(
        "quotes",
        FieldRule::TextList {
            min_items: 0,
            max_items: persona.output.max_quotes,
            max_words: Some(persona.output.quote_max_words),
        },
    )
}
