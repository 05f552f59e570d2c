//! Parse, validate, repair once
//!
//! **Algorithm:**
//! 1. Call the backend; strip markdown code fences from the answer
//! 2. Parse JSON and validate against the schema
//! 3. On failure, issue exactly one repair call carrying the error and the
//!    raw text, then re-validate
//! 4. A second failure is terminal and carries both error messages
//!
//! Transport failure of the first call propagates unchanged.

use serde_json::{Map, Value};
use tracing::{debug, warn};
use trawl_common::models::TokenUsage;

use super::schema::RecordSchema;
use crate::ai::{AiBackend, CompletionRequest};
use crate::error::{PipelineError, PipelineResult};

const REPAIR_SYSTEM_PROMPT: &str = "You fix malformed JSON. Reply with the corrected JSON object only: \
no commentary, no markdown, no additional fields.";

/// Accounting for one validated call, including the repair call if any
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub calls: u32,
    pub usage: TokenUsage,
    pub repaired: bool,
}

/// Result plus the spend incurred producing it (success or not)
#[derive(Debug)]
pub struct ValidationOutcome {
    pub result: PipelineResult<Map<String, Value>>,
    pub stats: CallStats,
    /// Model reported by the backend for the last successful call
    pub model: Option<String>,
}

/// Remove a surrounding markdown code fence (```` ``` ```` or ```` ```json ````)
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`), which ends at the first newline or,
    // for a one-line fence, at the first non-letter
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => {
            let info_len = rest
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(rest.len());
            &rest[info_len..]
        }
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn parse_and_validate(raw: &str, schema: &RecordSchema) -> Result<Map<String, Value>, String> {
    let value: Value =
        serde_json::from_str(strip_code_fences(raw)).map_err(|e| format!("invalid JSON: {}", e))?;
    schema.validate(value)
}

fn repair_request(original: &CompletionRequest, schema: &RecordSchema, error: &str, raw: &str) -> CompletionRequest {
    CompletionRequest {
        system: REPAIR_SYSTEM_PROMPT.to_string(),
        user: format!(
            "{}\n\nThe previous output failed validation.\nError: {}\n\nPrevious output:\n{}\n\n\
             Emit the corrected JSON object only.",
            schema.describe(),
            error,
            raw
        ),
        max_tokens: original.max_tokens,
        temperature: 0.0,
    }
}

/// Call the backend and return a schema-conforming record
pub async fn call_validated(
    backend: &dyn AiBackend,
    request: &CompletionRequest,
    schema: &RecordSchema,
) -> ValidationOutcome {
    let mut stats = CallStats::default();

    stats.calls += 1;
    let first = match backend.complete(request).await {
        Ok(completion) => completion,
        Err(e) => {
            return ValidationOutcome {
                result: Err(e),
                stats,
                model: None,
            }
        }
    };
    stats.usage.add(first.usage);

    let original_error = match parse_and_validate(&first.text, schema) {
        Ok(record) => {
            return ValidationOutcome {
                result: Ok(record),
                stats,
                model: Some(first.model),
            }
        }
        Err(e) => e,
    };

    warn!(schema = schema.name(), error = %original_error, "Output failed validation, attempting repair");

    stats.calls += 1;
    stats.repaired = true;
    let repair = repair_request(request, schema, &original_error, &first.text);
    let repaired = match backend.complete(&repair).await {
        Ok(completion) => completion,
        Err(e) => {
            return ValidationOutcome {
                result: Err(PipelineError::Validation {
                    schema: schema.name().to_string(),
                    original: original_error,
                    repair: format!("repair call failed: {}", e),
                }),
                stats,
                model: None,
            }
        }
    };
    stats.usage.add(repaired.usage);

    match parse_and_validate(&repaired.text, schema) {
        Ok(record) => {
            debug!(schema = schema.name(), "Repair succeeded");
            ValidationOutcome {
                result: Ok(record),
                stats,
                model: Some(repaired.model),
            }
        }
        Err(repair_error) => ValidationOutcome {
            result: Err(PipelineError::Validation {
                schema: schema.name().to_string(),
                original: original_error,
                repair: repair_error,
            }),
            stats,
            model: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```\n"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
        // Unterminated fence still yields the body
        assert_eq!(strip_code_fences("```json\n{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_strip_one_line_fence() {
        assert_eq!(strip_code_fences("```json {\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```JSON{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```[1, 2]```"), "[1, 2]");
    }
}
