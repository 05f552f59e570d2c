//! Error types for the pipeline
//!
//! Every failure carries a [`ErrorKind`] tag plus the context needed to act on
//! it: offending ids for precondition failures, both messages for a failed
//! repair, the plan figures for a budget refusal.

use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Coarse failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Model output did not conform after the single repair attempt
    Validation,
    /// Network failure, timeout or non-success HTTP status
    Transport,
    /// Operation inputs not ready (missing full packs, unknown persona, ...)
    Precondition,
    /// Planned spend exceeds a ceiling
    Budget,
    /// Go/No-Go decision declined the run
    Aborted,
    Store,
    Config,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Transport => "transport",
            Self::Precondition => "precondition",
            Self::Budget => "budget",
            Self::Aborted => "aborted",
            Self::Store => "store",
            Self::Config => "config",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Output for schema '{schema}' invalid after repair: first error: {original}; repair error: {repair}")]
    Validation {
        schema: String,
        original: String,
        repair: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Precondition failed: {message} [{}]", ids.join(", "))]
    Precondition { message: String, ids: Vec<String> },

    #[error(
        "Budget exceeded: {planned_calls} calls (max {max_calls}), estimated cost {estimated_cost:.4} (max {max_cost:.4})"
    )]
    Budget {
        planned_calls: u32,
        max_calls: u32,
        estimated_cost: f64,
        max_cost: f64,
    },

    #[error("Run aborted: {0}")]
    Aborted(String),

    #[error("Store error: {0}")]
    Store(#[from] trawl_common::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Precondition { .. } => ErrorKind::Precondition,
            Self::Budget { .. } => ErrorKind::Budget,
            Self::Aborted(_) => ErrorKind::Aborted,
            Self::Store(_) => ErrorKind::Store,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Precondition failure without specific ids
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
            ids: Vec::new(),
        }
    }

    /// Offending ids for a precondition failure
    pub fn offending_ids(&self) -> &[String] {
        match self {
            Self::Precondition { ids, .. } => ids,
            _ => &[],
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(trawl_common::Error::Database(err))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(trawl_common::Error::Serialization(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_names_every_id() {
        let err = PipelineError::Precondition {
            message: "items lack full analysis".to_string(),
            ids: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(err.offending_ids(), ["a".to_string(), "b".to_string()]);
        let text = err.to_string();
        assert!(text.contains("a, b"));
    }

    #[test]
    fn test_validation_carries_both_messages() {
        let err = PipelineError::Validation {
            schema: "lite:p@1".to_string(),
            original: "missing field 'topic'".to_string(),
            repair: "unknown field 'extra'".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("missing field 'topic'"));
        assert!(text.contains("unknown field 'extra'"));
        assert_eq!(err.kind().as_str(), "validation");
    }

    #[test]
    fn test_common_error_maps_to_store() {
        let err: PipelineError = trawl_common::Error::NotFound("x".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Store);
    }
}
