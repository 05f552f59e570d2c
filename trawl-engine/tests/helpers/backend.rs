//! Scripted AI backend
//!
//! Replies are chosen by a handler closure from the call kind and the item
//! title found in the prompt. Every call is counted per kind.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use trawl_common::models::TokenUsage;
use trawl_engine::ai::{AiBackend, Completion, CompletionRequest};
use trawl_engine::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Lite,
    Full,
    Compose,
    Repair,
}

/// What the scripted model answers
pub enum Reply {
    Json(Value),
    Raw(String),
    Fail(String),
}

type Handler = dyn Fn(CallKind, Option<&str>) -> Reply + Send + Sync;

pub struct ScriptedBackend {
    handler: Box<Handler>,
    lite: AtomicU32,
    full: AtomicU32,
    compose: AtomicU32,
    repair: AtomicU32,
}

impl ScriptedBackend {
    pub fn new(handler: impl Fn(CallKind, Option<&str>) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            lite: AtomicU32::new(0),
            full: AtomicU32::new(0),
            compose: AtomicU32::new(0),
            repair: AtomicU32::new(0),
        })
    }

    pub fn calls(&self, kind: CallKind) -> u32 {
        self.counter(kind).load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> u32 {
        [CallKind::Lite, CallKind::Full, CallKind::Compose, CallKind::Repair]
            .iter()
            .map(|k| self.calls(*k))
            .sum()
    }

    fn counter(&self, kind: CallKind) -> &AtomicU32 {
        match kind {
            CallKind::Lite => &self.lite,
            CallKind::Full => &self.full,
            CallKind::Compose => &self.compose,
            CallKind::Repair => &self.repair,
        }
    }
}

fn classify(request: &CompletionRequest) -> CallKind {
    if request.system.starts_with("You fix malformed JSON") {
        CallKind::Repair
    } else if request.system.starts_with("You write for the creator persona") {
        CallKind::Compose
    } else if request.user.starts_with("Analyze this item in depth") {
        CallKind::Full
    } else {
        CallKind::Lite
    }
}

/// Item title from the prompt's `Title:` line
fn title_of(request: &CompletionRequest) -> Option<&str> {
    request
        .user
        .lines()
        .find_map(|line| line.strip_prefix("Title: "))
}

#[async_trait]
impl AiBackend for ScriptedBackend {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> PipelineResult<Completion> {
        let kind = classify(request);
        self.counter(kind).fetch_add(1, Ordering::SeqCst);

        let text = match (self.handler)(kind, title_of(request)) {
            Reply::Json(value) => value.to_string(),
            Reply::Raw(text) => text,
            Reply::Fail(message) => return Err(PipelineError::Transport(message)),
        };
        Ok(Completion {
            text,
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 20,
            },
            model: "scripted".to_string(),
        })
    }
}
