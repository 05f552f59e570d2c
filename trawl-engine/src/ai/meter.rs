//! Running total of AI spend across stages

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use trawl_common::models::TokenUsage;

/// Calls and tokens spent, including calls that failed
#[derive(Debug, Default)]
pub struct SpendMeter {
    calls: AtomicU32,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl SpendMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, calls: u32, usage: TokenUsage) {
        self.calls.fetch_add(calls, Ordering::Relaxed);
        self.prompt_tokens.fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(usage.completion_tokens, Ordering::Relaxed);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn usage(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let meter = SpendMeter::new();
        meter.record(1, TokenUsage { prompt_tokens: 10, completion_tokens: 2 });
        meter.record(2, TokenUsage { prompt_tokens: 5, completion_tokens: 1 });
        assert_eq!(meter.calls(), 3);
        assert_eq!(meter.usage().total(), 18);
    }
}
