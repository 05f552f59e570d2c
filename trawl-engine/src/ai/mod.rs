//! AI backend access
//!
//! Stages talk to an [`AiBackend`] handle; [`HttpAiClient`] is the production
//! implementation for OpenAI-compatible chat-completion endpoints.

pub mod client;
pub mod gate;
pub mod meter;

pub use client::{AiBackend, Completion, CompletionRequest, HttpAiClient};
pub use gate::{ConcurrencyGate, GatePermit};
pub use meter::SpendMeter;
