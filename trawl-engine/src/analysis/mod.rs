//! Tiered analysis engine
//!
//! Lite scoring runs over every selected candidate; full analysis runs on
//! demand for one item at a time.

pub mod engine;
pub mod prompts;
pub mod schemas;

pub use engine::{AnalysisEngine, FullReport, LiteReport};
