//! # Trawl Engine
//!
//! Persona-driven triage and synthesis pipeline:
//! - Heuristic prefilter and topic-duplicate suppression
//! - Two-tier AI analysis with strict output validation and one bounded repair
//! - Synthesis composer and export rendering
//! - Budget-guarded pipeline orchestrator
//! - Feed ingest adapter and delivery digest

pub mod ai;
pub mod analysis;
pub mod compose;
pub mod config;
pub mod delivery;
pub mod error;
pub mod ingest;
pub mod orchestrator;
pub mod prefilter;
pub mod store;
pub mod topic_dedup;
pub mod utils;
pub mod validation;

pub use error::{ErrorKind, PipelineError, PipelineResult};
