//! # Trawl Common Library
//!
//! Shared code for the trawl pipeline crates including:
//! - Data model (items, personas, analysis packs, drafts)
//! - Database initialization
//! - Pipeline event types and the EventBus
//! - Configuration loading and root folder resolution
//! - Time helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod persona;
pub mod time;

pub use error::{Error, Result};
pub use persona::PersonaProfile;
