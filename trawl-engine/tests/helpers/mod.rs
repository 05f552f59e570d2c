//! Test Helper Utilities
//!
//! Shared fixtures for trawl-engine integration tests

#![allow(dead_code)]

pub mod backend;
pub mod db_utils;
pub mod fixtures;

pub use backend::{CallKind, Reply, ScriptedBackend};
pub use db_utils::{create_test_store, seed_items};
pub use fixtures::{compose_json, full_json, lite_json, test_item, test_persona, VecFeed};
