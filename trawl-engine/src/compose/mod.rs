//! Synthesis composer and export rendering

pub mod composer;
pub mod render;

pub use composer::{ComposeReport, Composer, ExportBundle};
pub use render::{render_export, SourceRef};
