//! Structured output validation
//!
//! Model output is untrusted: it is derived from fetched content that may
//! carry injected instructions. Nothing reaches the store unless it conforms
//! to a [`RecordSchema`].

pub mod schema;
pub mod validator;

pub use schema::{FieldRule, RecordSchema, SchemaCache, SchemaKind};
pub use validator::{call_validated, strip_code_fences, CallStats, ValidationOutcome};
