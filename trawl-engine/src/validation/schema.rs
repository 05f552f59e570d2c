//! Keyed-record schema
//!
//! A schema is a named list of field rules over a JSON object. Unknown
//! top-level fields are rejected, so a response cannot smuggle extra
//! instructions or data past validation.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Constraint on one field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRule {
    /// Non-empty string of at most `max_chars` characters
    Text { max_chars: usize },
    /// Number within `[min, max]`
    Number { min: f64, max: f64 },
    /// String from a closed vocabulary
    OneOf(Vec<String>),
    /// List of non-empty strings; `max_words` bounds each entry
    TextList {
        min_items: usize,
        max_items: usize,
        max_words: Option<usize>,
    },
    /// Object with exactly `keys`, each a number within `[min, max]`
    KeyedNumbers { keys: Vec<String>, min: f64, max: f64 },
    /// Any JSON object; contents are not inspected
    Object,
    /// List of objects, each carrying `required` string fields and nothing
    /// outside `allowed`; an `allowed` key may be null, otherwise a string
    ObjectList {
        required: Vec<String>,
        allowed: Vec<String>,
        min_items: usize,
        max_items: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub rule: FieldRule,
    /// Optional fields may be absent or null
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn required(mut self, name: &str, rule: FieldRule) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            rule,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &str, rule: FieldRule) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            rule,
            required: false,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Validate a parsed value, returning its object map
    ///
    /// The error lists every violation found, separated by `; `.
    pub fn validate(&self, value: Value) -> Result<Map<String, Value>, String> {
        let map = match value {
            Value::Object(map) => map,
            other => return Err(format!("expected a JSON object, got {}", type_name(&other))),
        };

        let mut errors = Vec::new();

        for key in map.keys() {
            if !self.fields.iter().any(|f| f.name == *key) {
                errors.push(format!("unknown field '{}'", key));
            }
        }

        for field in &self.fields {
            match map.get(&field.name) {
                None | Some(Value::Null) if !field.required => {}
                None => errors.push(format!("missing field '{}'", field.name)),
                Some(value) => {
                    if let Err(e) = check_rule(&field.rule, value) {
                        errors.push(format!("field '{}': {}", field.name, e));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(map)
        } else {
            Err(errors.join("; "))
        }
    }

    /// Plain-text shape description embedded in prompts
    pub fn describe(&self) -> String {
        let mut lines = vec!["Respond with a single JSON object with exactly these fields:".to_string()];
        for field in &self.fields {
            let presence = if field.required { "required" } else { "optional" };
            lines.push(format!("- \"{}\" ({}): {}", field.name, presence, describe_rule(&field.rule)));
        }
        lines.push("Do not add any other fields. Do not wrap the JSON in prose.".to_string());
        lines.join("\n")
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_text(value: &Value, max_chars: usize) -> Result<(), String> {
    let text = value
        .as_str()
        .ok_or_else(|| format!("expected string, got {}", type_name(value)))?;
    if text.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    let chars = text.chars().count();
    if chars > max_chars {
        return Err(format!("{} characters exceeds limit {}", chars, max_chars));
    }
    Ok(())
}

fn check_number(value: &Value, min: f64, max: f64) -> Result<(), String> {
    let n = value
        .as_f64()
        .ok_or_else(|| format!("expected number, got {}", type_name(value)))?;
    if n < min || n > max {
        return Err(format!("{} outside [{}, {}]", n, min, max));
    }
    Ok(())
}

fn check_list_len(len: usize, min_items: usize, max_items: usize) -> Result<(), String> {
    if len < min_items || len > max_items {
        return Err(format!("{} items, expected {} to {}", len, min_items, max_items));
    }
    Ok(())
}

fn check_rule(rule: &FieldRule, value: &Value) -> Result<(), String> {
    match rule {
        FieldRule::Text { max_chars } => check_text(value, *max_chars),
        FieldRule::Number { min, max } => check_number(value, *min, *max),
        FieldRule::OneOf(allowed) => {
            let text = value
                .as_str()
                .ok_or_else(|| format!("expected string, got {}", type_name(value)))?;
            if allowed.iter().any(|a| a == text) {
                Ok(())
            } else {
                Err(format!("'{}' is not one of [{}]", text, allowed.join(", ")))
            }
        }
        FieldRule::TextList {
            min_items,
            max_items,
            max_words,
        } => {
            let items = value
                .as_array()
                .ok_or_else(|| format!("expected array, got {}", type_name(value)))?;
            check_list_len(items.len(), *min_items, *max_items)?;
            for (i, item) in items.iter().enumerate() {
                check_text(item, usize::MAX).map_err(|e| format!("item {}: {}", i, e))?;
                if let (Some(limit), Some(text)) = (max_words, item.as_str()) {
                    let words = text.split_whitespace().count();
                    if words > *limit {
                        return Err(format!("item {}: {} words exceeds limit {}", i, words, limit));
                    }
                }
            }
            Ok(())
        }
        FieldRule::KeyedNumbers { keys, min, max } => {
            let map = value
                .as_object()
                .ok_or_else(|| format!("expected object, got {}", type_name(value)))?;
            let mut problems = Vec::new();
            for key in keys {
                match map.get(key) {
                    None => problems.push(format!("missing key '{}'", key)),
                    Some(v) => {
                        if let Err(e) = check_number(v, *min, *max) {
                            problems.push(format!("key '{}': {}", key, e));
                        }
                    }
                }
            }
            for key in map.keys() {
                if !keys.contains(key) {
                    problems.push(format!("unexpected key '{}'", key));
                }
            }
            if problems.is_empty() {
                Ok(())
            } else {
                Err(problems.join(", "))
            }
        }
        FieldRule::Object => {
            if value.is_object() {
                Ok(())
            } else {
                Err(format!("expected object, got {}", type_name(value)))
            }
        }
        FieldRule::ObjectList {
            required,
            allowed,
            min_items,
            max_items,
        } => {
            let items = value
                .as_array()
                .ok_or_else(|| format!("expected array, got {}", type_name(value)))?;
            check_list_len(items.len(), *min_items, *max_items)?;
            for (i, item) in items.iter().enumerate() {
                let obj = item
                    .as_object()
                    .ok_or_else(|| format!("item {}: expected object, got {}", i, type_name(item)))?;
                for key in required {
                    match obj.get(key) {
                        Some(v) => check_text(v, usize::MAX)
                            .map_err(|e| format!("item {} key '{}': {}", i, key, e))?,
                        None => return Err(format!("item {}: missing key '{}'", i, key)),
                    }
                }
                for (key, v) in obj {
                    if required.contains(key) {
                        continue;
                    }
                    if !allowed.contains(key) {
                        return Err(format!("item {}: unexpected key '{}'", i, key));
                    }
                    if !v.is_null() {
                        check_text(v, usize::MAX)
                            .map_err(|e| format!("item {} key '{}': {}", i, key, e))?;
                    }
                }
            }
            Ok(())
        }
    }
}

fn describe_rule(rule: &FieldRule) -> String {
    match rule {
        FieldRule::Text { max_chars } => format!("non-empty string, at most {} characters", max_chars),
        FieldRule::Number { min, max } => format!("number from {} to {}", min, max),
        FieldRule::OneOf(allowed) => format!("one of {}", allowed.join(" | ")),
        FieldRule::TextList {
            min_items,
            max_items,
            max_words,
        } => match max_words {
            Some(words) => format!(
                "array of {} to {} strings, each at most {} words",
                min_items, max_items, words
            ),
            None => format!("array of {} to {} strings", min_items, max_items),
        },
        FieldRule::KeyedNumbers { keys, min, max } => format!(
            "object with exactly the keys [{}], each a number from {} to {}",
            keys.join(", "),
            min,
            max
        ),
        FieldRule::Object => "JSON object".to_string(),
        FieldRule::ObjectList {
            required,
            allowed,
            min_items,
            max_items,
        } => format!(
            "array of {} to {} objects with string keys [{}] (optional: [{}])",
            min_items,
            max_items,
            required.join(", "),
            allowed
                .iter()
                .filter(|k| !required.contains(k))
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Which persona-derived schema a cache entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Lite,
    Full,
}

/// Persona-derived schemas, keyed by persona identity `(id, version)`
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: Mutex<HashMap<(String, u32, SchemaKind), Arc<RecordSchema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached schema for `(identity, kind)`, built on first use
    pub fn get_or_build<F>(&self, identity: (String, u32), kind: SchemaKind, build: F) -> Arc<RecordSchema>
    where
        F: FnOnce() -> RecordSchema,
    {
        let key = (identity.0, identity.1, kind);
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(entries.entry(key).or_insert_with(|| Arc::new(build())))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
