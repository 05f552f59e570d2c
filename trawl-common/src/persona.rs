//! Creator persona profiles
//!
//! A persona is immutable per `(id, version)` and loaded once per run from a
//! TOML file. Loading validates the dimension set so that every later stage
//! can rely on unique, non-empty keys and weights summing to 1.0.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Tolerance applied to the dimension weight sum
const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringDimension {
    pub key: String,
    pub weight: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersonaSignals {
    #[serde(default)]
    pub positive_keywords: Vec<String>,
    #[serde(default)]
    pub negative_keywords: Vec<String>,
    #[serde(default)]
    pub trusted_domains: Vec<String>,
    #[serde(default)]
    pub blocked_domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaConstraints {
    /// Allowed language codes; empty accepts every language
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default = "default_min_words")]
    pub min_words: u32,
    /// Persona-level age limit, intersected with the run lookback window
    #[serde(default)]
    pub max_age_hours: Option<u32>,
}

fn default_min_words() -> u32 {
    200
}

impl Default for PersonaConstraints {
    fn default() -> Self {
        Self {
            languages: Vec::new(),
            min_words: default_min_words(),
            max_age_hours: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputLimits {
    #[serde(default = "default_max_reasons")]
    pub max_reasons: usize,
    #[serde(default = "default_max_key_points")]
    pub max_key_points: usize,
    #[serde(default = "default_max_quotes")]
    pub max_quotes: usize,
    #[serde(default = "default_quote_max_words")]
    pub quote_max_words: usize,
}

fn default_max_reasons() -> usize {
    3
}
fn default_max_key_points() -> usize {
    5
}
fn default_max_quotes() -> usize {
    3
}
fn default_quote_max_words() -> usize {
    25
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            max_reasons: default_max_reasons(),
            max_key_points: default_max_key_points(),
            max_quotes: default_max_quotes(),
            quote_max_words: default_quote_max_words(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StyleHints {
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub structure: String,
}

/// Named creator persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub name: String,
    /// Who the creator is, in their own words
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub anti_goals: Vec<String>,
    pub dimensions: Vec<ScoringDimension>,
    #[serde(default)]
    pub signals: PersonaSignals,
    #[serde(default)]
    pub constraints: PersonaConstraints,
    #[serde(default)]
    pub output: OutputLimits,
    #[serde(default)]
    pub style: StyleHints,
}

fn default_version() -> u32 {
    1
}

impl PersonaProfile {
    /// Cache identity: a persona never changes within one version
    pub fn identity_key(&self) -> (String, u32) {
        (self.id.clone(), self.version)
    }

    /// Dimension keys in declaration order
    pub fn dimension_keys(&self) -> Vec<&str> {
        self.dimensions.iter().map(|d| d.key.as_str()).collect()
    }

    /// Check structural invariants
    ///
    /// **Rules:**
    /// - id and name non-empty
    /// - at least one dimension, keys non-empty and unique
    /// - weights non-negative and summing to 1.0 (±0.01)
    /// - output limits allow at least one reason
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Config("persona id must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::Config(format!("persona '{}' has an empty name", self.id)));
        }
        if self.dimensions.is_empty() {
            return Err(Error::Config(format!(
                "persona '{}' declares no scoring dimensions",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for dim in &self.dimensions {
            if dim.key.trim().is_empty() {
                return Err(Error::Config(format!(
                    "persona '{}' has a dimension with an empty key",
                    self.id
                )));
            }
            if !seen.insert(dim.key.as_str()) {
                return Err(Error::Config(format!(
                    "persona '{}' repeats dimension key '{}'",
                    self.id, dim.key
                )));
            }
            if dim.weight < 0.0 || !dim.weight.is_finite() {
                return Err(Error::Config(format!(
                    "persona '{}' dimension '{}' has invalid weight {}",
                    self.id, dim.key, dim.weight
                )));
            }
        }

        let sum: f64 = self.dimensions.iter().map(|d| d.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::Config(format!(
                "persona '{}' dimension weights sum to {:.3}, expected 1.0",
                self.id, sum
            )));
        }

        if self.output.max_reasons == 0 {
            return Err(Error::Config(format!(
                "persona '{}' output.max_reasons must be at least 1",
                self.id
            )));
        }

        Ok(())
    }

    /// Parse and validate a persona from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let persona: PersonaProfile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse persona failed: {}", e)))?;
        persona.validate()?;
        Ok(persona)
    }

    /// Load and validate a persona TOML file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let persona = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        debug!(persona = %persona.id, version = persona.version, path = %path.display(), "Loaded persona");
        Ok(persona)
    }
}

/// All personas available to a run, keyed by id
#[derive(Debug, Clone, Default)]
pub struct PersonaRegistry {
    personas: HashMap<String, PersonaProfile>,
}

impl PersonaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a persona, replacing an older version with the same id
    pub fn insert(&mut self, persona: PersonaProfile) {
        if let Some(existing) = self.personas.get(&persona.id) {
            if existing.version > persona.version {
                warn!(
                    persona = %persona.id,
                    kept = existing.version,
                    ignored = persona.version,
                    "Ignoring older persona version"
                );
                return;
            }
        }
        self.personas.insert(persona.id.clone(), persona);
    }

    /// Load every `*.toml` persona in a directory
    ///
    /// Invalid files fail the whole load: a run must not start with a
    /// persona set that silently lost a member.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("toml"))
            .collect();
        paths.sort();

        for path in paths {
            registry.insert(PersonaProfile::load_file(&path)?);
        }

        info!(count = registry.len(), dir = %dir.display(), "Persona registry loaded");
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<&PersonaProfile> {
        self.personas.get(id)
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.personas.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
id = "ai-analyst"
version = 2
name = "AI Industry Analyst"
identity = "Independent analyst covering AI funding and infrastructure"
goals = ["explain deals"]
anti_goals = ["hype"]

[[dimensions]]
key = "novelty"
weight = 0.6
description = "Is this new?"

[[dimensions]]
key = "depth"
weight = 0.4

[signals]
positive_keywords = ["openai", "funding"]
trusted_domains = ["reuters.com"]

[constraints]
languages = ["en"]
min_words = 300
max_age_hours = 48

[output]
max_reasons = 4
"#;

    #[test]
    fn test_parse_valid_persona() {
        let persona = PersonaProfile::from_toml_str(VALID).unwrap();
        assert_eq!(persona.identity_key(), ("ai-analyst".to_string(), 2));
        assert_eq!(persona.dimension_keys(), vec!["novelty", "depth"]);
        assert_eq!(persona.constraints.max_age_hours, Some(48));
        assert_eq!(persona.output.max_reasons, 4);
        // Unspecified limits fall back to defaults
        assert_eq!(persona.output.quote_max_words, 25);
    }

    #[test]
    fn test_reject_weights_not_summing_to_one() {
        let bad = VALID.replace("weight = 0.4", "weight = 0.1");
        let err = PersonaProfile::from_toml_str(&bad).unwrap_err();
        assert!(err.to_string().contains("sum to"));
    }

    #[test]
    fn test_reject_duplicate_dimension_key() {
        let bad = VALID.replace("key = \"depth\"", "key = \"novelty\"");
        let err = PersonaProfile::from_toml_str(&bad).unwrap_err();
        assert!(err.to_string().contains("repeats dimension key"));
    }

    #[test]
    fn test_reject_empty_dimension_key() {
        let bad = VALID.replace("key = \"depth\"", "key = \" \"");
        assert!(PersonaProfile::from_toml_str(&bad).is_err());
    }

    #[test]
    fn test_registry_keeps_newest_version() {
        let newer = PersonaProfile::from_toml_str(VALID).unwrap();
        let mut older = newer.clone();
        older.version = 1;

        let mut registry = PersonaRegistry::new();
        registry.insert(newer);
        registry.insert(older);
        assert_eq!(registry.get("ai-analyst").unwrap().version, 2);
    }

    #[test]
    fn test_load_dir_reads_toml_files_only() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("analyst.toml"), VALID).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a persona").unwrap();

        let registry = PersonaRegistry::load_dir(dir.path()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("ai-analyst").is_some());
    }
}
