//! Capability rule definitions
//!
//! A rule pairs a version pattern with a predicate over (modality, language).
//! Rules are data so that a deployment can ship its own table as JSON:
//!
//! ```json
//! [
//!   { "pattern": { "exact": "v2_iitb" },
//!     "allow": [ { "modality": { "one_of": ["printed"] },
//!                  "language": { "one_of": ["hi", "mr", "sa"] } } ] },
//!   { "pattern": { "family": "v2" },
//!     "allow": [ { "modality": { "one_of": ["printed"] } } ] }
//! ]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::types::{Language, Modality};

/// Version selector of a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionPattern {
    /// Matches one literal version string
    Exact(String),
    /// Matches every version starting with the given prefix
    Family(String),
}

impl VersionPattern {
    pub fn matches(&self, version: &str) -> bool {
        match self {
            Self::Exact(literal) => version == literal,
            Self::Family(prefix) => version.starts_with(prefix.as_str()),
        }
    }
}

/// Set constraint over one dimension of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint<T> {
    Any,
    OneOf(Vec<T>),
    NoneOf(Vec<T>),
}

impl<T> Default for Constraint<T> {
    fn default() -> Self {
        Self::Any
    }
}

impl<T: PartialEq> Constraint<T> {
    pub fn admits(&self, value: &T) -> bool {
        match self {
            Self::Any => true,
            Self::OneOf(values) => values.contains(value),
            Self::NoneOf(values) => !values.contains(value),
        }
    }
}

/// One allowed region of the (modality, language) space
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    #[serde(default)]
    pub modality: Constraint<Modality>,
    #[serde(default)]
    pub language: Constraint<Language>,
}

impl Clause {
    pub fn admits(&self, modality: Modality, language: Language) -> bool {
        self.modality.admits(&modality) && self.language.admits(&language)
    }
}

/// Ordered capability rule
///
/// The predicate holds when any clause admits the pair. A rule with no
/// clauses rejects every pair for the versions it governs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRule {
    pub pattern: VersionPattern,
    #[serde(default)]
    pub allow: Vec<Clause>,
}

impl CapabilityRule {
    pub fn exact(version: &str, allow: Vec<Clause>) -> Self {
        Self {
            pattern: VersionPattern::Exact(version.to_string()),
            allow,
        }
    }

    pub fn family(prefix: &str, allow: Vec<Clause>) -> Self {
        Self {
            pattern: VersionPattern::Family(prefix.to_string()),
            allow,
        }
    }

    /// Whether this rule governs the given version
    pub fn governs(&self, version: &str) -> bool {
        self.pattern.matches(version)
    }

    /// Evaluate the rule predicate
    pub fn permits(&self, modality: Modality, language: Language) -> bool {
        self.allow.iter().any(|clause| clause.admits(modality, language))
    }
}

/// Errors raised while loading a rule table
#[derive(Debug, thiserror::Error)]
pub enum RuleTableError {
    #[error("Failed to read rule table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid rule table: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rule table is empty")]
    Empty,

    #[error("Rule #{0} has an empty version pattern")]
    EmptyPattern(usize),
}

/// Parse an ordered rule table from JSON, keeping the declared order
pub fn parse_rule_table(json: &str) -> Result<Vec<CapabilityRule>, RuleTableError> {
    let rules: Vec<CapabilityRule> = serde_json::from_str(json)?;
    if rules.is_empty() {
        return Err(RuleTableError::Empty);
    }

    // An empty family prefix would swallow every later rule
    for (index, rule) in rules.iter().enumerate() {
        let text = match &rule.pattern {
            VersionPattern::Exact(v) | VersionPattern::Family(v) => v,
        };
        if text.is_empty() {
            return Err(RuleTableError::EmptyPattern(index));
        }
    }

    Ok(rules)
}

/// Load an ordered rule table from a JSON file
pub fn load_rule_table(path: impl AsRef<Path>) -> Result<Vec<CapabilityRule>, RuleTableError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| RuleTableError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_rule_table(&json)
}
