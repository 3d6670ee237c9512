//! Capability registry
//!
//! Decides whether a (modality, language, version) triple has a model.

use std::path::Path;
use std::sync::Arc;

use super::defaults::default_rules;
use super::rules::{load_rule_table, CapabilityRule, RuleTableError};
use super::types::{Language, Modality};
use crate::error::GatewayError;

/// Immutable, ordered rule evaluator shared by all requests
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    rules: Arc<[CapabilityRule]>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl CapabilityRegistry {
    /// Create a registry over an ordered rule list
    pub fn new(rules: Vec<CapabilityRule>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    /// Create a registry from a JSON rule table file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RuleTableError> {
        Ok(Self::new(load_rule_table(path)?))
    }

    /// The ordered rule table
    pub fn rules(&self) -> &[CapabilityRule] {
        &self.rules
    }

    /// First rule whose pattern matches the version
    pub fn governing_rule(&self, version: &str) -> Option<&CapabilityRule> {
        self.rules.iter().find(|rule| rule.governs(version))
    }

    /// Validate a request triple
    ///
    /// Only the first matching rule is consulted. When its predicate fails the
    /// triple is rejected, even if a later rule would have accepted it.
    pub fn validate(
        &self,
        modality: Modality,
        language: Language,
        version: &str,
    ) -> Result<(), GatewayError> {
        let rule = self
            .governing_rule(version)
            .ok_or_else(|| GatewayError::UnknownVersion(version.to_string()))?;

        if rule.permits(modality, language) {
            Ok(())
        } else {
            Err(GatewayError::NoModelForCombination {
                modality,
                language,
                version: version.to_string(),
            })
        }
    }
}
