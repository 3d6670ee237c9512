//! Capability Module
//!
//! Decides which (modality, language, version) combinations have a model.
//!
//! Rules are evaluated top to bottom. The first rule whose version pattern
//! matches governs the outcome:
//!
//! ```text
//!  version ──► rule 0 ──► rule 1 ──► ... ──► rule n ──► UnknownVersion
//!                │           │                  │
//!             matches?    matches?           matches?
//!                ▼           ▼                  ▼
//!           predicate ? Ok : NoModelForCombination
//! ```

mod defaults;
mod registry;
mod rules;
mod types;

pub use defaults::default_rules;
pub use registry::CapabilityRegistry;
pub use rules::{
    load_rule_table, parse_rule_table, CapabilityRule, Clause, Constraint, RuleTableError,
    VersionPattern,
};
pub use types::{Language, Modality};
