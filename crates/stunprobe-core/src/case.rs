//! Test cases produced by the generator.

use std::fmt;

use serde::Serialize;
use stunprobe_config::OptionMap;

use crate::{field::FieldSpec, rules::DependencyRule};

/// What the target is expected to do with a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedOutcome {
    /// `start` must succeed
    Accept,
    /// `start` must fail
    Reject,
}

impl fmt::Display for ExpectedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Why a leaf exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaseKind {
    /// Every field holds an acceptable value, was omitted, or was skipped
    Valid,
    /// The last decided field holds one of its error values
    ErrorValue {
        /// Field holding the error value
        key: String,
    },
    /// A required field was omitted
    MissingRequired {
        /// Omitted field
        key: String,
    },
}

/// Record of a dependency rule firing along a case's path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipAnnotation {
    /// Field that was not exercised
    pub key: String,
    /// Rule that fired
    pub rule: String,
    /// Rule's stated reason
    pub reason: String,
}

impl SkipAnnotation {
    pub(crate) fn new(field: &FieldSpec, rule: &DependencyRule) -> Self {
        Self {
            key: field.key().to_string(),
            rule: rule.name().to_string(),
            reason: rule.reason().to_string(),
        }
    }
}

impl fmt::Display for SkipAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skipped {} ({}: {})", self.key, self.rule, self.reason)
    }
}

/// A complete configuration with its expected outcome.
///
/// Each case owns its configuration; no two cases share a map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCase {
    /// Position in generation order, starting at 0
    pub ordinal: usize,
    /// Configuration handed to `start`
    pub config: OptionMap,
    /// Expected outcome
    pub expected: ExpectedOutcome,
    /// Why this leaf exists
    pub kind: CaseKind,
    /// Rules that fired along this case's path, in field order
    pub annotations: Vec<SkipAnnotation>,
}

impl TestCase {
    /// Whether the dependency rule skipped `key` on this case's path.
    pub fn skipped(&self, key: &str) -> bool {
        self.annotations.iter().any(|note| note.key == key)
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} -> {}", self.ordinal, self.config, self.expected)
    }
}
