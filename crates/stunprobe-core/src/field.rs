//! Field domains and the validated field table.

use std::collections::HashMap;

use serde_json::Value;

use crate::{
    error::TableError,
    rules::{DependencyRule, RuleSet},
};

/// Test domain of one configuration key.
///
/// `acceptable` values are legal on their own and in combination with every
/// other field's acceptable values. `errors` are dominant: any one of them
/// makes the whole configuration invalid.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    key: String,
    acceptable: Vec<Value>,
    errors: Vec<Value>,
    optional: bool,
}

impl FieldSpec {
    /// New optional field with empty domains.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into(), acceptable: Vec::new(), errors: Vec::new(), optional: true }
    }

    /// Add an acceptable value.
    #[must_use]
    pub fn accept(mut self, value: impl Into<Value>) -> Self {
        self.acceptable.push(value.into());
        self
    }

    /// Add an error value.
    #[must_use]
    pub fn reject(mut self, value: impl Into<Value>) -> Self {
        self.errors.push(value.into());
        self
    }

    /// Mark the field as required: omitting it invalidates the configuration.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.optional = false;
        self
    }

    /// Configuration key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Acceptable values in declaration order.
    pub fn acceptable(&self) -> &[Value] {
        &self.acceptable
    }

    /// Error values in declaration order.
    pub fn errors(&self) -> &[Value] {
        &self.errors
    }

    /// Whether omitting the key is legal.
    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

/// Ordered, validated list of field domains plus the rules that apply to them.
///
/// Generation order is declaration order. The table is immutable once built.
#[derive(Debug, Clone)]
pub struct FieldTable {
    fields: Vec<FieldSpec>,
    positions: HashMap<String, usize>,
    rules: RuleSet,
}

impl FieldTable {
    /// Validate and build a table.
    ///
    /// # Errors
    ///
    /// - [`TableError::DuplicateKey`] if two fields share a key
    /// - [`TableError::OverlappingValue`] if a value is both acceptable and an
    ///   error for the same field
    /// - [`TableError::DuplicateRule`] if two rules share a name
    /// - [`TableError::UnknownKey`] if a rule reads or skips a key that is not
    ///   declared
    /// - [`TableError::LookAhead`] if a rule's trigger key is not declared
    ///   strictly before a key it skips
    pub fn new(fields: Vec<FieldSpec>, rules: Vec<DependencyRule>) -> Result<Self, TableError> {
        let mut positions = HashMap::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            if positions.insert(field.key.clone(), index).is_some() {
                return Err(TableError::DuplicateKey(field.key.clone()));
            }
            if let Some(value) = field.errors.iter().find(|v| field.acceptable.contains(v)) {
                return Err(TableError::OverlappingValue {
                    key: field.key.clone(),
                    value: value.to_string(),
                });
            }
        }

        let mut names = Vec::with_capacity(rules.len());
        for rule in &rules {
            if names.contains(&rule.name()) {
                return Err(TableError::DuplicateRule(rule.name().to_string()));
            }
            names.push(rule.name());

            let trigger = rule.condition().key();
            let trigger_at = *positions.get(trigger).ok_or_else(|| TableError::UnknownKey {
                rule: rule.name().to_string(),
                key: trigger.to_string(),
            })?;

            for target in rule.targets() {
                let target_at = *positions.get(target).ok_or_else(|| TableError::UnknownKey {
                    rule: rule.name().to_string(),
                    key: target.clone(),
                })?;
                if trigger_at >= target_at {
                    return Err(TableError::LookAhead {
                        rule: rule.name().to_string(),
                        trigger: trigger.to_string(),
                        target: target.clone(),
                    });
                }
            }
        }

        Ok(Self { fields, positions, rules: RuleSet::new(rules) })
    }

    /// Table without dependency rules.
    ///
    /// # Errors
    ///
    /// Same field-level errors as [`FieldTable::new`].
    pub fn without_rules(fields: Vec<FieldSpec>) -> Result<Self, TableError> {
        Self::new(fields, Vec::new())
    }

    /// Field at `index`, if any.
    pub fn field(&self, index: usize) -> Option<&FieldSpec> {
        self.fields.get(index)
    }

    /// All fields in generation order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Position of `key` in generation order.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.positions.get(key).copied()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the table declares no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Dependency rules.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Whether any rule reads or skips `key`.
    pub fn is_dependency_sensitive(&self, key: &str) -> bool {
        self.rules.references(key)
    }

    /// Case count the generator produces when no rule fires.
    ///
    /// `L(N) = 1`, `L(i) = (|acceptable_i| + 1) · L(i+1) + |errors_i|` for an
    /// optional field. A required field's omission is a leaf, so it
    /// contributes `|acceptable_i| · L(i+1) + |errors_i| + 1`. Saturates at
    /// `usize::MAX`.
    ///
    /// A firing rule does not add a case of its own: the branch that fires
    /// continues once at `i+1` in place of expanding the skipped field. A
    /// count of "`L(0)` plus one case per firing rule" therefore does not
    /// describe this generator, and the recurrence is exact only when no rule
    /// fires.
    pub fn expected_case_count(&self) -> usize {
        self.fields.iter().rev().fold(1usize, |downstream, field| {
            let branches = field.acceptable.len() + usize::from(field.optional);
            branches
                .saturating_mul(downstream)
                .saturating_add(field.errors.len())
                .saturating_add(usize::from(!field.optional))
        })
    }
}
