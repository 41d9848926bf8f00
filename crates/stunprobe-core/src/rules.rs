//! Dependency rules.
//!
//! A rule says "when this condition holds for the fields chosen so far, do not
//! exercise these later fields". Rules are declared per target key instead of
//! being matched against key patterns, so the set of skipped fields is
//! explicit and auditable.
//!
//! Evaluation only reads keys the generator has already decided. The table
//! enforces this at construction: a rule's trigger key must be declared before
//! every key it skips (see [`TableError::LookAhead`](crate::TableError)).

use std::collections::HashMap;

use serde_json::Value;
use stunprobe_config::OptionMap;

/// Predicate over the partially built configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The key is present and equal to `value`
    Equals {
        /// Key to read
        key: String,
        /// Value to compare against
        value: Value,
    },
    /// The key is absent or holds something other than `value`
    NotEquals {
        /// Key to read
        key: String,
        /// Value to compare against
        value: Value,
    },
}

impl Condition {
    /// `key == value`
    pub fn equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals { key: key.into(), value: value.into() }
    }

    /// `key != value` (absent counts as not equal)
    pub fn not_equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::NotEquals { key: key.into(), value: value.into() }
    }

    /// Key the condition reads.
    pub fn key(&self) -> &str {
        match self {
            Self::Equals { key, .. } | Self::NotEquals { key, .. } => key,
        }
    }

    /// Evaluate against a partial configuration.
    pub fn holds(&self, partial: &OptionMap) -> bool {
        match self {
            Self::Equals { key, value } => partial.get(key) == Some(value),
            Self::NotEquals { key, value } => partial.get(key) != Some(value),
        }
    }
}

/// A named cross-field rule.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyRule {
    name: String,
    when: Condition,
    skip: Vec<String>,
    reason: String,
}

impl DependencyRule {
    /// Create a rule that skips `skip` whenever `when` holds.
    pub fn new<I, K>(name: impl Into<String>, when: Condition, skip: I, reason: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            name: name.into(),
            when,
            skip: skip.into_iter().map(Into::into).collect(),
            reason: reason.into(),
        }
    }

    /// Rule name, used in annotations.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trigger condition.
    pub fn condition(&self) -> &Condition {
        &self.when
    }

    /// Keys this rule skips.
    pub fn targets(&self) -> &[String] {
        &self.skip
    }

    /// Human-readable reason recorded when the rule fires.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Outcome of evaluating the rule set for one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleAction<'a> {
    /// Expand the field's domain normally
    Continue,
    /// Leave the field absent; the rule that fired
    Skip(&'a DependencyRule),
}

/// Rules indexed by the field they skip.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<DependencyRule>,
    by_target: HashMap<String, Vec<usize>>,
}

impl RuleSet {
    /// Build the index. Validation against a table happens in
    /// [`FieldTable::new`](crate::FieldTable::new).
    pub fn new(rules: Vec<DependencyRule>) -> Self {
        let mut by_target: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, rule) in rules.iter().enumerate() {
            for target in &rule.skip {
                by_target.entry(target.clone()).or_default().push(index);
            }
        }
        Self { rules, by_target }
    }

    /// Empty rule set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// All rules in declaration order.
    pub fn rules(&self) -> &[DependencyRule] {
        &self.rules
    }

    /// Whether any rule reads or skips `key`.
    pub fn references(&self, key: &str) -> bool {
        self.by_target.contains_key(key) || self.rules.iter().any(|rule| rule.when.key() == key)
    }

    /// Decide how to treat `key` given the fields chosen so far.
    ///
    /// The first rule in declaration order that targets `key` and whose
    /// condition holds wins. Evaluation has no side effects.
    pub fn evaluate(&self, partial: &OptionMap, key: &str) -> RuleAction<'_> {
        self.by_target
            .get(key)
            .into_iter()
            .flatten()
            .map(|&index| &self.rules[index])
            .find(|rule| rule.when.holds(partial))
            .map_or(RuleAction::Continue, RuleAction::Skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_mode_rule() -> DependencyRule {
        DependencyRule::new(
            "basic-has-no-alternate",
            Condition::equals("mode", "basic"),
            ["alternate_port", "alternate_interface"],
            "basic mode has no alternate endpoint",
        )
    }

    #[test]
    fn not_equals_treats_absent_as_different() {
        let condition = Condition::not_equals("mode", "full");

        assert!(condition.holds(&OptionMap::new()));
        assert!(condition.holds(&OptionMap::new().with("mode", "basic")));
        assert!(!condition.holds(&OptionMap::new().with("mode", "full")));
    }

    #[test]
    fn equals_requires_presence() {
        let condition = Condition::equals("family", 6);

        assert!(!condition.holds(&OptionMap::new()));
        assert!(condition.holds(&OptionMap::new().with("family", 6)));
        assert!(!condition.holds(&OptionMap::new().with("family", "6")));
    }

    #[test]
    fn evaluate_fires_only_for_targets() {
        let rules = RuleSet::new(vec![basic_mode_rule()]);
        let partial = OptionMap::new().with("mode", "basic");

        assert!(matches!(rules.evaluate(&partial, "alternate_port"), RuleAction::Skip(_)));
        assert_eq!(rules.evaluate(&partial, "primary_port"), RuleAction::Continue);
        assert_eq!(
            rules.evaluate(&OptionMap::new().with("mode", "full"), "alternate_port"),
            RuleAction::Continue
        );
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = RuleSet::new(vec![
            DependencyRule::new("never", Condition::equals("mode", "half"), ["x"], "unused"),
            DependencyRule::new("always", Condition::not_equals("mode", "half"), ["x"], "used"),
        ]);

        match rules.evaluate(&OptionMap::new(), "x") {
            RuleAction::Skip(rule) => assert_eq!(rule.name(), "always"),
            RuleAction::Continue => panic!("expected a rule to fire"),
        }
    }

    #[test]
    fn references_cover_triggers_and_targets() {
        let rules = RuleSet::new(vec![basic_mode_rule()]);

        assert!(rules.references("mode"));
        assert!(rules.references("alternate_interface"));
        assert!(!rules.references("protocol"));
    }
}
