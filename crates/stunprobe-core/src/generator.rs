//! Recursive case generation.
//!
//! The generator walks the table left to right. At field `i` with partial
//! configuration `C`:
//!
//! ```text
//!           rule fires? ──yes──> skip key_i, annotate, continue at i+1
//!               │ no
//!     ┌─────────┼──────────────────────────────┐
//!     ↓         ↓                              ↓
//! acceptable  errors                        omitted
//! C[k]=v,     C[k]=v, emit Reject           optional: continue at i+1
//! continue    (never recurses)              required: emit Reject
//! at i+1
//! ```
//!
//! Continuing past the last field emits `(C, Accept)`. Every branch works on
//! its own copy of `C`.
//!
//! Cases are handed to a visitor as they are produced, so a run never holds
//! more than one case plus the current path.

use stunprobe_config::OptionMap;

use crate::{
    case::{CaseKind, ExpectedOutcome, SkipAnnotation, TestCase},
    field::FieldTable,
    rules::RuleAction,
};

/// Depth-first case generator over a [`FieldTable`].
#[derive(Debug, Clone, Copy)]
pub struct CaseGenerator<'a> {
    table: &'a FieldTable,
}

impl<'a> CaseGenerator<'a> {
    /// Create a generator over `table`.
    pub fn new(table: &'a FieldTable) -> Self {
        Self { table }
    }

    /// Table being walked.
    pub fn table(&self) -> &'a FieldTable {
        self.table
    }

    /// Produce every case in generation order.
    ///
    /// Returns the number of cases produced.
    pub fn generate<F>(&self, visit: F) -> usize
    where
        F: FnMut(TestCase),
    {
        let mut sink = Sink { next_ordinal: 0, visit };
        self.expand(0, &OptionMap::new(), &[], &mut sink);
        sink.next_ordinal
    }

    /// Collect every case. Intended for inspection and tests; runs should
    /// prefer [`generate`](Self::generate).
    pub fn cases(&self) -> Vec<TestCase> {
        let mut out = Vec::new();
        self.generate(|case| out.push(case));
        out
    }

    fn expand<F>(&self, index: usize, partial: &OptionMap, notes: &[SkipAnnotation], sink: &mut Sink<F>)
    where
        F: FnMut(TestCase),
    {
        let Some(field) = self.table.field(index) else {
            sink.emit(partial.clone(), ExpectedOutcome::Accept, CaseKind::Valid, notes);
            return;
        };

        if let RuleAction::Skip(rule) = self.table.rules().evaluate(partial, field.key()) {
            let mut notes = notes.to_vec();
            notes.push(SkipAnnotation::new(field, rule));
            self.expand(index + 1, partial, &notes, sink);
            return;
        }

        for value in field.acceptable() {
            let mut next = partial.clone();
            next.insert(field.key(), value.clone());
            self.expand(index + 1, &next, notes, sink);
        }

        for value in field.errors() {
            let mut next = partial.clone();
            next.insert(field.key(), value.clone());
            let kind = CaseKind::ErrorValue { key: field.key().to_string() };
            sink.emit(next, ExpectedOutcome::Reject, kind, notes);
        }

        if field.is_optional() {
            self.expand(index + 1, partial, notes, sink);
        } else {
            let kind = CaseKind::MissingRequired { key: field.key().to_string() };
            sink.emit(partial.clone(), ExpectedOutcome::Reject, kind, notes);
        }
    }
}

struct Sink<F> {
    next_ordinal: usize,
    visit: F,
}

impl<F> Sink<F>
where
    F: FnMut(TestCase),
{
    fn emit(
        &mut self,
        config: OptionMap,
        expected: ExpectedOutcome,
        kind: CaseKind,
        notes: &[SkipAnnotation],
    ) {
        let case = TestCase {
            ordinal: self.next_ordinal,
            config,
            expected,
            kind,
            annotations: notes.to_vec(),
        };
        self.next_ordinal += 1;
        (self.visit)(case);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        field::FieldSpec,
        rules::{Condition, DependencyRule},
    };

    fn protocol_only(optional: bool) -> FieldTable {
        let mut field = FieldSpec::new("protocol").accept("tcp").reject("tls");
        if !optional {
            field = field.required();
        }
        FieldTable::without_rules(vec![field]).expect("valid table")
    }

    #[test]
    fn single_optional_field_yields_three_cases() {
        let table = protocol_only(true);
        let cases = CaseGenerator::new(&table).cases();

        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].config, OptionMap::new().with("protocol", "tcp"));
        assert_eq!(cases[0].expected, ExpectedOutcome::Accept);
        assert_eq!(cases[1].config, OptionMap::new().with("protocol", "tls"));
        assert_eq!(cases[1].expected, ExpectedOutcome::Reject);
        assert_eq!(cases[2].config, OptionMap::new());
        assert_eq!(cases[2].expected, ExpectedOutcome::Accept);
    }

    #[test]
    fn single_required_field_rejects_omission() {
        let table = protocol_only(false);
        let cases = CaseGenerator::new(&table).cases();

        assert_eq!(cases.len(), 3);
        assert_eq!(cases[2].config, OptionMap::new());
        assert_eq!(cases[2].expected, ExpectedOutcome::Reject);
        assert_eq!(cases[2].kind, CaseKind::MissingRequired { key: "protocol".to_string() });
    }

    #[test]
    fn empty_table_yields_one_accept() {
        let table = FieldTable::without_rules(Vec::new()).expect("empty table");
        let cases = CaseGenerator::new(&table).cases();

        assert_eq!(cases.len(), 1);
        assert!(cases[0].config.is_empty());
        assert_eq!(cases[0].expected, ExpectedOutcome::Accept);
    }

    #[test]
    fn error_values_do_not_recurse() {
        let table = FieldTable::without_rules(vec![
            FieldSpec::new("a").reject("bad"),
            FieldSpec::new("b").accept(1).accept(2),
        ])
        .expect("valid table");
        let cases = CaseGenerator::new(&table).cases();

        let with_bad: Vec<_> = cases.iter().filter(|c| c.config.get("a") == Some(&json!("bad"))).collect();
        assert_eq!(with_bad.len(), 1);
        assert!(!with_bad[0].config.contains("b"));
        assert_eq!(with_bad[0].expected, ExpectedOutcome::Reject);
    }

    #[test]
    fn falsy_values_are_kept() {
        let table = FieldTable::without_rules(vec![FieldSpec::new("port").accept(0).accept(false)])
            .expect("valid table");
        let cases = CaseGenerator::new(&table).cases();

        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].config.get("port"), Some(&json!(0)));
        assert_eq!(cases[1].config.get("port"), Some(&json!(false)));
        assert!(!cases[2].config.contains("port"));
    }

    #[test]
    fn siblings_do_not_share_state() {
        let table = FieldTable::without_rules(vec![
            FieldSpec::new("a").accept(1).accept(2),
            FieldSpec::new("b").accept("x"),
        ])
        .expect("valid table");
        let configs: Vec<_> =
            CaseGenerator::new(&table).cases().into_iter().map(|c| c.config.to_string()).collect();

        assert_eq!(
            configs,
            vec![
                r#"{"a":1,"b":"x"}"#,
                r#"{"a":1}"#,
                r#"{"a":2,"b":"x"}"#,
                r#"{"a":2}"#,
                r#"{"b":"x"}"#,
                r#"{}"#,
            ]
        );
    }

    #[test]
    fn firing_rule_replaces_expansion_with_one_continuation() {
        let table = FieldTable::new(
            vec![
                FieldSpec::new("mode").accept("basic").accept("full"),
                FieldSpec::new("alternate_port").accept(3479).reject(0),
            ],
            vec![DependencyRule::new(
                "basic-has-no-alternate",
                Condition::equals("mode", "basic"),
                ["alternate_port"],
                "basic mode has no alternate endpoint",
            )],
        )
        .expect("valid table");
        let cases = CaseGenerator::new(&table).cases();

        let basic: Vec<_> =
            cases.iter().filter(|c| c.config.get("mode") == Some(&json!("basic"))).collect();
        assert_eq!(basic.len(), 1);
        assert!(!basic[0].config.contains("alternate_port"));
        assert!(basic[0].skipped("alternate_port"));
        assert_eq!(basic[0].annotations[0].rule, "basic-has-no-alternate");
        assert_eq!(basic[0].expected, ExpectedOutcome::Accept);

        let full = cases.iter().filter(|c| c.config.get("mode") == Some(&json!("full"))).count();
        assert_eq!(full, 3);
        // basic: 1, full: 3, omitted mode: 3
        assert_eq!(cases.len(), 7);
    }

    #[test]
    fn firing_rule_shrinks_the_count_below_the_recurrence() {
        let table = FieldTable::new(
            vec![
                FieldSpec::new("mode").accept("basic").accept("full"),
                FieldSpec::new("alternate_port").accept(3479).reject(0),
                FieldSpec::new("protocol").accept("tcp").reject("tls"),
            ],
            vec![DependencyRule::new(
                "basic-has-no-alternate",
                Condition::equals("mode", "basic"),
                ["alternate_port"],
                "basic mode has no alternate endpoint",
            )],
        )
        .expect("valid table");

        // L(protocol) = 3, L(alternate_port) = 7, L(mode) = 3 * 7 = 21. The
        // basic branch skips straight to protocol: 3 cases instead of 7, and
        // no extra case for the skip itself.
        assert_eq!(table.expected_case_count(), 21);
        let produced = CaseGenerator::new(&table).generate(|_| {});
        assert_eq!(produced, 17);

        let without_rules = FieldTable::without_rules(table.fields().to_vec()).expect("valid");
        assert_eq!(CaseGenerator::new(&without_rules).generate(|_| {}), 21);
    }

    #[test]
    fn ordinals_are_sequential() {
        let table = protocol_only(true);
        let mut ordinals = Vec::new();
        let produced = CaseGenerator::new(&table).generate(|case| ordinals.push(case.ordinal));

        assert_eq!(produced, 3);
        assert_eq!(ordinals, vec![0, 1, 2]);
    }
}
