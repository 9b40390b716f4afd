//! Rule-based filter derivation, used when translation yields nothing usable.
//!
//! Rules are keyed by field type plus a field-name pattern and run in priority
//! order. For every field the first rule that produces a clause wins; later
//! rules never revisit that field.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::fields::{FieldDescriptor, FieldType};
use crate::filter::{FilterClause, FilterOp};
use crate::normalize::{canonical_label, categorical_name_pattern};
use crate::Row;

/// Lowercased, word-tokenized query text
#[derive(Debug, Clone)]
pub struct QueryText {
    words: Vec<String>,
}

impl QueryText {
    pub fn new(query: &str) -> Self {
        let words = query
            .to_lowercase()
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|w| !w.is_empty())
            .map(|w| w.trim_matches('\'').to_string())
            .filter(|w| !w.is_empty())
            .collect();
        Self { words }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Whole-word phrase match; `phrase` may span several words.
    pub fn contains_phrase(&self, phrase: &str) -> bool {
        let needle: Vec<String> = QueryText::new(phrase).words;
        if needle.is_empty() || needle.len() > self.words.len() {
            return false;
        }
        self.words.windows(needle.len()).any(|window| window == needle.as_slice())
    }
}

/// A single heuristic. Implement this to teach the fallback a new domain.
pub trait HeuristicRule: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs first
    fn priority(&self) -> u8;

    fn field_type(&self) -> FieldType;

    fn name_pattern(&self) -> &Regex;

    fn applies_to(&self, field: &FieldDescriptor) -> bool {
        field.field_type == self.field_type() && self.name_pattern().is_match(&field.name)
    }

    fn derive(&self, query: &QueryText, field: &FieldDescriptor, samples: &[Row]) -> Option<Value>;
}

pub const PRIORITY_BOOLEAN_STATE: u8 = 10;
pub const PRIORITY_CATEGORICAL: u8 = 20;

/// Maps phrase groups to a fixed value; groups are tried in order.
pub struct KeywordRule {
    name: String,
    priority: u8,
    field_type: FieldType,
    pattern: Regex,
    groups: Vec<(Vec<String>, Value)>,
}

impl KeywordRule {
    pub fn new(name: &str, priority: u8, field_type: FieldType, pattern: Regex) -> Self {
        Self {
            name: name.to_string(),
            priority,
            field_type,
            pattern,
            groups: Vec::new(),
        }
    }

    pub fn phrases(mut self, phrases: &[&str], value: Value) -> Self {
        self.groups
            .push((phrases.iter().map(|p| p.to_string()).collect(), value));
        self
    }

    /// Completion-state rule for boolean fields like `done` or `isCompleted`.
    /// Negative phrases are checked first since "not done" contains "done".
    pub fn completion_state() -> Self {
        let pattern = Regex::new(r"(?i)^(is_?)?(done|completed?|finished|checked)$")
            .expect("static regex");
        KeywordRule::new(
            "completion_state",
            PRIORITY_BOOLEAN_STATE,
            FieldType::Boolean,
            pattern,
        )
        .phrases(
            &[
                "not done",
                "not completed",
                "not complete",
                "not finished",
                "incomplete",
                "unfinished",
                "undone",
                "pending",
                "open",
                "todo",
                "outstanding",
                "remaining",
            ],
            Value::Bool(false),
        )
        .phrases(
            &["done", "completed", "complete", "finished", "checked"],
            Value::Bool(true),
        )
    }
}

impl HeuristicRule for KeywordRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn field_type(&self) -> FieldType {
        self.field_type
    }

    fn name_pattern(&self) -> &Regex {
        &self.pattern
    }

    fn derive(&self, query: &QueryText, _field: &FieldDescriptor, _samples: &[Row]) -> Option<Value> {
        self.groups
            .iter()
            .find(|(phrases, _)| phrases.iter().any(|p| query.contains_phrase(p)))
            .map(|(_, value)| value.clone())
    }
}

/// Categorical rule: exact case-insensitive match against values seen in
/// samples, then a fixed synonym table.
pub struct CategoryRule {
    pattern: Regex,
    synonyms: Vec<(Vec<String>, String)>,
}

impl CategoryRule {
    pub fn new() -> Self {
        Self {
            pattern: categorical_name_pattern().clone(),
            synonyms: Vec::new(),
        }
        .synonym(&["chore", "chores", "housework", "cleaning"], "Chores")
        .synonym(&["work", "job", "office"], "Work")
        .synonym(&["personal"], "Personal")
        .synonym(&["shopping", "groceries", "grocery", "errands"], "Shopping")
        .synonym(&["health", "fitness", "exercise", "workout"], "Health")
    }

    pub fn synonym(mut self, words: &[&str], label: &str) -> Self {
        self.synonyms.push((
            words.iter().map(|w| w.to_string()).collect(),
            label.to_string(),
        ));
        self
    }
}

impl Default for CategoryRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Distinct string values of `field` across `samples`, in first-seen order
pub fn distinct_string_values(field: &str, samples: &[Row]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for row in samples {
        if let Some(Value::String(s)) = row.get(field) {
            if !s.trim().is_empty() && seen.insert(s.to_lowercase()) {
                out.push(s.clone());
            }
        }
    }
    out
}

impl HeuristicRule for CategoryRule {
    fn name(&self) -> &str {
        "category"
    }

    fn priority(&self) -> u8 {
        PRIORITY_CATEGORICAL
    }

    fn field_type(&self) -> FieldType {
        FieldType::String
    }

    fn name_pattern(&self) -> &Regex {
        &self.pattern
    }

    fn derive(&self, query: &QueryText, field: &FieldDescriptor, samples: &[Row]) -> Option<Value> {
        let observed = distinct_string_values(&field.name, samples);
        if let Some(hit) = observed.iter().find(|v| query.contains_phrase(v)) {
            return Some(Value::String(hit.clone()));
        }
        let (_, label) = self
            .synonyms
            .iter()
            .find(|(words, _)| words.iter().any(|w| query.contains_phrase(w)))?;
        // Prefer the casing actually stored in the table
        let stored = observed
            .iter()
            .find(|v| v.eq_ignore_ascii_case(label))
            .cloned()
            .unwrap_or_else(|| canonical_label(label));
        Some(Value::String(stored))
    }
}

/// Ordered rule list applied by the fallback engine
pub struct HeuristicEngine {
    rules: Vec<Box<dyn HeuristicRule>>,
}

impl std::fmt::Debug for HeuristicEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeuristicEngine")
            .field(
                "rules",
                &self.rules.iter().map(|r| r.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for HeuristicEngine {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

impl HeuristicEngine {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_default_rules() -> Self {
        let mut engine = Self::empty();
        engine.register(Box::new(KeywordRule::completion_state()));
        engine.register(Box::new(CategoryRule::new()));
        engine
    }

    /// Add a rule, keeping the list sorted by priority. Equal priorities keep
    /// registration order.
    pub fn register(&mut self, rule: Box<dyn HeuristicRule>) {
        let pos = self
            .rules
            .iter()
            .position(|r| r.priority() > rule.priority())
            .unwrap_or(self.rules.len());
        self.rules.insert(pos, rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn apply(&self, query: &str, fields: &[FieldDescriptor], samples: &[Row]) -> Vec<FilterClause> {
        let text = QueryText::new(query);
        let mut claimed: BTreeSet<&str> = BTreeSet::new();
        let mut clauses = Vec::new();

        for rule in &self.rules {
            for field in fields.iter().filter(|f| !f.is_system()) {
                if claimed.contains(field.name.as_str()) || !rule.applies_to(field) {
                    continue;
                }
                if let Some(value) = rule.derive(&text, field, samples) {
                    claimed.insert(field.name.as_str());
                    clauses.push(FilterClause::new(field.name.clone(), FilterOp::Eq, value));
                }
            }
        }
        clauses
    }
}
