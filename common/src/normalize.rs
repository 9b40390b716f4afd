//! Type- and domain-aware coercion of raw filter values.
//!
//! `normalize` is total and idempotent: every input yields some value, and
//! normalizing an already normalized value returns it unchanged.

use regex::Regex;
use serde_json::{Number, Value};
use std::sync::OnceLock;

use crate::fields::{find_field, FieldDescriptor, FieldType};
use crate::filter::FilterClause;
use crate::heuristics::distinct_string_values;
use crate::Row;

const TRUE_SYNONYMS: &[&str] = &[
    "true",
    "1",
    "yes",
    "y",
    "done",
    "completed",
    "complete",
    "checked",
];

const FALSE_SYNONYMS: &[&str] = &["false", "0", "no", "n", "not done", "pending", "open", "todo"];

/// Known category labels whose canonical casing is not plain title case
const CATEGORY_OVERRIDES: &[(&str, &str)] = &[
    ("chores", "Chores"),
    ("work", "Work"),
    ("personal", "Personal"),
    ("shopping", "Shopping"),
    ("health", "Health"),
    ("errands", "Errands"),
    ("api", "API"),
    ("ui", "UI"),
    ("qa", "QA"),
    ("devops", "DevOps"),
    ("faq", "FAQ"),
];

pub fn categorical_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(^|_)(?i:category|categories|type|kind|tag|label|group)$|[a-z](Category|Categories|Type|Kind|Tag|Label|Group)$")
            .expect("static regex")
    })
}

/// String fields whose values are a small set of labels rather than free text
pub fn is_categorical(field: &FieldDescriptor) -> bool {
    field.field_type == FieldType::String && categorical_name_pattern().is_match(&field.name)
}

/// Whether normalizing these clauses would consult observed sample values
pub fn has_categorical_clause<'a>(
    clauses: impl IntoIterator<Item = &'a FilterClause>,
    fields: &[FieldDescriptor],
) -> bool {
    clauses
        .into_iter()
        .any(|c| find_field(fields, &c.field).is_some_and(is_categorical))
}

pub fn normalize(field: &str, raw: &Value, fields: &[FieldDescriptor]) -> Value {
    normalize_observed(field, raw, fields, &[])
}

/// Same as [`normalize`], except that a categorical value matching a value
/// seen in `samples` (ignoring case and spacing) takes the stored spelling.
pub fn normalize_observed(
    field: &str,
    raw: &Value,
    fields: &[FieldDescriptor],
    samples: &[Row],
) -> Value {
    let Some(descriptor) = find_field(fields, field) else {
        return raw.clone();
    };
    match descriptor.field_type {
        FieldType::Boolean => normalize_boolean(raw),
        FieldType::Number => normalize_number(raw),
        FieldType::String if is_categorical(descriptor) => {
            normalize_category(raw, &distinct_string_values(field, samples))
        }
        _ => raw.clone(),
    }
}

pub fn parse_boolean(text: &str) -> Option<bool> {
    let lowered = text.trim().to_lowercase();
    if TRUE_SYNONYMS.contains(&lowered.as_str()) {
        Some(true)
    } else if FALSE_SYNONYMS.contains(&lowered.as_str()) {
        Some(false)
    } else {
        None
    }
}

fn normalize_boolean(raw: &Value) -> Value {
    match raw {
        Value::String(s) => parse_boolean(s).map(Value::Bool).unwrap_or_else(|| raw.clone()),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 1.0 => Value::Bool(true),
            Some(v) if v == 0.0 => Value::Bool(false),
            _ => raw.clone(),
        },
        _ => raw.clone(),
    }
}

fn normalize_number(raw: &Value) -> Value {
    let Value::String(s) = raw else {
        return raw.clone();
    };
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    match trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(n) => Value::Number(n),
        None => raw.clone(),
    }
}

fn normalize_category(raw: &Value, observed: &[String]) -> Value {
    let Value::String(s) = raw else {
        return raw.clone();
    };
    let wanted = fold(s);
    match observed.iter().find(|v| fold(v) == wanted) {
        Some(stored) => Value::String(stored.clone()),
        None => Value::String(canonical_label(s)),
    }
}

fn fold(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn label_override(word: &str) -> Option<&'static str> {
    let lowered = word.to_lowercase();
    CATEGORY_OVERRIDES
        .iter()
        .find(|(key, _)| *key == lowered)
        .map(|(_, label)| *label)
}

/// Canonical casing for a category label: override table first, title case otherwise.
pub fn canonical_label(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Some(label) = label_override(&collapsed) {
        return label.to_string();
    }
    collapsed
        .split(' ')
        .map(|word| match label_override(word) {
            Some(label) => label.to_string(),
            None => title_case_word(word),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
