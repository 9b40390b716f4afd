use filter_common::{
    find_field, CacheKey, FieldDescriptor, FieldType, FilterClause, FilterError, FilterOp, Row,
    SortConfig, SortDirection,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheStore;
use crate::llm::ModelProvider;

pub const TRANSLATE_OPERATION: &str = "translateQuery";
const MAX_SAMPLE_VALUES: usize = 8;

/// Structured reading of a natural-language query, already checked against the
/// table's fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationCandidate {
    #[serde(default)]
    pub filters: Vec<FilterClause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_config: Option<SortConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Field names the model referenced that the table does not have
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_fields: Vec<String>,
}

impl TranslationCandidate {
    /// No enabled filter survived parsing
    pub fn is_empty(&self) -> bool {
        !self.filters.iter().any(|c| c.enabled)
    }
}

pub struct NlTranslator {
    model: Option<Arc<dyn ModelProvider>>,
    cache: Arc<dyn CacheStore>,
    timeout: Duration,
}

impl NlTranslator {
    pub fn new(
        model: Option<Arc<dyn ModelProvider>>,
        cache: Arc<dyn CacheStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            cache,
            timeout,
        }
    }

    pub async fn translate(
        &self,
        query: &str,
        table: &str,
        fields: &[FieldDescriptor],
        samples: &[Row],
    ) -> Result<TranslationCandidate, FilterError> {
        if fields.is_empty() {
            return Err(FilterError::SchemaRequired);
        }
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| FilterError::TranslationError("No model provider configured".into()))?;

        let key = CacheKey::derive(
            model.provider(),
            model.model(),
            TRANSLATE_OPERATION,
            &json!({ "query": query, "table": table, "fields": fields }),
        );

        match self.cache.get(&key).await {
            Ok(Some(entry)) => match serde_json::from_value::<TranslationCandidate>(entry.value) {
                Ok(candidate) => {
                    tracing::debug!("Translation cache hit for {} ({})", table, key);
                    return Ok(candidate);
                }
                Err(e) => tracing::warn!("Ignoring unreadable cache entry {}: {}", key, e),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("Translation cache lookup failed: {:#}", e),
        }

        let system = build_system_prompt(table, fields, samples);
        let text = match tokio::time::timeout(self.timeout, model.generate(&system, query)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(FilterError::TranslationError(format!("{:#}", e))),
            Err(_) => {
                return Err(FilterError::TranslationTimeout {
                    budget_ms: self.timeout.as_millis() as u64,
                })
            }
        };

        let candidate = parse_candidate(&text, fields)?;
        if !candidate.dropped_fields.is_empty() {
            tracing::info!(
                "Dropped translated references to unknown fields on {}: {}",
                table,
                candidate.dropped_fields.join(", ")
            );
        }

        match serde_json::to_value(&candidate) {
            Ok(value) => {
                if let Err(e) = self.cache.put(&key, &value).await {
                    tracing::warn!("Failed to store translation {}: {:#}", key, e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize translation {}: {}", key, e),
        }
        Ok(candidate)
    }
}

pub fn build_system_prompt(table: &str, fields: &[FieldDescriptor], samples: &[Row]) -> String {
    let mut prompt = format!(
        "You translate natural-language requests into filters for the table \"{}\".\n\nFields:\n",
        table
    );
    for field in fields {
        prompt.push_str(&format!(
            "- {} ({}{})",
            field.name,
            field.field_type,
            if field.optional { ", optional" } else { "" }
        ));
        if matches!(field.field_type, FieldType::String | FieldType::Boolean) {
            let values = sample_values(&field.name, samples);
            if !values.is_empty() {
                prompt.push_str(&format!(" e.g. {}", values.join(", ")));
            }
        }
        prompt.push('\n');
    }

    let ops: Vec<&str> = FilterOp::ALL.iter().map(|op| op.as_str()).collect();
    prompt.push_str(&format!("\nOperators: {}\n", ops.join(", ")));
    prompt.push_str(
        "\nRespond with a single JSON object and nothing else:\n\
         {\"filters\": [{\"field\": \"<field>\", \"op\": \"<operator>\", \"value\": <json value>}], \
         \"sortConfig\": {\"field\": \"<field>\", \"direction\": \"asc\" | \"desc\"} | null, \
         \"limit\": <positive integer> | null}\n\
         Only use the fields listed above. Use an empty filters array when nothing applies.\n",
    );
    prompt
}

/// Distinct string and boolean values of `field` across the samples, JSON-rendered
fn sample_values(field: &str, samples: &[Row]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for value in samples.iter().filter_map(|row| row.get(field)) {
        if !(value.is_string() || value.is_boolean()) {
            continue;
        }
        let rendered = value.to_string();
        if seen.insert(rendered.clone()) {
            out.push(rendered);
            if out.len() == MAX_SAMPLE_VALUES {
                break;
            }
        }
    }
    out
}

/// Parse a model response. Tolerates prose around the JSON and code fences;
/// individual malformed entries are skipped rather than failing the whole reply.
pub fn parse_candidate(text: &str, fields: &[FieldDescriptor]) -> Result<TranslationCandidate, FilterError> {
    let root = extract_json(text).ok_or_else(|| {
        FilterError::TranslationError("Model response contained no JSON object".into())
    })?;

    let (raw_filters, raw_sort, raw_limit) = match &root {
        Value::Array(items) => (items.as_slice(), None, None),
        Value::Object(map) => (
            map.get("filters")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default(),
            map.get("sortConfig").or_else(|| map.get("sort")),
            map.get("limit"),
        ),
        _ => {
            return Err(FilterError::TranslationError(
                "Model response is not a JSON object".into(),
            ))
        }
    };

    let mut candidate = TranslationCandidate::default();
    for raw in raw_filters {
        match parse_clause(raw) {
            Some(clause) if find_field(fields, &clause.field).is_some() => {
                candidate.filters.push(clause)
            }
            Some(clause) => candidate.dropped_fields.push(clause.field),
            None => tracing::debug!("Skipping malformed filter entry: {}", raw),
        }
    }

    if let Some(sort) = raw_sort.and_then(parse_sort) {
        if find_field(fields, &sort.field).is_some() {
            candidate.sort_config = Some(sort);
        } else {
            candidate.dropped_fields.push(sort.field);
        }
    }

    candidate.limit = raw_limit.and_then(parse_limit);
    Ok(candidate)
}

fn parse_clause(raw: &Value) -> Option<FilterClause> {
    let obj = raw.as_object()?;
    let field = obj.get("field")?.as_str()?.trim();
    if field.is_empty() {
        return None;
    }
    let op: FilterOp = obj
        .get("op")
        .or_else(|| obj.get("operator"))?
        .as_str()?
        .parse()
        .ok()?;
    let value = obj.get("value")?.clone();
    let mut clause = FilterClause::new(field, op, value);
    if let Some(enabled) = obj.get("enabled").and_then(Value::as_bool) {
        clause.enabled = enabled;
    }
    Some(clause)
}

fn parse_sort(raw: &Value) -> Option<SortConfig> {
    let obj = raw.as_object()?;
    let field = obj.get("field")?.as_str()?.trim();
    if field.is_empty() {
        return None;
    }
    let direction = match obj.get("direction").and_then(Value::as_str) {
        Some(d) => d.parse().ok()?,
        None => SortDirection::Asc,
    };
    Some(SortConfig::new(field, direction))
}

fn parse_limit(raw: &Value) -> Option<usize> {
    match raw {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f > 0.0).map(|f| f as u64))
            .filter(|n| *n > 0)
            .map(|n| n as usize),
        Value::String(s) => s.trim().parse::<usize>().ok().filter(|n| *n > 0),
        _ => None,
    }
}

/// First JSON object (or array) embedded in `text`.
fn extract_json(text: &str) -> Option<Value> {
    first_json_value(strip_code_fence(text)).or_else(|| first_json_value(text))
}

fn first_json_value(body: &str) -> Option<Value> {
    for (start, ch) in body.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&body[start..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            if value.is_object() || value.is_array() {
                return Some(value);
            }
        }
    }
    None
}

fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after = &text[open + 3..];
    // Skip the info string, e.g. ```json
    let content_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let content = &after[content_start..];
    match content.find("```") {
        Some(close) => &content[..close],
        None => content,
    }
}
