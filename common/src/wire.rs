use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::errors::FilterError;
use crate::filter::{FilterClause, FilterExpression, SortDirection};
use crate::index::{IndexBinding, IndexFilter, SearchIndexFilter};
use crate::Row;

pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Filter payload as the backing store expects it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clauses: Vec<FilterClause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexBinding>,
}

impl FilterPayload {
    /// Linear payload; only enabled clauses are ever placed on the wire.
    pub fn linear<'a>(clauses: impl IntoIterator<Item = &'a FilterClause>) -> Self {
        Self {
            clauses: clauses.into_iter().filter(|c| c.enabled).cloned().collect(),
            index: None,
        }
    }

    /// Index payload reduced to the clauses that constrain the scan
    pub fn index(binding: &IndexBinding) -> Self {
        let reduced = match binding {
            IndexBinding::Database(filter) => IndexBinding::Database(IndexFilter {
                name: filter.name.clone(),
                clauses: filter.active_prefix().to_vec(),
            }),
            IndexBinding::Search(filter) => IndexBinding::Search(SearchIndexFilter {
                name: filter.name.clone(),
                search: filter.search.clone(),
                clauses: filter.enabled_clauses().cloned().collect(),
            }),
        };
        Self {
            clauses: Vec::new(),
            index: Some(reduced),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty() && self.index.is_none()
    }

    pub fn encode(&self) -> Result<String, FilterError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| FilterError::backing_store(format!("Failed to encode filters: {}", e)))?;
        Ok(BASE64.encode(json))
    }

    pub fn decode(encoded: &str) -> Result<Self, FilterError> {
        let bytes = BASE64.decode(encoded.trim()).map_err(|e| FilterError::BackingStoreError {
            message: format!("Invalid filter encoding: {}", e),
            retryable: false,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| FilterError::BackingStoreError {
            message: format!("Invalid filter payload: {}", e),
            retryable: false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationOpts {
    pub cursor: Option<String>,
    pub num_items: usize,
}

impl Default for PaginationOpts {
    fn default() -> Self {
        Self {
            cursor: None,
            num_items: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PaginationOpts {
    pub fn first(num_items: usize) -> Self {
        Self {
            cursor: None,
            num_items,
        }
    }
}

/// Scan request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub table: String,
    /// base64(JSON(FilterPayload)); absent when nothing filters
    pub filters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortDirection>,
    pub pagination_opts: PaginationOpts,
}

impl ScanRequest {
    pub fn unfiltered(table: &str, pagination: PaginationOpts) -> Self {
        Self {
            table: table.to_string(),
            filters: None,
            order: None,
            pagination_opts: pagination,
        }
    }

    pub fn payload(&self) -> Result<FilterPayload, FilterError> {
        match &self.filters {
            Some(encoded) => FilterPayload::decode(encoded),
            None => Ok(FilterPayload::default()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPage {
    pub page: Vec<Row>,
    pub is_done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_cursor: Option<String>,
}

/// Payload for an expression, honoring the one-driver-at-a-time rule: the
/// index binding wins and `clauses` is ignored while it is set.
pub fn payload_for(expression: &FilterExpression) -> FilterPayload {
    match &expression.index {
        Some(binding) => FilterPayload::index(binding),
        None => FilterPayload::linear(&expression.clauses),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOp;
    use crate::index::IndexFilterClause;
    use serde_json::json;

    #[test]
    fn test_linear_payload_skips_disabled() {
        let clauses = vec![
            FilterClause::new("done", FilterOp::Eq, json!(true)),
            FilterClause::new("category", FilterOp::Eq, json!("Work")).disabled(),
        ];
        let payload = FilterPayload::linear(&clauses);
        assert_eq!(payload.clauses.len(), 1);
        assert_eq!(payload.clauses[0].field, "done");
    }

    #[test]
    fn test_linear_wire_shape() {
        let mut clause = FilterClause::new("done", FilterOp::Neq, json!(false));
        clause.id = "a".into();
        let payload = FilterPayload::linear(&[clause]);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"clauses": [{"id": "a", "field": "done", "op": "neq", "value": false, "enabled": true}]})
        );
    }

    #[test]
    fn test_index_payload_keeps_prefix_only() {
        let binding = IndexBinding::Database(IndexFilter {
            name: "by_category".into(),
            clauses: vec![
                IndexFilterClause::IndexEq {
                    enabled: true,
                    value: json!("Work"),
                },
                IndexFilterClause::IndexEq {
                    enabled: false,
                    value: json!(0),
                },
            ],
        });
        let payload = FilterPayload::index(&binding);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"index": {"type": "database", "name": "by_category", "clauses": [
                {"type": "indexEq", "enabled": true, "value": "Work"}
            ]}})
        );
    }

    #[test]
    fn test_expression_with_index_ignores_clauses() {
        let mut expression = FilterExpression::with_clauses(vec![FilterClause::new(
            "done",
            FilterOp::Eq,
            json!(true),
        )]);
        expression.index = Some(IndexBinding::Search(SearchIndexFilter {
            name: "search_title".into(),
            search: "milk".into(),
            clauses: vec![],
        }));
        let payload = payload_for(&expression);
        assert!(payload.clauses.is_empty());
        assert!(payload.index.is_some());
    }

    #[test]
    fn test_encode_decode() {
        let payload = FilterPayload::linear(&[FilterClause::new("title", FilterOp::Contains, json!("milk"))]);
        let encoded = payload.encode().unwrap();
        assert!(!encoded.contains('{'));
        assert_eq!(FilterPayload::decode(&encoded).unwrap(), payload);
        assert!(FilterPayload::decode("not base64!").is_err());
    }

    #[test]
    fn test_scan_page_wire_shape() {
        let page: ScanPage = serde_json::from_str(
            r#"{"page": [{"_id": "1", "title": "a"}], "isDone": false, "continueCursor": "c2"}"#,
        )
        .unwrap();
        assert_eq!(page.page.len(), 1);
        assert!(!page.is_done);
        assert_eq!(page.continue_cursor.as_deref(), Some("c2"));

        let req = ScanRequest::unfiltered("todos", PaginationOpts::first(5));
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"table": "todos", "filters": null, "paginationOpts": {"cursor": null, "numItems": 5}})
        );
    }
}
