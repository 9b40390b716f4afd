use filter_common::{
    find_selectable, has_categorical_clause, has_field, normalize_observed, payload_for, sort_rows, FilterError,
    FilterExpression, IndexBinding, IndexKind, PaginationOpts, Row, ScanRequest, SortConfig,
    TableIndex, CREATION_TIME_FIELD,
};
use serde::Serialize;
use std::sync::Arc;

use crate::samples::SampleFetcher;
use crate::schema::SchemaIntrospector;
use crate::store_client::TableStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    pub rows: Vec<Row>,
    /// Continuation cursor for the next page; `None` once the scan is done
    pub cursor: Option<String>,
    pub is_done: bool,
    /// Clauses left out because their field is not in the table
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped_fields: Vec<String>,
}

/// Applies a filter expression to a paginated table scan.
#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<dyn TableStore>,
    schema: SchemaIntrospector,
    samples: SampleFetcher,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn TableStore>, samples: SampleFetcher) -> Self {
        Self {
            schema: SchemaIntrospector::new(store.clone()),
            store,
            samples,
        }
    }

    pub async fn execute(
        &self,
        table: &str,
        expression: &FilterExpression,
        pagination: PaginationOpts,
        sort: Option<&SortConfig>,
    ) -> Result<ExecuteResult, FilterError> {
        let fields = self.schema.get_fields(table).await?;
        if let Some(sort) = sort {
            if !has_field(&fields, &sort.field) {
                return Err(FilterError::UnknownFieldReference {
                    field: sort.field.clone(),
                });
            }
        }
        let mut expression = expression.clone();
        let mut dropped_fields = Vec::new();

        match expression.index.take() {
            Some(binding) => {
                let indexes = self.schema.list_indexes(table).await?;
                let index = find_selectable(&indexes, binding.name())?;
                let binding = conform_binding(binding, &index)?;
                if matches!(binding, IndexBinding::Search(_)) {
                    expression.order = None;
                }
                expression.index = Some(binding);
                expression.clauses.clear();
            }
            None => {
                dropped_fields = expression
                    .retain_known_fields(&fields)
                    .into_iter()
                    .map(|c| c.field)
                    .collect();
                if !dropped_fields.is_empty() {
                    tracing::info!(
                        "Dropping clauses on unknown fields of {}: {}",
                        table,
                        dropped_fields.join(", ")
                    );
                }
                // Categorical values take the casing stored in the table
                let samples = if has_categorical_clause(expression.enabled_clauses(), &fields) {
                    self.samples.get_samples(table).await
                } else {
                    Vec::new()
                };
                for clause in expression.clauses.iter_mut().filter(|c| c.enabled) {
                    clause.value =
                        normalize_observed(&clause.field, &clause.value, &fields, &samples);
                }
            }
        }

        let payload = payload_for(&expression);
        let filters = if payload.is_empty() {
            None
        } else {
            Some(payload.encode()?)
        };
        let request = ScanRequest {
            table: table.to_string(),
            filters,
            order: expression.order,
            pagination_opts: pagination,
        };

        let page = self.store.scan(&request).await.map_err(|e| {
            tracing::warn!("Scan of {} failed: {}", table, e);
            e
        })?;

        let mut rows = page.page;
        if let Some(sort) = effective_sort(&expression, sort) {
            if !self.store.sorts_server_side() {
                sort_rows(&mut rows, &sort, &fields);
            }
        }

        tracing::debug!(
            "Scan of {} returned {} rows (done: {})",
            table,
            rows.len(),
            page.is_done
        );
        Ok(ExecuteResult {
            rows,
            cursor: if page.is_done { None } else { page.continue_cursor },
            is_done: page.is_done,
            dropped_fields,
        })
    }
}

/// Explicit sort, else the expression's creation-time order in linear mode.
/// Index scans keep the order the store returns.
fn effective_sort(expression: &FilterExpression, sort: Option<&SortConfig>) -> Option<SortConfig> {
    if let Some(sort) = sort {
        return Some(sort.clone());
    }
    if expression.index.is_some() {
        return None;
    }
    expression
        .order
        .map(|direction| SortConfig::new(CREATION_TIME_FIELD, direction))
}

/// Check a binding against the index it names and trim it to what the index
/// declares: extra positional clauses and search clauses on undeclared
/// filter fields are discarded.
fn conform_binding(binding: IndexBinding, index: &TableIndex) -> Result<IndexBinding, FilterError> {
    match (binding, &index.kind) {
        (IndexBinding::Database(mut filter), IndexKind::Database { .. }) => {
            filter.clauses.truncate(index.key_fields().len());
            Ok(IndexBinding::Database(filter))
        }
        (IndexBinding::Search(mut filter), IndexKind::Search { filter_fields, .. }) => {
            filter.clauses.retain(|c| filter_fields.contains(&c.field));
            Ok(IndexBinding::Search(filter))
        }
        _ => Err(FilterError::InvalidIndex {
            name: index.name.clone(),
        }),
    }
}
