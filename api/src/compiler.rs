use filter_common::{
    find_selectable, has_categorical_clause, normalize_observed, now_ms, FieldDescriptor,
    FilterError, FilterExpression, HeuristicEngine, PaginationOpts, Row, SortConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::executor::{ExecuteResult, QueryExecutor};
use crate::samples::SampleFetcher;
use crate::schema::SchemaIntrospector;
use crate::translator::NlTranslator;

/// Progress of a single compile request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileStage {
    Idle,
    Translating,
    FallbackApplied,
    Validating,
    Normalizing,
    Executing,
    Returned,
    Failed,
}

impl std::fmt::Display for CompileStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompileStage::Idle => "idle",
            CompileStage::Translating => "translating",
            CompileStage::FallbackApplied => "fallback_applied",
            CompileStage::Validating => "validating",
            CompileStage::Normalizing => "normalizing",
            CompileStage::Executing => "executing",
            CompileStage::Returned => "returned",
            CompileStage::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub stage: CompileStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// What the caller asked for
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    NaturalLanguage {
        table: String,
        query: String,
    },
    /// Hand-edited expression from the clause editor
    Expression {
        table: String,
        expression: FilterExpression,
    },
    /// Index picker: bind a fresh expression to the named index
    SelectIndex {
        table: String,
        index: String,
    },
}

impl Intent {
    pub fn table(&self) -> &str {
        match self {
            Intent::NaturalLanguage { table, .. }
            | Intent::Expression { table, .. }
            | Intent::SelectIndex { table, .. } => table,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledFilter {
    pub table: String,
    pub expression: FilterExpression,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_config: Option<SortConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    pub fallback_applied: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped_fields: Vec<String>,
    pub trace: Vec<TraceEntry>,
}

impl CompiledFilter {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            expression: FilterExpression::default(),
            sort_config: None,
            limit: None,
            fallback_applied: false,
            dropped_fields: Vec::new(),
            trace: vec![TraceEntry {
                stage: CompileStage::Idle,
                detail: None,
            }],
        }
    }

    fn enter(&mut self, stage: CompileStage, detail: Option<String>) {
        tracing::debug!("Compile of {} entering {}", self.table, stage);
        self.trace.push(TraceEntry { stage, detail });
    }

    pub fn stage(&self) -> CompileStage {
        self.trace
            .last()
            .map(|t| t.stage)
            .unwrap_or(CompileStage::Idle)
    }
}

/// Turns intents into validated, normalized filter expressions.
pub struct FilterCompiler {
    schema: SchemaIntrospector,
    samples: SampleFetcher,
    translator: NlTranslator,
    heuristics: HeuristicEngine,
    executor: QueryExecutor,
}

impl FilterCompiler {
    pub fn new(
        schema: SchemaIntrospector,
        samples: SampleFetcher,
        translator: NlTranslator,
        heuristics: HeuristicEngine,
        executor: QueryExecutor,
    ) -> Self {
        Self {
            schema,
            samples,
            translator,
            heuristics,
            executor,
        }
    }

    pub fn schema(&self) -> &SchemaIntrospector {
        &self.schema
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub async fn compile(&self, intent: &Intent) -> Result<CompiledFilter, FilterError> {
        let mut compiled = self.build(intent).await?;
        compiled.enter(CompileStage::Returned, None);
        Ok(compiled)
    }

    async fn build(&self, intent: &Intent) -> Result<CompiledFilter, FilterError> {
        let mut compiled = CompiledFilter::new(intent.table());
        let fields = self.schema.get_fields(intent.table()).await?;
        let mut samples: Option<Vec<Row>> = None;

        match intent {
            Intent::NaturalLanguage { table, query } => {
                compiled.enter(CompileStage::Translating, None);
                let rows = self.samples.get_samples(table).await;
                self.translate_into(&mut compiled, table, query, &fields, &rows)
                    .await;
                samples = Some(rows);
            }
            Intent::Expression { table, expression } => {
                compiled.expression = expression.clone();
                if let Some(binding) = &expression.index {
                    let indexes = self.schema.list_indexes(table).await?;
                    find_selectable(&indexes, binding.name())?;
                }
            }
            Intent::SelectIndex { table, index } => {
                let indexes = self.schema.list_indexes(table).await?;
                let index = find_selectable(&indexes, index)?;
                compiled
                    .expression
                    .select_index(&index, &fields, now_ms())?;
            }
        }

        compiled.enter(CompileStage::Validating, None);
        let dropped = compiled.expression.retain_known_fields(&fields);
        compiled
            .dropped_fields
            .extend(dropped.into_iter().map(|c| c.field));

        compiled.enter(CompileStage::Normalizing, None);
        let samples = match samples {
            Some(rows) => rows,
            None if has_categorical_clause(&compiled.expression.clauses, &fields) => {
                self.samples.get_samples(intent.table()).await
            }
            None => Vec::new(),
        };
        for clause in compiled.expression.clauses.iter_mut() {
            clause.value = normalize_observed(&clause.field, &clause.value, &fields, &samples);
        }
        Ok(compiled)
    }

    /// Compile, then fetch the first page. A translated `limit` caps the page
    /// size. Compile errors fail the call; execution errors are returned next to
    /// the compiled filter so the trace shows where it stopped.
    pub async fn compile_and_execute(
        &self,
        intent: &Intent,
        pagination: PaginationOpts,
    ) -> Result<(CompiledFilter, Result<ExecuteResult, FilterError>), FilterError> {
        let mut compiled = self.build(intent).await?;
        compiled.enter(CompileStage::Executing, None);

        let mut pagination = pagination;
        if let Some(limit) = compiled.limit {
            pagination.num_items = pagination.num_items.min(limit);
        }

        let result = self
            .executor
            .execute(
                &compiled.table,
                &compiled.expression,
                pagination,
                compiled.sort_config.as_ref(),
            )
            .await;
        match &result {
            Ok(_) => compiled.enter(CompileStage::Returned, None),
            Err(e) => {
                tracing::warn!("Filter execution on {} failed: {}", compiled.table, e);
                compiled.enter(CompileStage::Failed, Some(e.to_string()));
            }
        }
        Ok((compiled, result))
    }

    /// Model translation with heuristic fallback. Never fails: the worst case
    /// is an empty, unfiltered expression.
    async fn translate_into(
        &self,
        compiled: &mut CompiledFilter,
        table: &str,
        query: &str,
        fields: &[FieldDescriptor],
        samples: &[Row],
    ) {
        let failure = match self.translator.translate(query, table, fields, samples).await {
            Ok(candidate) if !candidate.is_empty() => {
                compiled.expression = FilterExpression::with_clauses(candidate.filters);
                compiled.sort_config = candidate.sort_config;
                compiled.limit = candidate.limit;
                compiled.dropped_fields = candidate.dropped_fields;
                return;
            }
            Ok(candidate) => {
                compiled.sort_config = candidate.sort_config;
                compiled.limit = candidate.limit;
                compiled.dropped_fields = candidate.dropped_fields;
                "translation produced no filters".to_string()
            }
            Err(e) => {
                tracing::info!("Translation for {} failed, using heuristics: {}", table, e);
                e.to_string()
            }
        };

        let clauses = self.heuristics.apply(query, fields, samples);
        tracing::debug!(
            "Heuristics derived {} clause(s) for {:?} on {}",
            clauses.len(),
            query,
            table
        );
        compiled.expression = FilterExpression::with_clauses(clauses);
        compiled.fallback_applied = true;
        compiled.enter(CompileStage::FallbackApplied, Some(failure));
    }
}

/// Issued per request so a caller can tell whether a finished compile is
/// still the one it is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestToken {
    pub caller: String,
    pub sequence: u64,
    pub request_id: uuid::Uuid,
}

/// Tracks the latest request per caller; anything older is stale.
#[derive(Debug, Default)]
pub struct RequestTracker {
    next: AtomicU64,
    latest: Mutex<HashMap<String, u64>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, caller: &str) -> RequestToken {
        let sequence = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut latest) = self.latest.lock() {
            latest.insert(caller.to_string(), sequence);
        }
        RequestToken {
            caller: caller.to_string(),
            sequence,
            request_id: uuid::Uuid::new_v4(),
        }
    }

    pub fn is_current(&self, token: &RequestToken) -> bool {
        self.latest
            .lock()
            .map(|latest| latest.get(&token.caller) == Some(&token.sequence))
            .unwrap_or(false)
    }
}
