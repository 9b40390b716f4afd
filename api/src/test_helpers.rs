/// Shared fakes for compiler, executor and server tests
use anyhow::Result;
use async_trait::async_trait;
use filter_common::{
    has_field, with_system_fields, FieldDescriptor, FieldType, FilterError, FilterOp, Row,
    ScanPage, ScanRequest, TableIndex,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::llm::ModelProvider;
use crate::store_client::TableStore;

#[derive(Debug, Default, Clone)]
struct FakeTable {
    fields: Vec<FieldDescriptor>,
    indexes: Vec<TableIndex>,
    rows: Vec<Row>,
}

/// In-memory table store. Rejects scans that reference unknown fields, the way
/// the real store validates filters.
#[derive(Debug, Default)]
pub struct FakeStore {
    tables: HashMap<String, FakeTable>,
    scans: Mutex<Vec<ScanRequest>>,
    fail_scans: bool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, fields: Vec<FieldDescriptor>, rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        self.tables.insert(
            name.to_string(),
            FakeTable {
                fields,
                indexes: Vec::new(),
                rows,
            },
        );
        self
    }

    pub fn with_indexes(mut self, name: &str, indexes: Vec<TableIndex>) -> Self {
        self.tables.entry(name.to_string()).or_default().indexes = indexes;
        self
    }

    pub fn failing_scans(mut self) -> Self {
        self.fail_scans = true;
        self
    }

    pub fn scans(&self) -> Vec<ScanRequest> {
        self.scans.lock().unwrap().clone()
    }

    fn table(&self, name: &str) -> Result<&FakeTable, FilterError> {
        self.tables.get(name).ok_or_else(|| {
            let mut available: Vec<String> = self.tables.keys().cloned().collect();
            available.sort();
            FilterError::SchemaUnavailable {
                table: name.to_string(),
                available,
            }
        })
    }
}

#[async_trait]
impl TableStore for FakeStore {
    async fn list_tables(&self) -> Result<Vec<String>, FilterError> {
        let mut tables: Vec<String> = self.tables.keys().cloned().collect();
        tables.sort();
        Ok(tables)
    }

    async fn get_fields(&self, table: &str) -> Result<Vec<FieldDescriptor>, FilterError> {
        Ok(self.table(table)?.fields.clone())
    }

    async fn list_indexes(&self, table: &str) -> Result<Vec<TableIndex>, FilterError> {
        Ok(self.table(table)?.indexes.clone())
    }

    async fn scan(&self, request: &ScanRequest) -> Result<ScanPage, FilterError> {
        self.scans.lock().unwrap().push(request.clone());
        if self.fail_scans {
            return Err(FilterError::backing_store("connection reset"));
        }

        let table = self.table(&request.table)?;
        let payload = request.payload()?;
        let known = with_system_fields(table.fields.clone());
        for clause in &payload.clauses {
            if !has_field(&known, &clause.field) {
                return Err(FilterError::BackingStoreError {
                    message: format!("Unknown field '{}'", clause.field),
                    retryable: false,
                });
            }
        }

        let matching: Vec<Row> = table
            .rows
            .iter()
            .filter(|row| {
                payload.clauses.iter().all(|c| {
                    let actual = row.get(&c.field).unwrap_or(&Value::Null);
                    match c.op {
                        FilterOp::Eq => actual == &c.value,
                        FilterOp::Neq => actual != &c.value,
                        _ => true,
                    }
                })
            })
            .cloned()
            .collect();

        let offset: usize = request
            .pagination_opts
            .cursor
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        let end = (offset + request.pagination_opts.num_items).min(matching.len());
        let page = matching.get(offset..end).unwrap_or_default().to_vec();
        let is_done = end >= matching.len();

        Ok(ScanPage {
            page,
            is_done,
            continue_cursor: (!is_done).then(|| end.to_string()),
        })
    }
}

/// Model provider with a canned reply that counts its calls.
pub struct FakeModel {
    reply: Result<String, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_system: Mutex<Option<String>>,
}

impl FakeModel {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
            last_system: Mutex::new(None),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            ..Self::replying("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_system_prompt(&self) -> Option<String> {
        self.last_system.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for FakeModel {
    async fn generate(&self, system: &str, _user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system.lock().unwrap() = Some(system.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(|e| anyhow::anyhow!(e))
    }

    fn provider(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}

pub fn todo_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("title", FieldType::String, false),
        FieldDescriptor::new("done", FieldType::Boolean, false),
        FieldDescriptor::new("category", FieldType::String, true),
        FieldDescriptor::new("priority", FieldType::Number, true),
    ]
}

pub fn todo_rows() -> Vec<Value> {
    vec![
        json!({"_id": "t1", "_creationTime": 1000.0, "title": "Buy milk", "done": false, "category": "Shopping", "priority": 2}),
        json!({"_id": "t2", "_creationTime": 2000.0, "title": "Vacuum", "done": true, "category": "Chores", "priority": 1}),
        json!({"_id": "t3", "_creationTime": 3000.0, "title": "Dishes", "done": false, "category": "Chores"}),
        json!({"_id": "t4", "_creationTime": 4000.0, "title": "Report", "done": true, "category": "Work", "priority": 3}),
    ]
}

pub fn todo_store() -> FakeStore {
    FakeStore::new()
        .with_table("todos", todo_fields(), todo_rows())
        .with_indexes(
            "todos",
            vec![
                TableIndex::database("by_category", vec!["category".into()]),
                TableIndex::search("search_title", "title", vec!["done".into()]),
                TableIndex::vector("by_embedding", "embedding", 8),
            ],
        )
        .with_table("users", vec![FieldDescriptor::new("name", FieldType::String, false)], vec![])
}
