use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FilterError;
use crate::fields::{find_field, FieldDescriptor, FieldType, CREATION_TIME_FIELD, ID_FIELD};
use crate::filter::FilterOp;

/// Implicit index over `_creationTime`, present on every table
pub const BY_CREATION_TIME: &str = "by_creationTime";
/// Implicit index over `_id`, present on every table
pub const BY_ID: &str = "by_id";

/// Index declaration as reported by the backing store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexKind {
    Database {
        fields: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Search {
        search_field: String,
        #[serde(default)]
        filter_fields: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Vector {
        vector_field: String,
        dimensions: u32,
        #[serde(default)]
        filter_fields: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableIndex {
    pub name: String,
    #[serde(flatten)]
    pub kind: IndexKind,
    /// Still backfilling; not usable as a filter target yet
    #[serde(default)]
    pub staged: bool,
}

impl TableIndex {
    pub fn database(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Database { fields },
            staged: false,
        }
    }

    pub fn search(
        name: impl Into<String>,
        search_field: impl Into<String>,
        filter_fields: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Search {
                search_field: search_field.into(),
                filter_fields,
            },
            staged: false,
        }
    }

    pub fn vector(name: impl Into<String>, vector_field: impl Into<String>, dimensions: u32) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Vector {
                vector_field: vector_field.into(),
                dimensions,
                filter_fields: Vec::new(),
            },
            staged: false,
        }
    }

    pub fn by_creation_time() -> Self {
        Self::database(BY_CREATION_TIME, vec![CREATION_TIME_FIELD.to_string()])
    }

    pub fn by_id() -> Self {
        Self::database(BY_ID, vec![ID_FIELD.to_string()])
    }

    pub fn is_sentinel(&self) -> bool {
        self.name == BY_CREATION_TIME || self.name == BY_ID
    }

    pub fn is_selectable(&self) -> bool {
        !self.staged && !matches!(self.kind, IndexKind::Vector { .. })
    }

    /// Positional key fields of a database index.
    ///
    /// User indexes are implicitly suffixed with `_creationTime`; the sentinels
    /// cover exactly their own system field.
    pub fn key_fields(&self) -> Vec<String> {
        match &self.kind {
            IndexKind::Database { fields } => {
                let mut keys = fields.clone();
                if !self.is_sentinel() && keys.last().map(String::as_str) != Some(CREATION_TIME_FIELD)
                {
                    keys.push(CREATION_TIME_FIELD.to_string());
                }
                keys
            }
            _ => Vec::new(),
        }
    }
}

/// Indexes a user may pick as a filter target: sentinels first, then every
/// user index that is neither staged nor a vector index.
pub fn selectable_indexes(indexes: &[TableIndex]) -> Vec<TableIndex> {
    let mut out = vec![TableIndex::by_creation_time(), TableIndex::by_id()];
    out.extend(
        indexes
            .iter()
            .filter(|i| i.is_selectable() && !i.is_sentinel())
            .cloned(),
    );
    out
}

pub fn find_selectable(indexes: &[TableIndex], name: &str) -> Result<TableIndex, FilterError> {
    selectable_indexes(indexes)
        .into_iter()
        .find(|i| i.name == name)
        .ok_or_else(|| FilterError::InvalidIndex {
            name: name.to_string(),
        })
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LowerBound {
    Gt,
    Gte,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpperBound {
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IndexFilterClause {
    IndexEq {
        enabled: bool,
        #[serde(default)]
        value: Value,
    },
    #[serde(rename_all = "camelCase")]
    IndexRange {
        enabled: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lower_op: Option<LowerBound>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lower_value: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        op: Option<UpperBound>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

impl IndexFilterClause {
    pub fn is_enabled(&self) -> bool {
        match self {
            IndexFilterClause::IndexEq { enabled, .. } => *enabled,
            IndexFilterClause::IndexRange { enabled, .. } => *enabled,
        }
    }

    pub fn set_enabled(&mut self, on: bool) {
        match self {
            IndexFilterClause::IndexEq { enabled, .. } => *enabled = on,
            IndexFilterClause::IndexRange { enabled, .. } => *enabled = on,
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, IndexFilterClause::IndexRange { .. })
    }
}

/// Filter bound to a database index; clause *i* constrains key field *i*.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFilter {
    pub name: String,
    pub clauses: Vec<IndexFilterClause>,
}

impl IndexFilter {
    /// The clauses that actually constrain the scan: the leading run of
    /// enabled clauses, closed by the first range clause. Anything after a
    /// disabled clause is ignored rather than rejected.
    pub fn active_prefix(&self) -> &[IndexFilterClause] {
        let mut end = 0;
        for clause in &self.clauses {
            if !clause.is_enabled() {
                break;
            }
            end += 1;
            if clause.is_range() {
                break;
            }
        }
        &self.clauses[..end]
    }

    /// Enabled clauses that sit past the active prefix and have no effect.
    pub fn ignored_enabled(&self) -> usize {
        let prefix = self.active_prefix().len();
        self.clauses[prefix..]
            .iter()
            .filter(|c| c.is_enabled())
            .count()
    }

    pub fn set_clause_enabled(&mut self, position: usize, enabled: bool) -> bool {
        match self.clauses.get_mut(position) {
            Some(clause) => {
                clause.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    pub fn set_clause(&mut self, position: usize, clause: IndexFilterClause) -> bool {
        match self.clauses.get_mut(position) {
            Some(slot) => {
                *slot = clause;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIndexFilterClause {
    pub field: String,
    pub enabled: bool,
    #[serde(default = "default_search_op")]
    pub op: FilterOp,
    #[serde(default)]
    pub value: Value,
}

fn default_search_op() -> FilterOp {
    FilterOp::Eq
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIndexFilter {
    pub name: String,
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub clauses: Vec<SearchIndexFilterClause>,
}

impl SearchIndexFilter {
    pub fn enabled_clauses(&self) -> impl Iterator<Item = &SearchIndexFilterClause> {
        self.clauses.iter().filter(|c| c.enabled)
    }

    pub fn set_clause_enabled(&mut self, field: &str, enabled: bool) -> bool {
        match self.clauses.iter_mut().find(|c| c.field == field) {
            Some(clause) => {
                clause.enabled = enabled;
                true
            }
            None => false,
        }
    }
}

/// The index variant an expression is bound to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexBinding {
    Database(IndexFilter),
    Search(SearchIndexFilter),
}

impl IndexBinding {
    pub fn name(&self) -> &str {
        match self {
            IndexBinding::Database(f) => &f.name,
            IndexBinding::Search(f) => &f.name,
        }
    }

    pub fn has_active_clauses(&self) -> bool {
        match self {
            IndexBinding::Database(f) => !f.active_prefix().is_empty(),
            IndexBinding::Search(f) => !f.search.trim().is_empty() || f.enabled_clauses().next().is_some(),
        }
    }

    /// Fresh binding for a just-selected index: every clause present but disabled.
    /// Returns `None` for index kinds that cannot be filtered on.
    pub fn default_for(index: &TableIndex, fields: &[FieldDescriptor], now_ms: i64) -> Option<Self> {
        match &index.kind {
            IndexKind::Database { .. } => Some(IndexBinding::Database(IndexFilter {
                name: index.name.clone(),
                clauses: index
                    .key_fields()
                    .iter()
                    .map(|field| IndexFilterClause::IndexEq {
                        enabled: false,
                        value: default_value(field, fields, now_ms),
                    })
                    .collect(),
            })),
            IndexKind::Search { filter_fields, .. } => Some(IndexBinding::Search(SearchIndexFilter {
                name: index.name.clone(),
                search: String::new(),
                clauses: filter_fields
                    .iter()
                    .map(|field| SearchIndexFilterClause {
                        field: field.clone(),
                        enabled: false,
                        op: FilterOp::Eq,
                        value: default_value(field, fields, now_ms),
                    })
                    .collect(),
            })),
            IndexKind::Vector { .. } => None,
        }
    }
}

/// Placeholder value shown for a freshly added index clause
pub fn default_value(field: &str, fields: &[FieldDescriptor], now_ms: i64) -> Value {
    if field == CREATION_TIME_FIELD {
        return Value::from(now_ms);
    }
    if field == ID_FIELD {
        return Value::String(String::new());
    }
    match find_field(fields, field).map(|f| f.field_type) {
        Some(FieldType::String) | Some(FieldType::Id) => Value::String(String::new()),
        Some(FieldType::Number) => Value::from(0),
        Some(FieldType::Boolean) => Value::Bool(false),
        _ => Value::Null,
    }
}
