use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FilterError;
use crate::fields::{has_field, FieldDescriptor};
use crate::index::{IndexBinding, IndexKind, TableIndex};

/// Comparison operator of a linear filter clause
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
}

impl FilterOp {
    pub const ALL: [FilterOp; 10] = [
        FilterOp::Eq,
        FilterOp::Neq,
        FilterOp::Gt,
        FilterOp::Gte,
        FilterOp::Lt,
        FilterOp::Lte,
        FilterOp::Contains,
        FilterOp::NotContains,
        FilterOp::StartsWith,
        FilterOp::EndsWith,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Contains => "contains",
            FilterOp::NotContains => "not_contains",
            FilterOp::StartsWith => "starts_with",
            FilterOp::EndsWith => "ends_with",
        }
    }

    /// Operators that only make sense on string values
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            FilterOp::Contains | FilterOp::NotContains | FilterOp::StartsWith | FilterOp::EndsWith
        )
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FilterOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eq" | "=" | "==" | "equals" => Ok(FilterOp::Eq),
            "neq" | "ne" | "!=" | "<>" | "not_equals" => Ok(FilterOp::Neq),
            "gt" | ">" => Ok(FilterOp::Gt),
            "gte" | ">=" => Ok(FilterOp::Gte),
            "lt" | "<" => Ok(FilterOp::Lt),
            "lte" | "<=" => Ok(FilterOp::Lte),
            "contains" | "like" => Ok(FilterOp::Contains),
            "not_contains" | "notcontains" | "not_like" => Ok(FilterOp::NotContains),
            "starts_with" | "startswith" => Ok(FilterOp::StartsWith),
            "ends_with" | "endswith" => Ok(FilterOp::EndsWith),
            _ => Err(format!(
                "Invalid filter operator '{}'. Valid operators: eq, neq, gt, gte, lt, lte, contains, not_contains, starts_with, ends_with",
                s
            )),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

impl std::str::FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            _ => Err(format!("Invalid sort direction '{}'. Valid: asc, desc", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortConfig {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortConfig {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    #[serde(default = "new_clause_id")]
    pub id: String,
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

fn new_clause_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl FilterClause {
    /// New enabled clause with a generated id
    pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            id: new_clause_id(),
            field: field.into(),
            op,
            value,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Linear clause list, optionally superseded by an index binding.
///
/// Only one of the two drives execution: while `index` is set the clause list
/// is empty and ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpression {
    #[serde(default)]
    pub clauses: Vec<FilterClause>,
    /// Creation-time order; `null` for search-index scans, which rank by relevance
    #[serde(default = "default_order")]
    pub order: Option<SortDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexBinding>,
}

fn default_order() -> Option<SortDirection> {
    Some(SortDirection::Asc)
}

impl Default for FilterExpression {
    fn default() -> Self {
        Self {
            clauses: Vec::new(),
            order: default_order(),
            index: None,
        }
    }
}

impl FilterExpression {
    pub fn with_clauses(clauses: Vec<FilterClause>) -> Self {
        Self {
            clauses,
            ..Self::default()
        }
    }

    pub fn add_clause(&mut self, clause: FilterClause) -> String {
        let id = clause.id.clone();
        self.clauses.push(clause);
        id
    }

    pub fn remove_clause(&mut self, id: &str) -> Option<FilterClause> {
        let pos = self.clauses.iter().position(|c| c.id == id)?;
        Some(self.clauses.remove(pos))
    }

    /// Flip a clause's `enabled` flag in place. Returns the new state.
    pub fn toggle_clause(&mut self, id: &str) -> Option<bool> {
        let clause = self.clauses.iter_mut().find(|c| c.id == id)?;
        clause.enabled = !clause.enabled;
        Some(clause.enabled)
    }

    pub fn set_clause_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.clauses.iter_mut().find(|c| c.id == id) {
            Some(clause) => {
                clause.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn update_clause(&mut self, id: &str, op: Option<FilterOp>, value: Option<Value>) -> bool {
        let Some(clause) = self.clauses.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        if let Some(op) = op {
            clause.op = op;
        }
        if let Some(value) = value {
            clause.value = value;
        }
        true
    }

    pub fn enabled_clauses(&self) -> impl Iterator<Item = &FilterClause> {
        self.clauses.iter().filter(|c| c.enabled)
    }

    pub fn is_index_mode(&self) -> bool {
        self.index.is_some()
    }

    /// Bind the expression to a table index, resetting clause state.
    ///
    /// Database indexes keep the current order (defaulting to asc); search
    /// indexes clear it since relevance decides ordering.
    pub fn select_index(
        &mut self,
        index: &TableIndex,
        fields: &[FieldDescriptor],
        now_ms: i64,
    ) -> Result<(), FilterError> {
        if !index.is_selectable() {
            return Err(FilterError::InvalidIndex {
                name: index.name.clone(),
            });
        }
        let binding = IndexBinding::default_for(index, fields, now_ms).ok_or_else(|| {
            FilterError::InvalidIndex {
                name: index.name.clone(),
            }
        })?;
        self.clauses.clear();
        match index.kind {
            IndexKind::Search { .. } => self.order = None,
            _ => {
                self.order.get_or_insert(SortDirection::Asc);
            }
        }
        self.index = Some(binding);
        Ok(())
    }

    /// Return to linear filtering.
    pub fn clear_index(&mut self) {
        self.index = None;
        self.order.get_or_insert(SortDirection::Asc);
    }

    /// Drop clauses whose field is absent from `fields`. Returns the dropped ones.
    pub fn retain_known_fields(&mut self, fields: &[FieldDescriptor]) -> Vec<FilterClause> {
        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.clauses)
            .into_iter()
            .partition(|c| has_field(fields, &c.field));
        self.clauses = kept;
        dropped
    }

    /// True when executing this expression applies no predicate at all.
    pub fn is_unfiltered(&self) -> bool {
        match &self.index {
            Some(binding) => !binding.has_active_clauses(),
            None => self.enabled_clauses().next().is_none(),
        }
    }
}
