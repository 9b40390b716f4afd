#[derive(Debug, Clone, PartialEq)]
pub enum FilterError {
    /// Table does not exist in the active scope. Carries the tables that do.
    SchemaUnavailable {
        table: String,
        available: Vec<String>,
    },
    /// Translation was requested without any field descriptors.
    SchemaRequired,
    TranslationTimeout {
        budget_ms: u64,
    },
    TranslationError(String),
    UnknownFieldReference {
        field: String,
    },
    InvalidIndex {
        name: String,
    },
    BackingStoreError {
        message: String,
        retryable: bool,
    },
}

impl FilterError {
    /// Errors the compiler recovers from by falling back to heuristics.
    pub fn is_translation_failure(&self) -> bool {
        matches!(
            self,
            FilterError::TranslationTimeout { .. } | FilterError::TranslationError(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            FilterError::BackingStoreError { retryable, .. } => *retryable,
            FilterError::TranslationTimeout { .. } => true,
            _ => false,
        }
    }

    pub fn backing_store(message: impl Into<String>) -> Self {
        FilterError::BackingStoreError {
            message: message.into(),
            retryable: true,
        }
    }
}

impl From<FilterError> for String {
    fn from(error: FilterError) -> Self {
        error.to_string()
    }
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::SchemaUnavailable { table, available } => {
                if available.is_empty() {
                    write!(f, "Table '{}' not found, no tables exist", table)
                } else {
                    write!(
                        f,
                        "Table '{}' not found, available tables: {}",
                        table,
                        available.join(", ")
                    )
                }
            }
            FilterError::SchemaRequired => {
                write!(f, "Schema required: cannot translate without table fields")
            }
            FilterError::TranslationTimeout { budget_ms } => {
                write!(f, "Translation timed out after {} ms", budget_ms)
            }
            FilterError::TranslationError(err) => write!(f, "Translation failed: {}", err),
            FilterError::UnknownFieldReference { field } => {
                write!(f, "Unknown field reference: {}", field)
            }
            FilterError::InvalidIndex { name } => write!(f, "Invalid index: {}", name),
            FilterError::BackingStoreError { message, retryable } => {
                if *retryable {
                    write!(f, "Backing store error (retryable): {}", message)
                } else {
                    write!(f, "Backing store error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for FilterError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_unavailable_lists_tables() {
        let err = FilterError::SchemaUnavailable {
            table: "todo".to_string(),
            available: vec!["todos".to_string(), "users".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Table 'todo' not found, available tables: todos, users"
        );
    }

    #[test]
    fn test_translation_failures_are_recoverable() {
        assert!(FilterError::TranslationTimeout { budget_ms: 100 }.is_translation_failure());
        assert!(FilterError::TranslationError("bad json".into()).is_translation_failure());
        assert!(!FilterError::SchemaRequired.is_translation_failure());
    }

    #[test]
    fn test_backing_store_error_is_retryable() {
        let err = FilterError::backing_store("connection reset");
        assert!(err.is_retryable());
        let as_string: String = err.into();
        assert!(as_string.contains("connection reset"));
    }
}
