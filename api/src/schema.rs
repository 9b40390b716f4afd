use filter_common::{selectable_indexes, with_system_fields, FieldDescriptor, FilterError, TableIndex};
use std::sync::Arc;

use crate::store_client::TableStore;

/// Live schema lookups. Nothing is cached: every compile sees the current schema.
#[derive(Clone)]
pub struct SchemaIntrospector {
    store: Arc<dyn TableStore>,
}

impl SchemaIntrospector {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    pub async fn list_tables(&self) -> Result<Vec<String>, FilterError> {
        self.store.list_tables().await
    }

    /// Declared fields plus `_id` and `_creationTime`.
    pub async fn get_fields(&self, table: &str) -> Result<Vec<FieldDescriptor>, FilterError> {
        match self.store.get_fields(table).await {
            Ok(fields) => Ok(with_system_fields(fields)),
            Err(FilterError::SchemaUnavailable { table, available }) if available.is_empty() => {
                // Some schema services omit the table list on 404
                let available = self.store.list_tables().await.unwrap_or_default();
                Err(FilterError::SchemaUnavailable { table, available })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_indexes(&self, table: &str) -> Result<Vec<TableIndex>, FilterError> {
        self.store.list_indexes(table).await
    }

    /// Indexes usable as filter targets, sentinels first.
    pub async fn selectable_indexes(&self, table: &str) -> Result<Vec<TableIndex>, FilterError> {
        Ok(selectable_indexes(&self.list_indexes(table).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{todo_fields, todo_store};
    use async_trait::async_trait;
    use filter_common::{ScanPage, ScanRequest, BY_CREATION_TIME, BY_ID};

    #[tokio::test]
    async fn test_get_fields_appends_system_fields() {
        let schema = SchemaIntrospector::new(Arc::new(todo_store()));
        let fields = schema.get_fields("todos").await.unwrap();

        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["title", "done", "category", "priority", "_id", "_creationTime"]
        );
        assert_eq!(fields.len(), todo_fields().len() + 2);
    }

    #[tokio::test]
    async fn test_unknown_table_lists_available() {
        let schema = SchemaIntrospector::new(Arc::new(todo_store()));
        let err = schema.get_fields("todo").await.unwrap_err();
        assert_eq!(
            err,
            FilterError::SchemaUnavailable {
                table: "todo".into(),
                available: vec!["todos".into(), "users".into()],
            }
        );
    }

    struct TerseStore;

    #[async_trait]
    impl TableStore for TerseStore {
        async fn list_tables(&self) -> Result<Vec<String>, FilterError> {
            Ok(vec!["todos".into()])
        }
        async fn get_fields(&self, table: &str) -> Result<Vec<FieldDescriptor>, FilterError> {
            Err(FilterError::SchemaUnavailable {
                table: table.into(),
                available: vec![],
            })
        }
        async fn list_indexes(&self, _table: &str) -> Result<Vec<TableIndex>, FilterError> {
            Ok(vec![])
        }
        async fn scan(&self, _request: &ScanRequest) -> Result<ScanPage, FilterError> {
            Ok(ScanPage::default())
        }
    }

    #[tokio::test]
    async fn test_missing_table_list_is_filled_in() {
        let schema = SchemaIntrospector::new(Arc::new(TerseStore));
        match schema.get_fields("todo").await.unwrap_err() {
            FilterError::SchemaUnavailable { available, .. } => {
                assert_eq!(available, vec!["todos"])
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_selectable_indexes_hide_vector() {
        let schema = SchemaIntrospector::new(Arc::new(todo_store()));
        let names: Vec<String> = schema
            .selectable_indexes("todos")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec![BY_CREATION_TIME, BY_ID, "by_category", "search_title"]);
    }
}
