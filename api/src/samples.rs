use filter_common::{PaginationOpts, Row, ScanRequest};
use std::sync::Arc;

use crate::store_client::TableStore;

pub const DEFAULT_SAMPLE_LIMIT: usize = 5;

/// Grounds translation in real values. Best effort: a failed fetch only
/// weakens the prompt, so it never fails the compile.
#[derive(Clone)]
pub struct SampleFetcher {
    store: Arc<dyn TableStore>,
    limit: usize,
}

impl SampleFetcher {
    pub fn new(store: Arc<dyn TableStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    pub async fn get_samples(&self, table: &str) -> Vec<Row> {
        if self.limit == 0 {
            return Vec::new();
        }
        let request = ScanRequest::unfiltered(table, PaginationOpts::first(self.limit));
        match self.store.scan(&request).await {
            Ok(page) => {
                let mut rows = page.page;
                rows.truncate(self.limit);
                rows
            }
            Err(e) => {
                tracing::warn!("Failed to fetch sample rows for {}: {}", table, e);
                Vec::new()
            }
        }
    }
}
