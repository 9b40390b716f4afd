use async_trait::async_trait;
use filter_common::{FieldDescriptor, FilterError, ScanPage, ScanRequest, TableIndex};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::config::StoreConfig;

/// Backing store capabilities the compiler and executor consume
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<String>, FilterError>;

    /// Field descriptors exactly as the schema service reports them
    async fn get_fields(&self, table: &str) -> Result<Vec<FieldDescriptor>, FilterError>;

    async fn list_indexes(&self, table: &str) -> Result<Vec<TableIndex>, FilterError>;

    async fn scan(&self, request: &ScanRequest) -> Result<ScanPage, FilterError>;

    /// Whether scan results already honor a requested sort
    fn sorts_server_side(&self) -> bool {
        false
    }
}

#[derive(Debug, Deserialize)]
struct TablesResponse {
    tables: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NotFoundResponse {
    #[serde(default)]
    tables: Vec<String>,
}

/// HTTP client for the table store's admin API.
pub struct HttpTableStore {
    client: Client,
    base_url: String,
    admin_key: Option<String>,
}

impl std::fmt::Debug for HttpTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTableStore")
            .field("base_url", &self.base_url)
            .field(
                "admin_key",
                &self.admin_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl HttpTableStore {
    pub fn new(base_url: &str, admin_key: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_key: admin_key.map(str::to_string),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.url, config.admin_key.as_deref())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.admin_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, FilterError> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| FilterError::backing_store(format!("Failed to {}: {}", what, e)))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        resp: Response,
        what: &str,
    ) -> Result<T, FilterError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, what, &body));
        }
        resp.json::<T>().await.map_err(|e| FilterError::BackingStoreError {
            message: format!("Failed to parse {} response: {}", what, e),
            retryable: false,
        })
    }
}

fn status_error(status: StatusCode, what: &str, body: &str) -> FilterError {
    FilterError::BackingStoreError {
        message: format!("Store API error {} during {}: {}", status, what, body),
        retryable: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
    }
}

#[async_trait]
impl TableStore for HttpTableStore {
    async fn list_tables(&self) -> Result<Vec<String>, FilterError> {
        let url = format!("{}/api/tables", self.base_url);
        let resp = self.send(self.client.get(&url), "list tables").await?;
        let body: TablesResponse = Self::read_json(resp, "list tables").await?;
        Ok(body.tables)
    }

    async fn get_fields(&self, table: &str) -> Result<Vec<FieldDescriptor>, FilterError> {
        let url = format!("{}/api/fields", self.base_url);
        let resp = self
            .send(
                self.client.get(&url).query(&[("table", table)]),
                "fetch fields",
            )
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            let body = resp.text().await.unwrap_or_default();
            let available = serde_json::from_str::<NotFoundResponse>(&body)
                .map(|r| r.tables)
                .unwrap_or_default();
            return Err(FilterError::SchemaUnavailable {
                table: table.to_string(),
                available,
            });
        }

        Self::read_json(resp, "fetch fields").await
    }

    async fn list_indexes(&self, table: &str) -> Result<Vec<TableIndex>, FilterError> {
        let url = format!("{}/api/indexes", self.base_url);
        let resp = self
            .send(
                self.client.get(&url).query(&[("table", table)]),
                "list indexes",
            )
            .await?;
        Self::read_json(resp, "list indexes").await
    }

    async fn scan(&self, request: &ScanRequest) -> Result<ScanPage, FilterError> {
        let url = format!("{}/api/scan", self.base_url);
        tracing::debug!(
            "Scanning {} (filtered: {}, cursor: {:?})",
            request.table,
            request.filters.is_some(),
            request.pagination_opts.cursor
        );
        let resp = self.send(self.client.post(&url).json(request), "scan").await?;
        Self::read_json(resp, "scan").await
    }
}
