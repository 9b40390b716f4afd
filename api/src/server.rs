use filter_common::{FilterError, FilterExpression, PaginationOpts, SortConfig};
use poem::{
    handler,
    http::StatusCode,
    middleware::Cors,
    web::{Data, Json, Path},
    Endpoint, EndpointExt, Response, Route,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::compiler::{CompileStage, CompiledFilter, FilterCompiler, Intent, RequestToken, RequestTracker};
use crate::executor::ExecuteResult;

pub struct AppState {
    pub compiler: FilterCompiler,
    pub tracker: RequestTracker,
    pub page_size: usize,
    /// `provider/model`, or `None` when running heuristics only
    pub model: Option<String>,
}

// Common response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    success: bool,
    message: String,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub intent: Intent,
    /// Identifies the editor issuing the request; newer requests supersede older ones
    pub caller: Option<String>,
    #[serde(default)]
    pub execute: bool,
    pub num_items: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResponse {
    /// Last stage recorded in the compile trace
    pub stage: CompileStage,
    pub compiled: CompiledFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecuteResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<RequestToken>,
    /// A newer request from the same caller started meanwhile; discard this one
    pub stale: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub table: String,
    #[serde(default)]
    pub expression: FilterExpression,
    pub cursor: Option<String>,
    pub num_items: Option<usize>,
    pub sort: Option<SortConfig>,
}

fn status_for(error: &FilterError) -> StatusCode {
    match error {
        FilterError::SchemaUnavailable { .. } => StatusCode::NOT_FOUND,
        FilterError::InvalidIndex { .. }
        | FilterError::SchemaRequired
        | FilterError::UnknownFieldReference { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        FilterError::BackingStoreError { .. } => StatusCode::BAD_GATEWAY,
        FilterError::TranslationTimeout { .. } | FilterError::TranslationError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &ApiResponse<T>) -> Response {
    match serde_json::to_string(body) {
        Ok(json) => Response::builder()
            .status(status)
            .content_type("application/json")
            .body(json),
        Err(e) => {
            tracing::error!("Failed to serialize response: {}", e);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .finish()
        }
    }
}

fn respond<T: Serialize>(result: Result<T, FilterError>) -> Response {
    match result {
        Ok(data) => json_response(StatusCode::OK, &ApiResponse::success(data)),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                tracing::warn!("Request failed: {}", e);
            }
            json_response(status, &ApiResponse::<()>::error(e.to_string()))
        }
    }
}

#[handler]
async fn health(state: Data<&Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "Filter API is running".to_string(),
        model: state.model.clone(),
    })
}

#[handler]
async fn compile(state: Data<&Arc<AppState>>, Json(req): Json<CompileRequest>) -> Response {
    let token = req.caller.as_deref().map(|c| state.tracker.begin(c));
    let num_items = req.num_items.unwrap_or(state.page_size);

    let outcome = if req.execute {
        match state
            .compiler
            .compile_and_execute(&req.intent, PaginationOpts::first(num_items))
            .await
        {
            Ok((compiled, Ok(result))) => Ok((compiled, Some(result))),
            Ok((_, Err(e))) | Err(e) => Err(e),
        }
    } else {
        state
            .compiler
            .compile(&req.intent)
            .await
            .map(|compiled| (compiled, None))
    };

    respond(outcome.map(|(compiled, result)| {
        let stale = token
            .as_ref()
            .map(|t| !state.tracker.is_current(t))
            .unwrap_or(false);
        if stale {
            tracing::debug!("Compile for {} superseded", compiled.table);
        }
        CompileResponse {
            stage: compiled.stage(),
            compiled,
            result,
            token,
            stale,
        }
    }))
}

#[handler]
async fn execute(state: Data<&Arc<AppState>>, Json(req): Json<ExecuteRequest>) -> Response {
    let pagination = PaginationOpts {
        cursor: req.cursor,
        num_items: req.num_items.unwrap_or(state.page_size),
    };
    respond(
        state
            .compiler
            .executor()
            .execute(&req.table, &req.expression, pagination, req.sort.as_ref())
            .await,
    )
}

#[handler]
async fn list_tables(state: Data<&Arc<AppState>>) -> Response {
    respond(state.compiler.schema().list_tables().await)
}

#[handler]
async fn get_fields(state: Data<&Arc<AppState>>, Path(table): Path<String>) -> Response {
    respond(state.compiler.schema().get_fields(&table).await)
}

#[handler]
async fn get_indexes(state: Data<&Arc<AppState>>, Path(table): Path<String>) -> Response {
    respond(state.compiler.schema().selectable_indexes(&table).await)
}

pub fn routes(state: Arc<AppState>) -> impl Endpoint {
    Route::new()
        .at("/api/v1/health", poem::get(health))
        .at("/api/v1/compile", poem::post(compile))
        .at("/api/v1/execute", poem::post(execute))
        .at("/api/v1/tables", poem::get(list_tables))
        .at("/api/v1/tables/:table/fields", poem::get(get_fields))
        .at("/api/v1/tables/:table/indexes", poem::get(get_indexes))
        .data(state)
        .with(Cors::new())
}
