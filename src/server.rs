//! JSON HTTP API for the data portal front end.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/search` | Free-text search (`query`, `size`, `start`) |
//! | `GET`  | `/filter-search` | Facet search (adds repeated `term` / `facet`) |
//! | `GET`  | `/get-facets/{term}` | Distinct values of a facet term |
//! | `GET`  | `/dataset/{id}` | One normalized dataset by index id |
//! | `GET`  | `/dataset_info/using_doi` | Datasets by DOI (`doi`) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no dataset with id 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `index_error` (502),
//! `upstream_contract` (502).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the portal front end is
//! served from a different origin.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use sparc_search_core::index::SearchIndex;
use sparc_search_core::normalize::{FacetEntry, SearchResults};
use sparc_search_core::query::FacetSelection;
use sparc_search_core::NormalizeError;

use crate::config::Config;
use crate::scicrunch::SciCrunchIndex;
use crate::search::SearchContext;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    context: Arc<SearchContext>,
    index: Arc<dyn SearchIndex>,
}

impl AppState {
    pub fn new(context: SearchContext, index: Arc<dyn SearchIndex>) -> Self {
        Self {
            context: Arc::new(context),
            index,
        }
    }
}

/// Starts the HTTP server against the configured index.
///
/// Binds to `bind` (or `[server].bind`) and runs until the process is
/// terminated.
pub async fn run_server(config: &Config, bind: Option<&str>) -> anyhow::Result<()> {
    let bind_addr = bind.unwrap_or(&config.server.bind).to_string();
    let index = SciCrunchIndex::new(&config.index)?;
    let state = AppState::new(SearchContext::from_config(config), Arc::new(index));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, endpoint = %config.index.endpoint, "server listening");
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// All routes, with CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", get(handle_search))
        .route("/filter-search", get(handle_filter_search))
        .route("/get-facets/{term}", get(handle_get_facets))
        .route("/dataset/{id}", get(handle_dataset))
        .route("/dataset_info/using_doi", get(handle_dataset_by_doi))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// Failures talking to, or interpreting, the index are the index's fault:
/// a malformed document is `upstream_contract`, anything else `index_error`.
fn upstream_error(err: anyhow::Error) -> AppError {
    let code = if err.downcast_ref::<NormalizeError>().is_some() {
        "upstream_contract"
    } else {
        "index_error"
    };
    tracing::warn!(code, error = %format!("{:#}", err), "index request failed");
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: code.to_string(),
        message: format!("{:#}", err),
    }
}

// ============ Query parameters ============

/// Reads `query`, `size`, `start` and (when `with_facets`) the repeated
/// `term` / `facet` pairs. Parameters are kept as a list because serde
/// maps cannot hold repeated keys.
fn parse_selection(params: &[(String, String)], with_facets: bool) -> Result<FacetSelection, AppError> {
    let mut selection = FacetSelection::default();
    for (key, value) in params {
        match key.as_str() {
            "query" => selection.query = value.clone(),
            "size" => selection.size = Some(parse_number("size", value)?),
            "start" => selection.start = Some(parse_number("start", value)?),
            "term" if with_facets => selection.terms.push(Some(value.clone())),
            "facet" if with_facets => selection.facets.push(Some(value.clone())),
            _ => {}
        }
    }
    Ok(selection)
}

fn parse_number(name: &str, value: &str) -> Result<u64, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| bad_request(format!("{} must be a non-negative integer, got '{}'", name, value)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /search, /filter-search ============

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<SearchResults>, AppError> {
    let selection = parse_selection(&params, false)?;
    run_selection(&state, &selection).await
}

async fn handle_filter_search(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<SearchResults>, AppError> {
    let selection = parse_selection(&params, true)?;
    run_selection(&state, &selection).await
}

async fn run_selection(state: &AppState, selection: &FacetSelection) -> Result<Json<SearchResults>, AppError> {
    let results = state
        .context
        .searcher(state.index.as_ref())
        .search(selection)
        .await
        .map_err(upstream_error)?;
    Ok(Json(results))
}

// ============ GET /get-facets/{term} ============

async fn handle_get_facets(
    State(state): State<AppState>,
    Path(term): Path<String>,
) -> Result<Json<Vec<FacetEntry>>, AppError> {
    if state.context.facets.fields(&term).is_none() {
        return Err(not_found(format!("unknown facet term: {}", term)));
    }
    let entries = state
        .context
        .searcher(state.index.as_ref())
        .facets(&term)
        .await
        .map_err(upstream_error)?;
    Ok(Json(entries))
}

// ============ GET /dataset/{id} ============

async fn handle_dataset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = state
        .context
        .searcher(state.index.as_ref())
        .dataset(&id)
        .await
        .map_err(upstream_error)?
        .ok_or_else(|| not_found(format!("no dataset with id {}", id)))?;
    Ok(Json(result.to_value()))
}

// ============ GET /dataset_info/using_doi ============

async fn handle_dataset_by_doi(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<SearchResults>, AppError> {
    let doi = params
        .iter()
        .find(|(key, _)| key == "doi")
        .map(|(_, value)| value.trim())
        .filter(|doi| !doi.is_empty())
        .ok_or_else(|| bad_request("doi must not be empty"))?;
    let results = state
        .context
        .searcher(state.index.as_ref())
        .by_doi(doi)
        .await
        .map_err(upstream_error)?;
    Ok(Json(results))
}
