//! HTTP API Request Handlers
//!
//! Handlers that map HTTP requests onto the query service and the index
//! writer.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error};

use crate::search::{Pagination, QueryService, SearchError, SearchFilters, SearchHit, SearchResult};
use crate::sync::{ChangePublisher, IndexWriter};

use super::types::*;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
    pub writer: Arc<dyn IndexWriter>,
    /// `None` when indexing is disabled
    pub publisher: Option<ChangePublisher>,
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Fuzzy text search endpoint
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let start = Instant::now();
    let text = params.q.unwrap_or_default();
    debug!(
        "HTTP search request: q={}, page={}, size={}",
        text, params.page, params.size
    );

    let page = state.query.paginate(params.page, params.size);
    search_response(state.query.search_by_text(&text, page), page, start)
}

/// Filtered search endpoint
pub async fn search_advanced(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
    payload: Result<Json<SearchFilters>, JsonRejection>,
) -> Response {
    let start = Instant::now();
    let Json(filters) = match payload {
        Ok(filters) => filters,
        Err(rejection) => {
            debug!("Rejected advanced search body: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::validation(rejection.body_text())),
            )
                .into_response();
        }
    };
    debug!(
        "HTTP advanced search request: {:?}, page={}, size={}",
        filters, params.page, params.size
    );

    let page = state.query.paginate(params.page, params.size);
    search_response(state.query.search_advanced(&filters, page), page, start)
}

/// Status endpoint
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        indexing_enabled: state.writer.is_enabled(),
        documents_indexed: state.query.count(),
        pending_events: state.publisher.as_ref().map_or(0, ChangePublisher::pending),
    })
}

/// Bulk reindex endpoint
pub async fn reindex(State(state): State<AppState>) -> Response {
    if !state.writer.is_enabled() {
        return (StatusCode::CONFLICT, Json(ErrorResponse::indexing_disabled())).into_response();
    }

    let start = Instant::now();
    match state.writer.reindex_all().await {
        Ok(report) => (
            StatusCode::OK,
            Json(ReindexResponse {
                applied: report.applied,
                failed: report.failed,
                purged: report.purged,
                duration_ms: start.elapsed().as_millis() as u64,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Reindex failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal_error(e.to_string())),
            )
                .into_response()
        }
    }
}

fn search_response(
    result: SearchResult<Vec<SearchHit>>,
    page: Pagination,
    start: Instant,
) -> Response {
    match result {
        Ok(results) => (
            StatusCode::OK,
            Json(SearchResponse {
                results,
                page: page.page,
                size: page.size,
                query_time_ms: start.elapsed().as_millis() as u64,
            }),
        )
            .into_response(),
        Err(SearchError::Validation(message)) => {
            (StatusCode::BAD_REQUEST, Json(ErrorResponse::validation(message))).into_response()
        }
        Err(SearchError::Other(e)) => {
            error!("Search failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal_error(e.to_string())),
            )
                .into_response()
        }
    }
}
