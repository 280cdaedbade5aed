//! HTTP surface of the search service.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::search::{SearchError, SearchRequest, SearchResponse, SearchService};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    service: Arc<SearchService>,
}

impl AppState {
    /// Wraps a constructed search service.
    pub fn new(service: SearchService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// JSON error payload.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    message: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// Builds the router: `POST /search`, `GET /healthz`, permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/search", post(search_handler))
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn search_handler(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let service = Arc::clone(&state.service);
    let response = tokio::task::spawn_blocking(move || service.search(&request))
        .await
        .map_err(|err| internal_error(format!("search task join error: {err}")))?;
    match response {
        Ok(body) => Ok(Json(body)),
        Err(err) if err.is_client_error() => Err(bad_request(err.to_string())),
        Err(err) => {
            tracing::error!(error = %format_error(&err), "search failed");
            Err(internal_error(format_error(&err)))
        }
    }
}

fn format_error(err: &SearchError) -> String {
    match err {
        SearchError::Upstream(inner) => format!("{inner:#}"),
        other => other.to_string(),
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

fn internal_error(message: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}
