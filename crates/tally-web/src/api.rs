//! Router and request handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::{header::HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tally_core::{validate_name, validate_request, StorageMode};
use tally_store::{Storage, StorageError};

use crate::html;
use crate::metrics::ServiceMetrics;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub metrics: Arc<ServiceMetrics>,
    pub mode: StorageMode,
    pub version: &'static str,
}

impl AppState {
    pub fn new(store: Arc<dyn Storage>, mode: StorageMode, version: &'static str) -> Self {
        Self {
            store,
            metrics: Arc::new(ServiceMetrics::new()),
            mode,
            version,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/start", post(start_build))
        .route("/finish", post(finish_build))
        .route("/health", get(health))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(metrics))
        .route("/api/projects", get(api_projects))
        .route("/api/projects/{name}", get(api_project_builds))
        .route("/", get(dashboard))
        .route("/project/{name}", get(project_page))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            count_and_harden,
        ))
        .with_state(state)
}

/// Counts every request and stamps security headers on every response.
async fn count_and_harden(State(state): State<AppState>, req: Request, next: Next) -> Response {
    ServiceMetrics::incr(&state.metrics.requests_total);
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response
}

#[derive(Debug, Deserialize)]
struct BuildParams {
    #[serde(default)]
    name: String,
    #[serde(default)]
    build_id: String,
}

impl BuildParams {
    fn trimmed(&self) -> (&str, &str) {
        (self.name.trim(), self.build_id.trim())
    }
}

#[derive(Debug, Serialize)]
struct StartResponse {
    next_id: i64,
}

async fn start_build(
    State(state): State<AppState>,
    Query(params): Query<BuildParams>,
) -> Response {
    let (name, build_id) = params.trimmed();
    if let Err(e) = validate_request(name, build_id) {
        tracing::warn!(%e, "rejected start request");
        ServiceMetrics::incr(&state.metrics.errors_total);
        return (StatusCode::BAD_REQUEST, "Invalid input parameters").into_response();
    }

    match state.store.start_build(name, build_id).await {
        Ok(next_id) => {
            ServiceMetrics::incr(&state.metrics.builds_started);
            Json(StartResponse { next_id }).into_response()
        }
        Err(e) => storage_failure(&state, "start_build", e),
    }
}

async fn finish_build(
    State(state): State<AppState>,
    Query(params): Query<BuildParams>,
) -> Response {
    let (name, build_id) = params.trimmed();
    if let Err(e) = validate_request(name, build_id) {
        tracing::warn!(%e, "rejected finish request");
        ServiceMetrics::incr(&state.metrics.errors_total);
        return (StatusCode::BAD_REQUEST, "Invalid input parameters").into_response();
    }

    match state.store.finish_build(name, build_id).await {
        Ok(()) => {
            ServiceMetrics::incr(&state.metrics.builds_finished);
            StatusCode::CREATED.into_response()
        }
        Err(e) => storage_failure(&state, "finish_build", e),
    }
}

async fn health(State(state): State<AppState>) -> Response {
    ServiceMetrics::incr(&state.metrics.health_checks);
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            tracing::error!(%e, "storage health check failed");
            ServiceMetrics::incr(&state.metrics.errors_total);
            (StatusCode::SERVICE_UNAVAILABLE, "Storage health check failed").into_response()
        }
    }
}

/// Liveness: the process is up, nothing else.
async fn liveness() -> &'static str {
    "OK"
}

async fn readiness(State(state): State<AppState>) -> Response {
    ServiceMetrics::incr(&state.metrics.health_checks);
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            tracing::error!(%e, "storage not ready");
            ServiceMetrics::incr(&state.metrics.errors_total);
            (StatusCode::SERVICE_UNAVAILABLE, "Storage not ready").into_response()
        }
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics.render(state.version, state.mode);
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

async fn api_projects(State(state): State<AppState>) -> Response {
    match state.store.list_projects().await {
        Ok(projects) => Json(projects).into_response(),
        Err(e) => storage_failure(&state, "list_projects", e),
    }
}

async fn api_project_builds(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    if let Some(rejection) = reject_invalid_name(&state, &name) {
        return rejection;
    }
    match state.store.project_builds(&name).await {
        Ok(builds) => Json(builds).into_response(),
        Err(e) => storage_failure(&state, "project_builds", e),
    }
}

async fn dashboard(State(state): State<AppState>) -> Response {
    match state.store.list_projects().await {
        Ok(projects) => {
            Html(html::dashboard(&projects, state.mode, state.version)).into_response()
        }
        Err(e) => storage_failure(&state, "list_projects", e),
    }
}

async fn project_page(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    if let Some(rejection) = reject_invalid_name(&state, &name) {
        return rejection;
    }
    match state.store.project_builds(&name).await {
        Ok(builds) => Html(html::build_history(&name, &builds, state.version)).into_response(),
        Err(e) => storage_failure(&state, "project_builds", e),
    }
}

/// Path-supplied project names obey the same charset rules as query
/// parameters: nothing unvalidated reaches storage or a rendered page.
fn reject_invalid_name(state: &AppState, name: &str) -> Option<Response> {
    match validate_name(name) {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!(%e, "rejected project lookup");
            ServiceMetrics::incr(&state.metrics.errors_total);
            Some((StatusCode::BAD_REQUEST, "Invalid input parameters").into_response())
        }
    }
}

/// Storage errors never leak internals to the caller: log the detail,
/// answer with a generic 500.
fn storage_failure(state: &AppState, op: &'static str, err: StorageError) -> Response {
    tracing::error!(op, error = %err, "storage operation failed");
    ServiceMetrics::incr(&state.metrics.errors_total);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}
