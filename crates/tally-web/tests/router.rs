//! Router-level tests over the namespace backend with an in-memory
//! document store.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tally_core::{Build, ProjectSummary, StorageMode};
use tally_store::{MemoryDocumentStore, NamespaceStore, Storage, StorageError};
use tally_web::{router, AppState};
use tower::ServiceExt;

fn test_app() -> Router {
    let store = Arc::new(NamespaceStore::new(Arc::new(MemoryDocumentStore::new())));
    router(AppState::new(store, StorageMode::Namespace, "0.0.0-test"))
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

#[tokio::test]
async fn start_build_returns_next_id() {
    let app = test_app();
    let (status, body) = send(&app, "POST", "/start?name=alpha&build_id=run-1").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["next_id"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn invalid_parameters_are_rejected_before_storage() {
    let app = test_app();
    for uri in [
        "/start?name=&build_id=run-1",
        "/start?name=bad%20name&build_id=run-1",
        "/start?name=alpha&build_id=run%401",
        "/finish?name=alpha&build_id=",
        "/start",
    ] {
        let (status, _) = send(&app, "POST", uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn path_supplied_names_are_validated_and_never_reflected() {
    let app = test_app();
    // Percent-encoded "<script>alert(1)</script>".
    let hostile = "%3Cscript%3Ealert(1)%3C%2Fscript%3E";

    let (status, body) = send(&app, "GET", &format!("/project/{hostile}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let text = String::from_utf8(body).unwrap();
    assert!(!text.contains("<script>"));

    let (status, _) = send(&app, "GET", &format!("/api/projects/{hostile}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A well-formed but unknown name still gets past validation.
    let (status, _) = send(&app, "GET", "/api/projects/unknown-project").await;
    assert_ne!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn start_and_finish_require_post() {
    let app = test_app();
    let (status, _) = send(&app, "GET", "/start?name=alpha&build_id=run-1").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    let (status, _) = send(&app, "GET", "/finish?name=alpha&build_id=run-1").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn finish_flow_and_json_projection() {
    let app = test_app();
    send(&app, "POST", "/start?name=alpha&build_id=run-1").await;

    let (status, body) = send(&app, "GET", "/api/projects/alpha").await;
    assert_eq!(status, StatusCode::OK);
    let builds: Vec<Build> = serde_json::from_slice(&body).unwrap();
    assert_eq!(builds.len(), 1);
    assert!(builds[0].finished.is_none());
    assert!(builds[0].duration.is_none());

    let (status, _) = send(&app, "POST", "/finish?name=alpha&build_id=run-1").await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app, "GET", "/api/projects").await;
    let projects: Vec<ProjectSummary> = serde_json::from_slice(&body).unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].build_count, 1);
    assert!(projects[0].latest_build.finished.is_some());
}

#[tokio::test]
async fn storage_errors_map_to_generic_500() {
    let app = test_app();
    // Finishing a project that never started is a storage-level
    // NotFound, surfaced as a generic server error.
    let (status, _) = send(&app, "POST", "/finish?name=ghost&build_id=run-1").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_endpoints() {
    let app = test_app();
    for uri in ["/health", "/healthz", "/readyz"] {
        let (status, body) = send(&app, "GET", uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body, b"OK");
    }
}

#[tokio::test]
async fn degraded_storage_fails_health_but_not_liveness() {
    let store = Arc::new(BrokenStore);
    let app = router(AppState::new(store, StorageMode::Relational, "0.0.0-test"));

    let (status, _) = send(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (status, _) = send(&app, "GET", "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (status, _) = send(&app, "GET", "/healthz").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn metrics_exposition_reflects_traffic() {
    let app = test_app();
    send(&app, "POST", "/start?name=alpha&build_id=run-1").await;
    send(&app, "POST", "/finish?name=alpha&build_id=run-1").await;

    let (status, body) = send(&app, "GET", "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("tally_builds_started_total 1"));
    assert!(text.contains("tally_builds_finished_total 1"));
    assert!(text.contains("storage=\"namespace\""));
}

#[tokio::test]
async fn dashboard_renders_projects_with_security_headers() {
    let app = test_app();
    send(&app, "POST", "/start?name=alpha&build_id=run-1").await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("alpha"));
    assert!(html.contains("namespace mode"));
}

/// A storage whose medium is unreachable.
struct BrokenStore;

#[async_trait]
impl Storage for BrokenStore {
    async fn start_build(&self, name: &str, _build_id: &str) -> Result<i64, StorageError> {
        Err(broken("start_build", name))
    }

    async fn finish_build(&self, name: &str, _build_id: &str) -> Result<(), StorageError> {
        Err(broken("finish_build", name))
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Err(broken("health_check", ""))
    }

    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, StorageError> {
        Err(broken("list_projects", ""))
    }

    async fn project_builds(&self, name: &str) -> Result<Vec<Build>, StorageError> {
        Err(broken("project_builds", name))
    }
}

fn broken(op: &'static str, _name: &str) -> StorageError {
    StorageError::Unavailable {
        op,
        message: "medium unreachable".to_string(),
    }
}
