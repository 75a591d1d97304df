use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use kb_core::EmbeddingConfig;
use kb_embedding::EmbeddingClient;
use kb_retrieval::Retriever;
use kb_store::Store;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::auth::AuthState;
use crate::router::build_router;

fn app(auth: AuthState) -> (Router, TempDir) {
    let store = Arc::new(Store::open_in_memory(4).expect("store should open"));
    let embedding = EmbeddingClient::new(EmbeddingConfig {
        base_url: "http://127.0.0.1:1".into(),
        api_key: "k".into(),
        model: "m".into(),
        vector_dim: 4,
        max_tokens: 8192,
        rpm: 6000,
    });
    let retriever = Arc::new(Retriever::new(Store::open_in_memory(4).expect("store should open"), embedding));
    let dir = TempDir::new().expect("tempdir");
    (build_router(store, retriever, dir.path().to_path_buf(), auth), dir)
}

#[tokio::test]
async fn healthz_is_reachable_without_a_bearer_token() {
    let (app, _dir) = app(AuthState::new(true, Some("secret".into())));

    let response = app
        .oneshot(Request::builder().uri("/healthz").method("GET").body(Body::empty()).unwrap())
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn given_auth_enabled_when_token_missing_then_storage_stats_is_rejected() {
    let (app, _dir) = app(AuthState::new(true, Some("secret".into())));

    let response = app
        .oneshot(Request::builder().uri("/api/v1/storage-stats").method("GET").body(Body::empty()).unwrap())
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn given_auth_enabled_when_token_correct_then_create_file_succeeds() {
    let (app, _dir) = app(AuthState::new(true, Some("secret".into())));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/files")
                .method("POST")
                .header(header::AUTHORIZATION, "Bearer secret")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "name": "Rest File" }).to_string()))
                .unwrap(),
        )
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("failed to read body");
    let payload: Value = serde_json::from_slice(&body).expect("response should be json");
    assert_eq!(payload["success"], json!(true));
    assert_eq!(payload["data"]["filename"], json!("Rest File.md"));
}
