use std::path::PathBuf;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use kb_retrieval::Retriever;
use kb_store::Store;

use crate::auth::{require_bearer_token, AuthState};
use crate::mcp_server::build_mcp_service;
use crate::rest::{self, AppState};

/// Co-mounts the MCP transport at `/mcp` and the REST convenience
/// surface at `/api/v1/*` on one axum router (§4.8), gated by a shared
/// bearer-token layer; `/healthz` stays open so uptime probes don't
/// need credentials.
pub fn build_router(store: Arc<Store>, retriever: Arc<Retriever>, working_dir: PathBuf, auth: AuthState) -> Router {
    let app_state = AppState { store: store.clone(), retriever: retriever.clone(), working_dir: working_dir.clone() };
    let mcp_service = build_mcp_service(store, retriever, working_dir);

    let protected = Router::new()
        .nest_service("/mcp", mcp_service)
        .route("/api/v1/resolve-keywords", post(rest::resolve_keywords))
        .route("/api/v1/get-docs", post(rest::get_docs))
        .route("/api/v1/files", get(rest::query_files).post(rest::create_file))
        .route("/api/v1/files/{file_id}", get(rest::query_file_info).delete(rest::remove_file))
        .route("/api/v1/files/{file_id}/chunks", post(rest::add_chunk))
        .route("/api/v1/chunks/{chunk_id}", get(rest::query_chunk_info).delete(rest::remove_chunk))
        .route("/api/v1/chunks/{chunk_id}/content", put(rest::modify_chunk_content))
        .route("/api/v1/chunks/batch-delete", delete(rest::batch_remove_chunks))
        .route("/api/v1/tasks/{task_id}", get(rest::check_task_status))
        .route("/api/v1/storage-stats", get(rest::query_storage_stats))
        .with_state(app_state)
        .layer(middleware::from_fn_with_state(Arc::new(auth), require_bearer_token));

    Router::new().route("/healthz", get(rest::healthz)).merge(protected)
}

#[cfg(test)]
pub fn build_mcp_only_router(store: Arc<Store>, retriever: Arc<Retriever>, working_dir: PathBuf) -> Router {
    let mcp_service = build_mcp_service(store, retriever, working_dir);
    Router::new().nest_service("/mcp", mcp_service)
}
