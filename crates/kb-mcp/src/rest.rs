use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use kb_core::KbError;
use kb_retrieval::Retriever;
use kb_store::Store;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::service::Service;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub retriever: Arc<Retriever>,
    pub working_dir: PathBuf,
}

impl AppState {
    fn service(&self) -> Service<'_> {
        Service::new(&self.store, self.working_dir.clone())
    }
}

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
}

impl Envelope {
    fn ok(message: &str, data: impl Serialize) -> Self {
        Self { success: true, message: message.to_string(), data: Some(serde_json::json!(data)) }
    }
}

type ApiResult = Result<Json<Envelope>, (StatusCode, Json<Envelope>)>;

fn kb_error_to_http(error: KbError) -> (StatusCode, Json<Envelope>) {
    let status = match error {
        KbError::NotFound(_) => StatusCode::NOT_FOUND,
        KbError::Conflict(_) => StatusCode::CONFLICT,
        KbError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        KbError::Auth => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(Envelope { success: false, message: error.to_string(), data: None }))
}

pub async fn healthz() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct ResolveKeywordsRequest {
    pub query: String,
    #[serde(default)]
    pub filenames: Vec<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

pub async fn resolve_keywords(State(state): State<AppState>, Json(req): Json<ResolveKeywordsRequest>) -> ApiResult {
    let output = state
        .retriever
        .search(&req.query, &req.filenames, req.max_results)
        .await
        .map_err(kb_error_to_http)?;
    Ok(Json(Envelope::ok("resolved", output)))
}

#[derive(Debug, Deserialize)]
pub struct GetDocsRequest {
    pub doc_titles: Vec<String>,
}

pub async fn get_docs(State(state): State<AppState>, Json(req): Json<GetDocsRequest>) -> ApiResult {
    let (documents, not_found) = state.service().get_docs(&req.doc_titles).map_err(kb_error_to_http)?;
    Ok(Json(Envelope::ok("queried", serde_json::json!({ "documents": documents, "not_found": not_found }))))
}

#[derive(Debug, Deserialize)]
pub struct CreateFileRequest {
    pub name: String,
}

pub async fn create_file(State(state): State<AppState>, Json(req): Json<CreateFileRequest>) -> Result<(StatusCode, Json<Envelope>), (StatusCode, Json<Envelope>)> {
    let created = state.service().create_file(&req.name).map_err(kb_error_to_http)?;
    Ok((StatusCode::CREATED, Json(Envelope::ok("file created", created))))
}

pub async fn remove_file(State(state): State<AppState>, Path(file_id): Path<i64>) -> ApiResult {
    let removed = state.service().remove_file(file_id).map_err(kb_error_to_http)?;
    Ok(Json(Envelope::ok("file removed", removed)))
}

#[derive(Debug, Deserialize)]
pub struct AddChunkRequest {
    pub title: String,
    pub text: String,
}

pub async fn add_chunk(State(state): State<AppState>, Path(file_id): Path<i64>, Json(req): Json<AddChunkRequest>) -> ApiResult {
    let task_id = state.service().add_chunk(file_id, &req.title, &req.text).map_err(kb_error_to_http)?;
    Ok(Json(Envelope::ok("chunk queued", serde_json::json!({ "task_id": task_id }))))
}

#[derive(Debug, Deserialize)]
pub struct ModifyChunkRequest {
    pub new_text: String,
}

pub async fn modify_chunk_content(
    State(state): State<AppState>,
    Path(chunk_id): Path<i64>,
    Json(req): Json<ModifyChunkRequest>,
) -> ApiResult {
    let task_id = state.service().modify_chunk_content(chunk_id, &req.new_text).map_err(kb_error_to_http)?;
    Ok(Json(Envelope::ok("chunk update queued", serde_json::json!({ "task_id": task_id }))))
}

pub async fn remove_chunk(State(state): State<AppState>, Path(chunk_id): Path<i64>) -> ApiResult {
    let removed = state.service().remove_chunk(chunk_id).map_err(kb_error_to_http)?;
    Ok(Json(Envelope::ok("chunk removed", removed)))
}

#[derive(Debug, Deserialize)]
pub struct BatchRemoveChunksRequest {
    pub ids: Vec<i64>,
}

pub async fn batch_remove_chunks(State(state): State<AppState>, Json(req): Json<BatchRemoveChunksRequest>) -> ApiResult {
    let results = state.service().batch_remove_chunks(&req.ids);
    let removed: Vec<Value> = results.iter().filter_map(|r| r.as_ref().ok().map(|r| serde_json::json!(r))).collect();
    let failed = results.iter().filter(|r| r.is_err()).count();
    Ok(Json(Envelope::ok(
        &format!("removed {} of {} chunks", removed.len(), req.ids.len()),
        serde_json::json!({ "removed": removed, "failed": failed }),
    )))
}

pub async fn check_task_status(State(state): State<AppState>, Path(task_id): Path<i64>) -> ApiResult {
    let status = state.service().check_task_status(task_id).map_err(kb_error_to_http)?;
    Ok(Json(Envelope::ok("queried", status)))
}

#[derive(Debug, Deserialize)]
pub struct QueryFilesParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status: Option<String>,
}

pub async fn query_files(State(state): State<AppState>, Query(params): Query<QueryFilesParams>) -> ApiResult {
    let page = state
        .service()
        .query_files(params.limit.unwrap_or(20), params.offset.unwrap_or(0), params.status.as_deref())
        .map_err(kb_error_to_http)?;
    Ok(Json(Envelope::ok("queried", page)))
}

pub async fn query_file_info(State(state): State<AppState>, Path(file_id): Path<i64>) -> ApiResult {
    let info = state.service().query_file_info(file_id).map_err(kb_error_to_http)?;
    Ok(Json(Envelope::ok("queried", info)))
}

pub async fn query_chunk_info(State(state): State<AppState>, Path(chunk_id): Path<i64>) -> ApiResult {
    let chunk = state.service().query_chunk_info(chunk_id).map_err(kb_error_to_http)?;
    Ok(Json(Envelope::ok("queried", chunk)))
}

pub async fn query_storage_stats(State(state): State<AppState>) -> ApiResult {
    let stats = state.service().query_storage_stats().map_err(kb_error_to_http)?;
    Ok(Json(Envelope::ok("queried", stats)))
}
