use std::path::PathBuf;
use std::sync::Arc;

use kb_core::KbError;
use kb_retrieval::Retriever;
use kb_store::Store;
use rmcp::schemars;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    schemars::JsonSchema,
    tool, tool_handler, tool_router,
    transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
    },
    ErrorData as McpError, Json, ServerHandler,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::service::Service;

/// Accepts a bare JSON array or a JSON-encoded string carrying one, to
/// tolerate heterogeneous MCP client serializers (§4.8).
fn deserialize_liberal_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    match raw {
        Value::Array(items) => Ok(items.into_iter().filter_map(|v| v.as_str().map(str::to_string)).collect()),
        Value::String(s) => match serde_json::from_str::<Vec<String>>(&s) {
            Ok(items) => Ok(items),
            Err(_) => Ok(vec![s]),
        },
        Value::Null => Ok(Vec::new()),
        other => Err(serde::de::Error::custom(format!("expected array or string, got {other}"))),
    }
}

fn deserialize_liberal_ids<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let ids = match raw {
        Value::Array(items) => items,
        Value::String(s) => serde_json::from_str::<Vec<Value>>(&s).map_err(serde::de::Error::custom)?,
        Value::Null => Vec::new(),
        other => return Err(serde::de::Error::custom(format!("expected array or string, got {other}"))),
    };
    ids.into_iter()
        .map(|v| v.as_i64().ok_or_else(|| serde::de::Error::custom("expected an integer id")))
        .collect()
}

#[derive(Clone)]
pub struct KbMcpServer {
    store: Arc<Store>,
    retriever: Arc<Retriever>,
    working_dir: PathBuf,
    tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for KbMcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KbMcpServer")
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}

impl KbMcpServer {
    pub fn new(store: Arc<Store>, retriever: Arc<Retriever>, working_dir: PathBuf) -> Self {
        Self { store, retriever, working_dir, tool_router: Self::tool_router() }
    }

    fn service(&self) -> Service<'_> {
        Service::new(&self.store, self.working_dir.clone())
    }
}

#[tool_router]
impl KbMcpServer {
    #[tool(
        name = "resolve-keywords",
        description = "Resolves a query to relevant document keywords (doc_title) via hybrid title/BM25/vector retrieval. Returns up to max_results candidates with confidence scores."
    )]
    async fn resolve_keywords(
        &self,
        Parameters(input): Parameters<ResolveKeywordsInput>,
    ) -> Result<Json<ResolveKeywordsOutput>, McpError> {
        let filenames = input.filenames.unwrap_or_default();
        let output = self
            .retriever
            .search(&input.query, &filenames, input.max_results)
            .await
            .map_err(kb_error_to_mcp)?;

        Ok(Json(ResolveKeywordsOutput {
            keywords: output.keywords,
            confidence_scores: output.confidence_scores,
            stats: json!(output.stats),
        }))
    }

    #[tool(
        name = "get-docs",
        description = "Retrieves full document content for up to 3 doc_titles returned by resolve-keywords."
    )]
    async fn get_docs(&self, Parameters(input): Parameters<GetDocsInput>) -> Result<Json<Value>, McpError> {
        let (documents, not_found) = self.service().get_docs(&input.doc_titles).map_err(kb_error_to_mcp)?;
        Ok(Json(json!({ "documents": documents, "not_found": not_found })))
    }

    #[tool(name = "create_file", description = "Creates a blank working Markdown file.")]
    async fn create_file(&self, Parameters(input): Parameters<CreateFileInput>) -> Result<Json<Envelope<Value>>, McpError> {
        let created = self.service().create_file(&input.name).map_err(kb_error_to_mcp)?;
        Ok(Json(Envelope::ok("file created", json!(created))))
    }

    #[tool(name = "remove_file", description = "Deletes a file, its chunks, and its working/original copies.")]
    async fn remove_file(&self, Parameters(input): Parameters<IdInput>) -> Result<Json<Envelope<Value>>, McpError> {
        let removed = self.service().remove_file(input.id).map_err(kb_error_to_mcp)?;
        Ok(Json(Envelope::ok("file removed", json!(removed))))
    }

    #[tool(
        name = "add_chunk",
        description = "Adds a chunk to an existing file; returns a task_id for the asynchronous embedding job."
    )]
    async fn add_chunk(&self, Parameters(input): Parameters<AddChunkInput>) -> Result<Json<Envelope<Value>>, McpError> {
        let task_id = self
            .service()
            .add_chunk(input.file_id, &input.title, &input.text)
            .map_err(kb_error_to_mcp)?;
        Ok(Json(Envelope::ok("chunk queued", json!({ "task_id": task_id }))))
    }

    #[tool(
        name = "modify_chunk_content",
        description = "Replaces a chunk's text; returns a task_id for the asynchronous re-embedding job."
    )]
    async fn modify_chunk_content(
        &self,
        Parameters(input): Parameters<ModifyChunkInput>,
    ) -> Result<Json<Envelope<Value>>, McpError> {
        let task_id = self
            .service()
            .modify_chunk_content(input.chunk_id, &input.new_text)
            .map_err(kb_error_to_mcp)?;
        Ok(Json(Envelope::ok("chunk update queued", json!({ "task_id": task_id }))))
    }

    #[tool(
        name = "remove_chunk",
        description = "Deletes a chunk; deleting a file's last chunk also deletes the file."
    )]
    async fn remove_chunk(&self, Parameters(input): Parameters<IdInput>) -> Result<Json<Envelope<Value>>, McpError> {
        let removed = self.service().remove_chunk(input.id).map_err(kb_error_to_mcp)?;
        Ok(Json(Envelope::ok("chunk removed", json!(removed))))
    }

    #[tool(name = "batch_remove_chunks", description = "Deletes multiple chunks in one call.")]
    async fn batch_remove_chunks(
        &self,
        Parameters(input): Parameters<BatchIdsInput>,
    ) -> Result<Json<Envelope<Value>>, McpError> {
        let results = self.service().batch_remove_chunks(&input.ids);
        let removed: Vec<Value> = results.iter().filter_map(|r| r.as_ref().ok().map(|r| json!(r))).collect();
        let failed = results.iter().filter(|r| r.is_err()).count();
        Ok(Json(Envelope::ok(
            &format!("removed {} of {} chunks", removed.len(), input.ids.len()),
            json!({ "removed": removed, "failed": failed }),
        )))
    }

    #[tool(name = "check_task_status", description = "Queries an async task's status and progress.")]
    async fn check_task_status(&self, Parameters(input): Parameters<IdInput>) -> Result<Json<Value>, McpError> {
        let status = self.service().check_task_status(input.id).map_err(kb_error_to_mcp)?;
        Ok(Json(json!(status)))
    }

    #[tool(name = "query_files", description = "Lists files with pagination and an optional status filter.")]
    async fn query_files(&self, Parameters(input): Parameters<QueryFilesInput>) -> Result<Json<Value>, McpError> {
        let page = self
            .service()
            .query_files(input.limit.unwrap_or(20), input.offset.unwrap_or(0), input.status.as_deref())
            .map_err(kb_error_to_mcp)?;
        Ok(Json(json!(page)))
    }

    #[tool(name = "query_file_info", description = "Returns a file's metadata plus its chunk count.")]
    async fn query_file_info(&self, Parameters(input): Parameters<IdInput>) -> Result<Json<Value>, McpError> {
        let info = self.service().query_file_info(input.id).map_err(kb_error_to_mcp)?;
        Ok(Json(json!(info)))
    }

    #[tool(name = "query_chunk_info", description = "Returns a single chunk's record.")]
    async fn query_chunk_info(&self, Parameters(input): Parameters<IdInput>) -> Result<Json<Value>, McpError> {
        let chunk = self.service().query_chunk_info(input.id).map_err(kb_error_to_mcp)?;
        Ok(Json(json!(chunk)))
    }

    #[tool(name = "query_storage_stats", description = "Returns aggregate file/chunk/size counters.")]
    async fn query_storage_stats(&self) -> Result<Json<Value>, McpError> {
        let stats = self.service().query_storage_stats().map_err(kb_error_to_mcp)?;
        Ok(Json(json!(stats)))
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for KbMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Personal knowledge base. Call resolve-keywords to find relevant documents, then get-docs to retrieve content.".into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub fn build_mcp_service(
    store: Arc<Store>,
    retriever: Arc<Retriever>,
    working_dir: PathBuf,
) -> StreamableHttpService<KbMcpServer, LocalSessionManager> {
    let session_manager = Arc::new(LocalSessionManager::default());
    StreamableHttpService::new(
        move || Ok(KbMcpServer::new(store.clone(), retriever.clone(), working_dir.clone())),
        session_manager,
        StreamableHttpServerConfig { stateful_mode: true, sse_keep_alive: None, sse_retry: None, ..Default::default() },
    )
}

fn kb_error_to_mcp(error: KbError) -> McpError {
    let message = error.to_string();
    let data = Some(json!({ "code": error.code() }));
    match error {
        KbError::NotFound(_) => McpError::resource_not_found(message, data),
        KbError::Validation(_) => McpError::invalid_params(message, data),
        KbError::Conflict(_) => McpError::invalid_request(message, data),
        KbError::Auth => McpError::invalid_request("Unauthorized", data),
        _ => McpError::internal_error(message, data),
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct Envelope<T: JsonSchema> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T: JsonSchema> Envelope<T> {
    pub fn ok(message: &str, data: T) -> Self {
        Self { success: true, message: message.to_string(), data }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ResolveKeywordsInput {
    pub query: String,
    #[serde(default)]
    pub filenames: Option<Vec<String>>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ResolveKeywordsOutput {
    pub keywords: Vec<String>,
    pub confidence_scores: std::collections::HashMap<String, f64>,
    pub stats: Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetDocsInput {
    #[serde(deserialize_with = "deserialize_liberal_list")]
    pub doc_titles: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateFileInput {
    pub name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IdInput {
    pub id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddChunkInput {
    pub file_id: i64,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ModifyChunkInput {
    pub chunk_id: i64,
    pub new_text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BatchIdsInput {
    #[serde(deserialize_with = "deserialize_liberal_ids")]
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryFilesInput {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}
