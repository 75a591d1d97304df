use std::sync::Arc;

use kb_core::EmbeddingConfig;
use kb_embedding::EmbeddingClient;
use kb_retrieval::Retriever;
use kb_store::Store;
use rmcp::{model::CallToolRequestParams, transport::StreamableHttpClientTransport, ServiceExt};
use serde_json::json;
use tempfile::TempDir;

use crate::router::build_mcp_only_router;

fn harness() -> (Arc<Store>, Arc<Retriever>, TempDir) {
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
    (store, retriever, dir)
}

#[tokio::test]
async fn mcp_tools_list_and_create_file_flow() {
    let (store, retriever, dir) = harness();
    let app = build_mcp_only_router(store, retriever, dir.path().to_path_buf());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("failed to bind test listener");
    let addr = listener.local_addr().expect("listener should have an address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).with_graceful_shutdown(async { let _ = shutdown_rx.await; }).await;
    });

    let transport = StreamableHttpClientTransport::from_uri(format!("http://{addr}/mcp"));
    let client = ().serve(transport).await.expect("failed to connect to MCP server");

    let tools = client.list_all_tools().await.expect("failed to list tools");
    assert!(tools.iter().any(|tool| tool.name == "resolve-keywords"));
    assert!(tools.iter().any(|tool| tool.name == "create_file"));
    assert!(tools.iter().any(|tool| tool.name == "check_task_status"));

    let created = client
        .call_tool(CallToolRequestParams {
            meta: None,
            name: "create_file".into(),
            arguments: json!({ "name": "From Mcp" }).as_object().cloned(),
            task: None,
        })
        .await
        .expect("create_file call should succeed");
    assert!(!created.is_error.unwrap_or(false));

    let _ = client.cancel().await;
    let _ = shutdown_tx.send(());
    let _ = server_handle.await;
}
