use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use kb_core::{EmbeddingConfig, Settings};
use kb_embedding::EmbeddingClient;
use kb_mcp::{build_router, AuthState};
use kb_retrieval::Retriever;
use kb_store::Store;
use kb_tasks::{PassthroughConverter, TaskProcessor};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const TRACING_TARGET_STARTUP: &str = "kb_server::startup";
const TRACING_TARGET_SHUTDOWN: &str = "kb_server::shutdown";

const TASK_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(error) = run().await {
        tracing::error!(target: TRACING_TARGET_SHUTDOWN, error = %error, "kb-server terminated with an error");
        process::exit(1);
    }

    tracing::info!(target: TRACING_TARGET_SHUTDOWN, "kb-server terminated successfully");
}

async fn run() -> anyhow::Result<()> {
    let config_path = std::env::var("KB_CONFIG_PATH").unwrap_or_else(|_| "./config.json".to_string());
    let settings = Settings::load(&config_path).with_context(|| format!("failed to load config at {config_path}"))?;

    tracing::info!(
        target: TRACING_TARGET_STARTUP,
        version = env!("CARGO_PKG_VERSION"),
        config_path = %config_path,
        mcp_port = settings.mcp.port,
        auth_enabled = settings.mcp.auth_enabled,
        "starting kb-server"
    );

    std::fs::create_dir_all(&settings.data_path).context("failed to create data_path")?;
    std::fs::create_dir_all(settings.originals_dir()).context("failed to create originals dir")?;
    std::fs::create_dir_all(settings.working_dir()).context("failed to create working dir")?;

    let store = Store::open(&settings.db_path(), settings.embedding.vector_dim, None)
        .context("failed to open embedded store")?;
    let embedding_config = EmbeddingConfig {
        base_url: settings.embedding.base_url.clone(),
        api_key: settings.embedding.api_key.clone(),
        model: settings.embedding.model.clone(),
        vector_dim: settings.embedding.vector_dim,
        max_tokens: settings.embedding.max_tokens,
        rpm: settings.embedding.rpm,
    };

    let processor = TaskProcessor::new(
        store.clone(),
        EmbeddingClient::new(embedding_config.clone()),
        Arc::new(PassthroughConverter),
        settings.embedding.max_tokens,
    );
    let stop = processor.stop_handle();
    let processor_handle = tokio::spawn(async move {
        if let Err(error) = processor.run(TASK_POLL_INTERVAL).await {
            tracing::error!(target: TRACING_TARGET_STARTUP, error = %error, "task processor stopped with an error");
        }
    });

    let retriever = Arc::new(Retriever::new(store.clone(), EmbeddingClient::new(embedding_config)));
    let auth = AuthState::new(settings.mcp.auth_enabled, settings.mcp.api_key.clone());
    let router = build_router(Arc::new(store), retriever, settings.working_dir(), auth);

    let addr = SocketAddr::from(([127, 0, 0, 1], settings.mcp.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind kb-server on {addr}"))?;

    tracing::info!(target: TRACING_TARGET_STARTUP, %addr, "kb-server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server loop exited with an error")?;

    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    let _ = processor_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
}
