use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use kb_core::Result;
use kb_embedding::EmbeddingClient;
use kb_repositories::{TaskPayload, TaskRepository};
use kb_store::Store;
use tracing::{error, warn};

use crate::converter::Converter;
use crate::{chunk_task, ingest};

/// Single-worker cooperative processor (§4.5): one task globally at a
/// time, pulled from the `tasks` table in `created_at` order.
pub struct TaskProcessor {
    store: Store,
    embedding: EmbeddingClient,
    converter: Arc<dyn Converter>,
    max_tokens: u32,
    stop: Arc<AtomicBool>,
}

impl TaskProcessor {
    pub fn new(store: Store, embedding: EmbeddingClient, converter: Arc<dyn Converter>, max_tokens: u32) -> Self {
        Self {
            store,
            embedding,
            converter,
            max_tokens,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Requeues any task left `processing` from a previous run (§4.5
    /// resumption policy), then dispatches pending tasks oldest-first
    /// until told to stop or the queue drains. Callers loop this with a
    /// poll interval / notification of their own choosing.
    pub fn resume_interrupted(&self) -> Result<()> {
        let tasks = TaskRepository::new(&self.store);
        for task in tasks.find_active()? {
            if task.status == "processing" {
                tasks.requeue_to_pending(task.id)?;
                warn!(task_id = task.id, "requeued interrupted task to pending");
            }
        }
        Ok(())
    }

    pub async fn run_once(&self) -> Result<bool> {
        let tasks = TaskRepository::new(&self.store);
        let pending = tasks.find_pending()?;
        let Some(task) = pending.into_iter().next() else {
            return Ok(false);
        };

        let payload = task.payload.clone().unwrap_or(TaskPayload::IngestFile);
        let result = match payload {
            TaskPayload::IngestFile => {
                let Some(file_id) = task.file_id else {
                    tasks.mark_failed(task.id, "ingest task missing file_id")?;
                    return Ok(true);
                };
                ingest::run(&self.store, &self.embedding, self.converter.as_ref(), task.id, file_id, self.max_tokens).await
            }
            TaskPayload::AddChunk { file_id, title, text } => {
                chunk_task::run_add_chunk(&self.store, &self.embedding, task.id, file_id, &title, &text).await
            }
            TaskPayload::UpdateChunk { chunk_id, text } => {
                chunk_task::run_update_chunk(&self.store, &self.embedding, task.id, chunk_id, &text).await
            }
        };

        if let Err(err) = result {
            error!(task_id = task.id, error = %err, "task processing aborted with an unhandled error");
            tasks.mark_failed(task.id, &err.to_string())?;
        }

        Ok(true)
    }

    /// Runs until `stop_handle()` is set or the queue is empty and a full
    /// poll interval produces nothing new.
    pub async fn run(&self, poll_interval: std::time::Duration) -> Result<()> {
        self.resume_interrupted()?;
        while !self.stop.load(Ordering::Relaxed) {
            let processed = self.run_once().await?;
            if !processed {
                tokio::time::sleep(poll_interval).await;
            }
        }
        Ok(())
    }
}
