use kb_core::{KbError, Result};
use kb_embedding::EmbeddingClient;
use kb_repositories::{ChunkRepository, FileRepository, FileStatus, TaskRepository};
use kb_store::Store;
use tracing::info;

/// Runs a chunk-add or chunk-update task (§4.5): one embedding call, one
/// repository write, then a reconcile of the owning file's working copy.
/// The resulting chunk id is stored on `result_chunk_id` for pollers.
pub async fn run_add_chunk(
    store: &Store,
    embedding: &EmbeddingClient,
    task_id: i64,
    file_id: i64,
    title: &str,
    text: &str,
) -> Result<()> {
    let tasks = TaskRepository::new(store);
    tasks.mark_processing(task_id)?;

    if text.trim().is_empty() {
        tasks.mark_failed(task_id, "chunk text must not be empty")?;
        return Ok(());
    }

    let embedding_bytes = match embedding.embed_documents(std::slice::from_ref(&text.to_string())).await {
        Ok(mut vectors) => vectors.pop().ok_or_else(|| KbError::FatalIngest("no embedding returned".into())),
        Err(err) => Err(err),
    };

    let embedding_bytes = match embedding_bytes {
        Ok(bytes) => bytes,
        Err(err) => {
            tasks.mark_failed(task_id, &err.to_string())?;
            return Ok(());
        }
    };
    tasks.update_progress(task_id, 80)?;

    let chunk_id = ChunkRepository::new(store).insert(file_id, title, text, &embedding_bytes)?;
    tasks.update_progress(task_id, 85)?;

    // A file always has >=1 chunk once this insert commits, so it is
    // `indexed` from here on regardless of its prior `empty`/`pending`/
    // `error` status (P3).
    FileRepository::new(store).update_status(file_id, FileStatus::Indexed)?;

    kb_reconciler::reconcile(store, file_id)?;
    tasks.mark_completed(task_id, Some(chunk_id))?;
    info!(task_id, chunk_id, "chunk-add task completed");
    Ok(())
}

pub async fn run_update_chunk(
    store: &Store,
    embedding: &EmbeddingClient,
    task_id: i64,
    chunk_id: i64,
    text: &str,
) -> Result<()> {
    let tasks = TaskRepository::new(store);
    tasks.mark_processing(task_id)?;

    if text.trim().is_empty() {
        tasks.mark_failed(task_id, "chunk text must not be empty")?;
        return Ok(());
    }

    let chunk_repo = ChunkRepository::new(store);
    let chunk = match chunk_repo.find_by_id(chunk_id)? {
        Some(chunk) => chunk,
        None => {
            tasks.mark_failed(task_id, &format!("chunk {chunk_id} not found"))?;
            return Ok(());
        }
    };

    let embedding_bytes = match embedding.embed_documents(std::slice::from_ref(&text.to_string())).await {
        Ok(mut vectors) => vectors.pop().ok_or_else(|| KbError::FatalIngest("no embedding returned".into())),
        Err(err) => Err(err),
    };

    let embedding_bytes = match embedding_bytes {
        Ok(bytes) => bytes,
        Err(err) => {
            tasks.mark_failed(task_id, &err.to_string())?;
            return Ok(());
        }
    };
    tasks.update_progress(task_id, 80)?;

    chunk_repo.update_content(chunk_id, text, &embedding_bytes)?;
    tasks.update_progress(task_id, 85)?;

    kb_reconciler::reconcile(store, chunk.file_id)?;
    tasks.mark_completed(task_id, Some(chunk_id))?;
    info!(task_id, chunk_id, "chunk-update task completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::EmbeddingConfig;
    use kb_repositories::{FileRepository, TaskPayload};

    fn embedding_client() -> EmbeddingClient {
        EmbeddingClient::new(EmbeddingConfig {
            base_url: "http://127.0.0.1:1".into(),
            api_key: "k".into(),
            model: "m".into(),
            vector_dim: 4,
            max_tokens: 8192,
            rpm: 6000,
        })
    }

    #[tokio::test]
    async fn given_empty_text_when_adding_chunk_then_task_fails_without_calling_embedding() {
        let store = Store::open_in_memory(4).expect("store should open");
        let file_id = FileRepository::new(&store)
            .create("h", "f.md", "/tmp/f.md", None, None, None)
            .unwrap();
        let task_id = TaskRepository::new(&store)
            .create("f.md", Some(file_id), &TaskPayload::AddChunk { file_id, title: "t".into(), text: "".into() })
            .unwrap();

        run_add_chunk(&store, &embedding_client(), task_id, file_id, "t", "").await.unwrap();

        let task = TaskRepository::new(&store).find_by_id(task_id).unwrap().unwrap();
        assert_eq!(task.status, "failed");
    }

    #[tokio::test]
    async fn given_missing_chunk_when_updating_then_task_fails_with_not_found_message() {
        let store = Store::open_in_memory(4).expect("store should open");
        let task_id = TaskRepository::new(&store)
            .create("f.md", None, &TaskPayload::UpdateChunk { chunk_id: 999, text: "new".into() })
            .unwrap();

        run_update_chunk(&store, &embedding_client(), task_id, 999, "new").await.unwrap();

        let task = TaskRepository::new(&store).find_by_id(task_id).unwrap().unwrap();
        assert_eq!(task.status, "failed");
        assert!(task.error_message.unwrap().contains("999"));
    }
}
