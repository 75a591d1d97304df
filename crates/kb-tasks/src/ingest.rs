use std::path::Path;

use kb_core::{KbError, Result};
use kb_embedding::EmbeddingClient;
use kb_repositories::{ChunkRepository, FileRepository, FileStatus, NewChunk, TaskRepository};
use kb_store::Store;
use tracing::info;

use crate::converter::Converter;

const EMBED_BATCH_SIZE: usize = 10;
const WRITE_BATCH_SIZE: usize = 50;

/// Runs the §4.5 ingest state machine for one file. On any failure the
/// file and task are both marked `error`/`failed`; chunk batches already
/// written before the failure are kept (accepted trade-off, §9).
pub async fn run(
    store: &Store,
    embedding: &EmbeddingClient,
    converter: &dyn Converter,
    task_id: i64,
    file_id: i64,
    max_tokens: u32,
) -> Result<()> {
    let tasks = TaskRepository::new(store);
    let files = FileRepository::new(store);

    tasks.mark_processing(task_id)?;
    info!(task_id, file_id, stage = "start", progress = 5, "ingest started");

    let file = files
        .find_by_id(file_id)?
        .ok_or_else(|| KbError::not_found(format!("file {file_id} not found")))?;

    let result = run_stages(store, embedding, converter, &file, max_tokens, task_id).await;

    match result {
        Ok(chunk_count) if chunk_count > 0 => {
            files.update_status(file_id, FileStatus::Indexed)?;
            tasks.mark_completed(task_id, None)?;
            kb_reconciler::reconcile(store, file_id)?;
            info!(task_id, file_id, chunk_count, "ingest completed");
            Ok(())
        }
        Ok(_) => {
            files.update_status(file_id, FileStatus::Error)?;
            tasks.mark_failed(task_id, "no valid chunks")?;
            Ok(())
        }
        Err(err) => {
            files.update_status(file_id, FileStatus::Error)?;
            tasks.mark_failed(task_id, &err.to_string())?;
            Ok(())
        }
    }
}

async fn run_stages(
    store: &Store,
    embedding: &EmbeddingClient,
    converter: &dyn Converter,
    file: &kb_repositories::FileRecord,
    max_tokens: u32,
    task_id: i64,
) -> Result<usize> {
    let tasks = TaskRepository::new(store);
    let original_path = file
        .original_file_path
        .as_deref()
        .unwrap_or(&file.file_path);

    let markdown = converter.convert(Path::new(original_path))?;
    tasks.update_progress(task_id, 15)?;

    let base_name = Path::new(&file.filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&file.filename)
        .to_string();
    let chunks = kb_chunking::chunk_document(&base_name, &markdown, Path::new(original_path), max_tokens as usize);
    tasks.update_progress(task_id, 30)?;

    if chunks.is_empty() {
        return Ok(0);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.chunk_text.clone()).collect();
    let mut embeddings = Vec::with_capacity(texts.len());
    for batch in texts.chunks(EMBED_BATCH_SIZE) {
        let mut batch_vectors = embedding.embed_documents(batch).await?;
        embeddings.append(&mut batch_vectors);
    }
    tasks.update_progress(task_id, 80)?;

    let chunk_repo = ChunkRepository::new(store);
    let mut written = 0usize;
    for (chunk_batch, embedding_batch) in chunks.chunks(WRITE_BATCH_SIZE).zip(embeddings.chunks(WRITE_BATCH_SIZE)) {
        let new_chunks: Vec<NewChunk> = chunk_batch
            .iter()
            .zip(embedding_batch.iter())
            .map(|(c, e)| NewChunk {
                doc_title: c.doc_title.clone(),
                chunk_text: c.chunk_text.clone(),
                embedding: e.clone(),
            })
            .collect();
        let ids = chunk_repo.batch_insert(file.id, &new_chunks)?;
        written += ids.len();
    }
    tasks.update_progress(task_id, 100)?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::EmbeddingConfig;
    use kb_repositories::TaskPayload;

    struct StubConverter(String);
    impl Converter for StubConverter {
        fn convert(&self, _original_path: &Path) -> Result<String> {
            Ok(self.0.clone())
        }
    }

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
    async fn given_markdown_with_no_headings_when_ingested_and_embedding_unreachable_then_task_fails() {
        let store = Store::open_in_memory(4).expect("store should open");
        let file_id = FileRepository::new(&store)
            .create("h", "doc.md", "/tmp/doc-working.md", None, Some("md"), Some("/tmp/doc.md"))
            .unwrap();
        let task_id = TaskRepository::new(&store)
            .create("doc.md", Some(file_id), &TaskPayload::IngestFile)
            .unwrap();

        let converter = StubConverter("some plain content".into());
        let client = embedding_client();

        run(&store, &client, &converter, task_id, file_id, 8192).await.unwrap();

        let task = TaskRepository::new(&store).find_by_id(task_id).unwrap().unwrap();
        assert_eq!(task.status, "failed");
        let file = FileRepository::new(&store).find_by_id(file_id).unwrap().unwrap();
        assert_eq!(file.status, "error");
    }

    #[tokio::test]
    async fn given_empty_markdown_when_ingested_then_task_fails_with_no_valid_chunks() {
        let store = Store::open_in_memory(4).expect("store should open");
        let file_id = FileRepository::new(&store)
            .create("h2", "empty.md", "/tmp/empty-working.md", None, Some("md"), Some("/tmp/empty.md"))
            .unwrap();
        let task_id = TaskRepository::new(&store)
            .create("empty.md", Some(file_id), &TaskPayload::IngestFile)
            .unwrap();

        let converter = StubConverter("   ".into());
        let client = embedding_client();

        run(&store, &client, &converter, task_id, file_id, 8192).await.unwrap();

        let task = TaskRepository::new(&store).find_by_id(task_id).unwrap().unwrap();
        assert_eq!(task.status, "failed");
        assert_eq!(task.error_message.as_deref(), Some("no valid chunks"));
    }
}
