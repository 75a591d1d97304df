use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use kb_core::{KbError, Result};
use kb_repositories::{ChunkRecord, ChunkRepository, FileRecord, FileRepository, FileStatus, TaskPayload, TaskRecord, TaskRepository};
use kb_store::Store;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Business-logic layer shared by the MCP tool surface and the REST
/// convenience layer, mirroring the reference implementation's
/// `indexing.services.*` split from its MCP tool wrappers.
pub struct Service<'a> {
    store: &'a Store,
    working_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedFile {
    pub file_id: i64,
    pub filename: String,
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovedFile {
    pub file_id: i64,
    pub filename: String,
    pub deleted_chunks: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovedChunk {
    pub chunk_id: i64,
    pub doc_title: String,
    pub file_deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusView {
    pub task_id: i64,
    pub status: String,
    pub progress: i64,
    pub original_filename: String,
    pub error_message: Option<String>,
    pub chunk_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilesPage {
    pub files: Vec<FileRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfoView {
    #[serde(flatten)]
    pub file: FileRecord,
    pub chunks_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub total_files: i64,
    pub indexed_files: i64,
    pub total_chunks: i64,
    pub total_size: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub chunk_id: i64,
    pub file_id: i64,
    pub filename: String,
    pub doc_title: String,
    pub chunk_text: String,
    pub total_chunks_in_file: i64,
    pub chunk_index_in_file: i64,
}

impl<'a> Service<'a> {
    pub fn new(store: &'a Store, working_dir: PathBuf) -> Self {
        Self { store, working_dir }
    }

    /// `get-docs` (§4.8): one SQL join with window functions computing
    /// `total_chunks_in_file`/`chunk_index_in_file`, ported from
    /// `retrieval/tools/get_docs.py`. Inputs over the 3-title cap are
    /// truncated, not rejected.
    pub fn get_docs(&self, doc_titles: &[String]) -> Result<(HashMap<String, DocumentView>, Vec<String>)> {
        const MAX_TITLES: usize = 3;
        let titles: Vec<String> = doc_titles.iter().take(MAX_TITLES).cloned().collect();
        if titles.is_empty() {
            return Ok((HashMap::new(), Vec::new()));
        }

        let placeholders = titles.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT c.id, c.file_id, c.doc_title, c.chunk_text, f.filename, \
             COUNT(*) OVER (PARTITION BY c.file_id) AS total_chunks_in_file, \
             ROW_NUMBER() OVER (PARTITION BY c.file_id ORDER BY c.id) AS chunk_index_in_file \
             FROM chunks c JOIN files f ON c.file_id = f.id WHERE c.doc_title IN ({placeholders})"
        );

        let rows: Vec<DocumentView> = self.store.with_cursor(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let result = stmt.query_map(rusqlite::params_from_iter(titles.iter()), |row| {
                Ok(DocumentView {
                    chunk_id: row.get(0)?,
                    file_id: row.get(1)?,
                    doc_title: row.get(2)?,
                    chunk_text: row.get(3)?,
                    filename: row.get(4)?,
                    total_chunks_in_file: row.get(5)?,
                    chunk_index_in_file: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(result)
        })?;

        let mut documents: HashMap<String, DocumentView> = HashMap::new();
        for row in rows {
            documents.insert(row.doc_title.clone(), row);
        }
        let not_found = titles.into_iter().filter(|t| !documents.contains_key(t)).collect();
        Ok((documents, not_found))
    }

    /// `create_file(name)` (§4.8): blank working-file, `.md` extension
    /// auto-appended, numeric-suffix renaming on collision (Conflict
    /// resolved before it becomes visible, per §7). Ported from
    /// `indexing.services.file_service.create_empty_file`.
    pub fn create_file(&self, name: &str) -> Result<CreatedFile> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(KbError::validation("filename must not be empty"));
        }

        let mut filename = trimmed.to_string();
        if !filename.to_lowercase().ends_with(".md") {
            filename.push_str(".md");
        }

        std::fs::create_dir_all(&self.working_dir)
            .map_err(|e| KbError::Storage(format!("cannot create working dir: {e}")))?;
        let unique_filename = unique_filename_in(&self.working_dir, &filename);
        let working_path = self.working_dir.join(&unique_filename);
        std::fs::write(&working_path, "").map_err(|e| KbError::Storage(format!("cannot create working file: {e}")))?;

        let unique_hash = sha256_hex(format!("{unique_filename}_{}", unix_timestamp_nanos()).as_bytes());

        let file_id = FileRepository::new(self.store).create_with_status(
            &unique_hash,
            &unique_filename,
            &working_path.to_string_lossy(),
            None,
            None,
            None,
            FileStatus::Empty,
        )?;

        Ok(CreatedFile {
            file_id,
            filename: unique_filename,
            file_path: working_path.to_string_lossy().into_owned(),
        })
    }

    /// `remove_file(id)` (§4.8): counts chunks before the cascading
    /// delete, then unlinks the working copy. Ported from
    /// `indexing.services.file_service.delete_file`.
    pub fn remove_file(&self, file_id: i64) -> Result<RemovedFile> {
        let files = FileRepository::new(self.store);
        let chunks = ChunkRepository::new(self.store);

        let file = files
            .find_by_id(file_id)?
            .ok_or_else(|| KbError::not_found(format!("file {file_id} not found")))?;
        let deleted_chunks = chunks.count_by_file_id(file_id)?;

        files.delete(file_id)?;

        let working_path = Path::new(&file.file_path);
        if working_path.exists() {
            let _ = std::fs::remove_file(working_path);
        }
        if let Some(original) = &file.original_file_path {
            let original_path = Path::new(original);
            if original_path.exists() {
                let _ = std::fs::remove_file(original_path);
            }
        }

        Ok(RemovedFile { file_id, filename: file.filename, deleted_chunks })
    }

    /// `add_chunk(file_id,title,text)` (§4.8): validates inputs and the
    /// parent file's existence synchronously, then enqueues an
    /// `AddChunk` task for the processor to embed asynchronously.
    pub fn add_chunk(&self, file_id: i64, title: &str, text: &str) -> Result<i64> {
        let title = title.trim();
        let text = text.trim();
        if title.is_empty() {
            return Err(KbError::validation("doc_title must not be empty"));
        }
        if text.is_empty() {
            return Err(KbError::validation("chunk_text must not be empty"));
        }

        let files = FileRepository::new(self.store);
        let file = files
            .find_by_id(file_id)?
            .ok_or_else(|| KbError::not_found(format!("file {file_id} not found")))?;

        let payload = TaskPayload::AddChunk { file_id, title: title.to_string(), text: text.to_string() };
        TaskRepository::new(self.store).create(&file.filename, Some(file_id), &payload)
    }

    /// `modify_chunk_content(chunk_id,new_text)` (§4.8): enqueues an
    /// `UpdateChunk` task; the embedding refresh happens asynchronously.
    pub fn modify_chunk_content(&self, chunk_id: i64, new_text: &str) -> Result<i64> {
        let new_text = new_text.trim();
        if new_text.is_empty() {
            return Err(KbError::validation("new content must not be empty"));
        }

        let chunks = ChunkRepository::new(self.store);
        let chunk = chunks
            .find_by_id(chunk_id)?
            .ok_or_else(|| KbError::not_found(format!("chunk {chunk_id} not found")))?;

        let payload = TaskPayload::UpdateChunk { chunk_id, text: new_text.to_string() };
        TaskRepository::new(self.store).create(&chunk.doc_title, Some(chunk.file_id), &payload)
    }

    /// `remove_chunk(id)` (§4.8): deleting a file's last chunk also
    /// deletes the file (noted in `chunk_tools.create_chunk`'s
    /// docstring and exercised by P3/L3).
    pub fn remove_chunk(&self, chunk_id: i64) -> Result<RemovedChunk> {
        let chunks = ChunkRepository::new(self.store);
        let chunk = chunks
            .find_by_id(chunk_id)?
            .ok_or_else(|| KbError::not_found(format!("chunk {chunk_id} not found")))?;

        chunks.delete_with_vectors(chunk_id)?;

        let remaining = chunks.count_by_file_id(chunk.file_id)?;
        let file_deleted = if remaining == 0 {
            FileRepository::new(self.store).delete(chunk.file_id)?
        } else {
            false
        };

        Ok(RemovedChunk { chunk_id, doc_title: chunk.doc_title, file_deleted })
    }

    pub fn batch_remove_chunks(&self, chunk_ids: &[i64]) -> Vec<Result<RemovedChunk>> {
        chunk_ids.iter().map(|id| self.remove_chunk(*id)).collect()
    }

    /// `check_task_status(task_id)` (§4.8): `result_chunk_id` is the
    /// typed replacement for the reference implementation's
    /// `error_message`-embedded `"CHUNK_ID:123"` tag.
    pub fn check_task_status(&self, task_id: i64) -> Result<TaskStatusView> {
        let task: TaskRecord = TaskRepository::new(self.store)
            .find_by_id(task_id)?
            .ok_or_else(|| KbError::not_found(format!("task {task_id} not found")))?;

        Ok(TaskStatusView {
            task_id: task.id,
            status: task.status.clone(),
            progress: task.progress,
            original_filename: task.original_filename,
            error_message: if task.status == "failed" { task.error_message } else { None },
            chunk_id: task.result_chunk_id,
            created_at: task.created_at,
            updated_at: task.updated_at,
        })
    }

    pub fn query_files(&self, limit: i64, offset: i64, status: Option<&str>) -> Result<FilesPage> {
        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);
        let status = status.map(FileStatus::parse).transpose()?;

        let files = FileRepository::new(self.store);
        let records = files.list_by_status(status.clone(), limit, offset)?;
        let total = files.count(status)?;
        Ok(FilesPage { files: records, total, limit, offset })
    }

    pub fn query_file_info(&self, file_id: i64) -> Result<FileInfoView> {
        let files = FileRepository::new(self.store);
        let file = files.find_by_id(file_id)?.ok_or_else(|| KbError::not_found(format!("file {file_id} not found")))?;
        let chunks_count = ChunkRepository::new(self.store).count_by_file_id(file_id)?;
        Ok(FileInfoView { file, chunks_count })
    }

    pub fn query_chunk_info(&self, chunk_id: i64) -> Result<ChunkRecord> {
        ChunkRepository::new(self.store)
            .find_by_id(chunk_id)?
            .ok_or_else(|| KbError::not_found(format!("chunk {chunk_id} not found")))
    }

    pub fn query_storage_stats(&self) -> Result<StorageStats> {
        let files = FileRepository::new(self.store);
        Ok(StorageStats {
            total_files: files.count(None)?,
            indexed_files: files.count(Some(FileStatus::Indexed))?,
            total_chunks: ChunkRepository::new(self.store).total_count()?,
            total_size: files.total_size()?,
        })
    }
}

fn unique_filename_in(dir: &Path, filename: &str) -> String {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return filename.to_string();
    }

    let path = Path::new(filename);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(filename);
    let ext = path.extension().and_then(|s| s.to_str()).map(|s| format!(".{s}")).unwrap_or_default();

    let mut counter = 1;
    loop {
        let candidate_name = format!("{stem}_{counter}{ext}");
        if !dir.join(&candidate_name).exists() {
            return candidate_name;
        }
        counter += 1;
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn unix_timestamp_nanos() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or_default()
}
