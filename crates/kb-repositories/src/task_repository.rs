use kb_core::{KbError, Result};
use kb_store::Store;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Typed task payload (Design Notes redesign flag): replaces the reference
/// implementation's tagged string stuffed into `error_message`
/// (`CHUNK_UPDATE|<id>|<text>`, `CHUNK_ADD|<file_id>|<title>|<text>`) with
/// a JSON sum type persisted in the `payload` column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    IngestFile,
    AddChunk {
        file_id: i64,
        title: String,
        text: String,
    },
    UpdateChunk {
        chunk_id: i64,
        text: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(KbError::Internal(anyhow::anyhow!("unknown task status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: i64,
    pub file_id: Option<i64>,
    pub original_filename: String,
    pub status: String,
    pub progress: i64,
    pub payload: Option<TaskPayload>,
    pub result_chunk_id: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<TaskRecord> {
    let payload_raw: Option<String> = row.get("payload")?;
    let payload = payload_raw.and_then(|raw| serde_json::from_str(&raw).ok());
    Ok(TaskRecord {
        id: row.get("id")?,
        file_id: row.get("file_id")?,
        original_filename: row.get("original_filename")?,
        status: row.get("status")?,
        progress: row.get("progress")?,
        payload,
        result_chunk_id: row.get("result_chunk_id")?,
        error_message: row.get("error_message")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub struct TaskRepository<'a> {
    store: &'a Store,
}

impl<'a> TaskRepository<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        original_filename: &str,
        file_id: Option<i64>,
        payload: &TaskPayload,
    ) -> Result<i64> {
        let payload_json = serde_json::to_string(payload).map_err(|e| KbError::Internal(e.into()))?;
        self.store.with_cursor(|conn| {
            conn.execute(
                "INSERT INTO tasks (file_id, original_filename, payload) VALUES (?1, ?2, ?3)",
                params![file_id, original_filename, payload_json],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<TaskRecord>> {
        self.store.with_cursor(|conn| {
            Ok(conn
                .query_row("SELECT * FROM tasks WHERE id = ?1", params![id], row_to_task)
                .optional()?)
        })
    }

    pub fn find_pending(&self) -> Result<Vec<TaskRecord>> {
        self.find_by_status_ordered(TaskStatus::Pending, None)
    }

    /// Pending ∪ processing, used to restore the monitor list on boot
    /// (§4.5 resumption).
    pub fn find_active(&self) -> Result<Vec<TaskRecord>> {
        self.store.with_cursor(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM tasks WHERE status IN ('pending', 'processing') ORDER BY created_at, id",
            )?;
            let rows = stmt
                .query_map([], row_to_task)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn find_by_status(&self, status: TaskStatus, limit: i64) -> Result<Vec<TaskRecord>> {
        self.find_by_status_ordered(status, Some(limit))
    }

    fn find_by_status_ordered(&self, status: TaskStatus, limit: Option<i64>) -> Result<Vec<TaskRecord>> {
        self.store.with_cursor(|conn| {
            let sql = match limit {
                Some(_) => "SELECT * FROM tasks WHERE status = ?1 ORDER BY created_at, id LIMIT ?2",
                None => "SELECT * FROM tasks WHERE status = ?1 ORDER BY created_at, id",
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = match limit {
                Some(limit) => stmt
                    .query_map(params![status.as_str(), limit], row_to_task)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
                None => stmt
                    .query_map(params![status.as_str()], row_to_task)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
            };
            Ok(rows)
        })
    }

    pub fn find_recent(&self, limit: i64) -> Result<Vec<TaskRecord>> {
        self.store.with_cursor(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM tasks ORDER BY created_at DESC, id DESC LIMIT ?1")?;
            let rows = stmt
                .query_map(params![limit], row_to_task)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn update_progress(&self, id: i64, progress: i64) -> Result<()> {
        self.store.with_cursor(|conn| {
            conn.execute(
                "UPDATE tasks SET progress = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                params![progress, id],
            )?;
            Ok(())
        })
    }

    pub fn mark_processing(&self, id: i64) -> Result<()> {
        self.update_status(id, TaskStatus::Processing, Some(5), None, None, None)
    }

    pub fn mark_completed(&self, id: i64, result_chunk_id: Option<i64>) -> Result<()> {
        self.update_status(id, TaskStatus::Completed, Some(100), None, result_chunk_id, None)
    }

    pub fn mark_failed(&self, id: i64, error_message: &str) -> Result<()> {
        self.update_status(id, TaskStatus::Failed, None, Some(error_message.to_string()), None, None)
    }

    pub fn requeue_to_pending(&self, id: i64) -> Result<()> {
        self.update_status(id, TaskStatus::Pending, Some(0), None, None, None)
    }

    pub fn set_file_id(&self, id: i64, file_id: i64) -> Result<()> {
        self.store.with_cursor(|conn| {
            conn.execute(
                "UPDATE tasks SET file_id = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                params![file_id, id],
            )?;
            Ok(())
        })
    }

    /// Dynamic, allow-listed SET-clause update mirroring the repository
    /// base class's field-name validation (§4.2): only columns named in
    /// `ALLOWED_FIELDS` may be updated this way.
    fn update_status(
        &self,
        id: i64,
        status: TaskStatus,
        progress: Option<i64>,
        error_message: Option<String>,
        result_chunk_id: Option<i64>,
        file_id: Option<i64>,
    ) -> Result<()> {
        const ALLOWED_FIELDS: &[&str] = &["status", "progress", "error_message", "result_chunk_id", "file_id"];
        crate::validate::validate_field_name(ALLOWED_FIELDS, "status")?;

        let mut set_clauses = vec!["status = ?1".to_string(), "updated_at = CURRENT_TIMESTAMP".to_string()];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(status.as_str())];

        if let Some(progress) = progress {
            crate::validate::validate_field_name(ALLOWED_FIELDS, "progress")?;
            set_clauses.push(format!("progress = ?{}", values.len() + 1));
            values.push(Box::new(progress));
        }
        if let Some(error_message) = error_message {
            crate::validate::validate_field_name(ALLOWED_FIELDS, "error_message")?;
            set_clauses.push(format!("error_message = ?{}", values.len() + 1));
            values.push(Box::new(error_message));
        }
        if let Some(result_chunk_id) = result_chunk_id {
            crate::validate::validate_field_name(ALLOWED_FIELDS, "result_chunk_id")?;
            set_clauses.push(format!("result_chunk_id = ?{}", values.len() + 1));
            values.push(Box::new(result_chunk_id));
        }
        if let Some(file_id) = file_id {
            crate::validate::validate_field_name(ALLOWED_FIELDS, "file_id")?;
            set_clauses.push(format!("file_id = ?{}", values.len() + 1));
            values.push(Box::new(file_id));
        }

        let sql = format!(
            "UPDATE tasks SET {} WHERE id = ?{}",
            set_clauses.join(", "),
            values.len() + 1
        );
        values.push(Box::new(id));

        self.store.with_cursor(|conn| {
            let params_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
            conn.execute(&sql, params_refs.as_slice())?;
            Ok(())
        })
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        self.store.with_cursor(|conn| {
            let affected = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
            Ok(affected > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_store::Store;

    fn store() -> Store {
        Store::open_in_memory(8).expect("store should open")
    }

    #[test]
    fn given_created_task_when_marked_processing_then_progress_is_five() {
        let store = store();
        let repo = TaskRepository::new(&store);
        let id = repo.create("f.md", None, &TaskPayload::IngestFile).unwrap();

        repo.mark_processing(id).unwrap();

        let task = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(task.status, "processing");
        assert_eq!(task.progress, 5);
    }

    #[test]
    fn given_completed_chunk_task_when_marked_completed_then_result_chunk_id_is_set() {
        let store = store();
        let repo = TaskRepository::new(&store);
        let id = repo
            .create("f.md", None, &TaskPayload::AddChunk { file_id: 1, title: "t".into(), text: "x".into() })
            .unwrap();

        repo.mark_completed(id, Some(42)).unwrap();

        let task = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(task.status, "completed");
        assert_eq!(task.result_chunk_id, Some(42));
    }

    #[test]
    fn find_active_returns_pending_and_processing_but_not_completed() {
        let store = store();
        let repo = TaskRepository::new(&store);
        let pending = repo.create("a.md", None, &TaskPayload::IngestFile).unwrap();
        let processing = repo.create("b.md", None, &TaskPayload::IngestFile).unwrap();
        let completed = repo.create("c.md", None, &TaskPayload::IngestFile).unwrap();
        repo.mark_processing(processing).unwrap();
        repo.mark_completed(completed, None).unwrap();

        let active_ids: Vec<i64> = repo.find_active().unwrap().into_iter().map(|t| t.id).collect();
        assert!(active_ids.contains(&pending));
        assert!(active_ids.contains(&processing));
        assert!(!active_ids.contains(&completed));
    }

    #[test]
    fn payload_roundtrips_through_json_column() {
        let store = store();
        let repo = TaskRepository::new(&store);
        let payload = TaskPayload::UpdateChunk { chunk_id: 7, text: "new".into() };
        let id = repo.create("x", None, &payload).unwrap();

        let task = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(task.payload, Some(payload));
    }
}
