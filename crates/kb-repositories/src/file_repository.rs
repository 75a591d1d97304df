use kb_core::{KbError, Result};
use kb_store::Store;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum FileStatus {
    Pending,
    Indexed,
    Error,
    Empty,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Indexed => "indexed",
            FileStatus::Error => "error",
            FileStatus::Empty => "empty",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "pending" => Ok(FileStatus::Pending),
            "indexed" => Ok(FileStatus::Indexed),
            "error" => Ok(FileStatus::Error),
            "empty" => Ok(FileStatus::Empty),
            other => Err(KbError::Internal(anyhow::anyhow!(
                "unknown file status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub file_hash: String,
    pub filename: String,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub original_file_type: Option<String>,
    pub original_file_path: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get("id")?,
        file_hash: row.get("file_hash")?,
        filename: row.get("filename")?,
        file_path: row.get("file_path")?,
        file_size: row.get("file_size")?,
        original_file_type: row.get("original_file_type")?,
        original_file_path: row.get("original_file_path")?,
        status: row.get("status")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub struct FileRepository<'a> {
    store: &'a Store,
}

impl<'a> FileRepository<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        file_hash: &str,
        filename: &str,
        file_path: &str,
        file_size: Option<i64>,
        original_file_type: Option<&str>,
        original_file_path: Option<&str>,
    ) -> Result<i64> {
        self.create_with_status(
            file_hash,
            filename,
            file_path,
            file_size,
            original_file_type,
            original_file_path,
            FileStatus::Pending,
        )
    }

    /// Same as `create`, but pins the initial status instead of relying
    /// on the schema's `pending` default — used for manually created
    /// blank files, which start `empty` rather than `pending` (P3).
    pub fn create_with_status(
        &self,
        file_hash: &str,
        filename: &str,
        file_path: &str,
        file_size: Option<i64>,
        original_file_type: Option<&str>,
        original_file_path: Option<&str>,
        status: FileStatus,
    ) -> Result<i64> {
        self.store.with_cursor(|conn| {
            insert_file(
                conn,
                file_hash,
                filename,
                file_path,
                file_size,
                original_file_type,
                original_file_path,
                status,
            )
        })
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<FileRecord>> {
        self.store.with_cursor(|conn| {
            Ok(conn
                .query_row("SELECT * FROM files WHERE id = ?1", params![id], row_to_file)
                .optional()?)
        })
    }

    pub fn find_by_hash(&self, hash: &str) -> Result<Option<FileRecord>> {
        self.store.with_cursor(|conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM files WHERE file_hash = ?1",
                    params![hash],
                    row_to_file,
                )
                .optional()?)
        })
    }

    pub fn find_by_status(&self, status: FileStatus) -> Result<Vec<FileRecord>> {
        self.store.with_cursor(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM files WHERE status = ?1 ORDER BY id")?;
            let rows = stmt
                .query_map(params![status.as_str()], row_to_file)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Filename substring scope resolution used by the retriever (C7 §4.7
    /// step 2): union of ids of indexed files whose filename contains any
    /// of the given substrings.
    pub fn find_ids_by_filename_substrings(&self, substrings: &[String]) -> Result<Vec<i64>> {
        if substrings.is_empty() {
            return Ok(Vec::new());
        }
        self.store.with_cursor(|conn| {
            let mut ids = std::collections::BTreeSet::new();
            let mut stmt = conn.prepare("SELECT id FROM files WHERE filename LIKE ?1 ESCAPE '\\'")?;
            for s in substrings {
                let pattern = format!("%{}%", escape_like(s));
                let rows = stmt
                    .query_map(params![pattern], |row| row.get::<_, i64>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids.extend(rows);
            }
            Ok(ids.into_iter().collect())
        })
    }

    pub fn list(&self, limit: i64, offset: i64) -> Result<Vec<FileRecord>> {
        self.list_by_status(None, limit, offset)
    }

    pub fn list_by_status(&self, status: Option<FileStatus>, limit: i64, offset: i64) -> Result<Vec<FileRecord>> {
        self.store.with_cursor(|conn| {
            let rows = match status {
                Some(status) => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM files WHERE status = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
                    )?;
                    let result = stmt.query_map(params![status.as_str(), limit, offset], row_to_file)?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    result
                }
                None => {
                    let mut stmt = conn.prepare("SELECT * FROM files ORDER BY id DESC LIMIT ?1 OFFSET ?2")?;
                    let result = stmt.query_map(params![limit, offset], row_to_file)?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    result
                }
            };
            Ok(rows)
        })
    }

    pub fn count(&self, status: Option<FileStatus>) -> Result<i64> {
        self.store.with_cursor(|conn| match status {
            Some(status) => Ok(conn.query_row(
                "SELECT COUNT(*) FROM files WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )?),
            None => Ok(conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?),
        })
    }

    pub fn total_size(&self) -> Result<i64> {
        self.store.with_cursor(|conn| {
            Ok(conn.query_row("SELECT COALESCE(SUM(file_size), 0) FROM files", [], |row| row.get(0))?)
        })
    }

    pub fn update_status(&self, id: i64, status: FileStatus) -> Result<bool> {
        self.store.with_cursor(|conn| {
            let affected = conn.execute(
                "UPDATE files SET status = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                params![status.as_str(), id],
            )?;
            Ok(affected > 0)
        })
    }

    /// Deletes a file and, via `ON DELETE CASCADE`, its chunks; vector rows
    /// are removed explicitly first since `vec_chunks` carries no foreign
    /// key of its own.
    pub fn delete(&self, id: i64) -> Result<bool> {
        self.store.transaction(|tx| {
            tx.execute(
                "DELETE FROM vec_chunks WHERE chunk_id IN (SELECT id FROM chunks WHERE file_id = ?1)",
                params![id],
            )?;
            let affected = tx.execute("DELETE FROM files WHERE id = ?1", params![id])?;
            Ok(affected > 0)
        })
    }
}

fn insert_file(
    conn: &Connection,
    file_hash: &str,
    filename: &str,
    file_path: &str,
    file_size: Option<i64>,
    original_file_type: Option<&str>,
    original_file_path: Option<&str>,
    status: FileStatus,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO files (file_hash, filename, file_path, file_size, original_file_type, original_file_path, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            file_hash,
            filename,
            file_path,
            file_size,
            original_file_type,
            original_file_path,
            status.as_str()
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref sqlite_err, _)
            if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            KbError::Conflict(format!("file with hash {file_hash} already exists"))
        }
        other => KbError::from(other),
    })?;
    Ok(conn.last_insert_rowid())
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_store::Store;

    fn store() -> Store {
        Store::open_in_memory(8).expect("store should open")
    }

    #[test]
    fn given_new_file_when_created_then_it_is_findable_by_hash() {
        let store = store();
        let repo = FileRepository::new(&store);
        let id = repo
            .create("hash-1", "doc.md", "/working/doc.md", Some(100), Some("md"), None)
            .expect("create should succeed");

        let found = repo
            .find_by_hash("hash-1")
            .expect("lookup should succeed")
            .expect("file should exist");
        assert_eq!(found.id, id);
        assert_eq!(found.status, "pending");
    }

    #[test]
    fn create_returns_conflict_when_hash_already_exists() {
        let store = store();
        let repo = FileRepository::new(&store);
        repo.create("dup", "a.md", "/a.md", None, None, None)
            .expect("first create should succeed");

        let result = repo.create("dup", "b.md", "/b.md", None, None, None);
        assert!(matches!(result, Err(KbError::Conflict(_))));
    }

    #[test]
    fn delete_cascades_chunks_and_vectors() {
        let store = store();
        let file_id = store
            .with_cursor(|conn| {
                conn.execute(
                    "INSERT INTO files (file_hash, filename, file_path) VALUES ('h','f','p')",
                    [],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .unwrap();
        store
            .with_cursor(|conn| {
                conn.execute(
                    "INSERT INTO chunks (id, file_id, doc_title, chunk_text) VALUES (1, ?1, 't', 'x')",
                    params![file_id],
                )?;
                conn.execute(
                    "INSERT INTO vec_chunks (chunk_id, embedding) VALUES (1, ?1)",
                    params![vec![0u8; 32]],
                )?;
                Ok(())
            })
            .unwrap();

        let repo = FileRepository::new(&store);
        assert!(repo.delete(file_id).unwrap());

        let remaining_chunks: i64 = store
            .with_cursor(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?))
            .unwrap();
        let remaining_vectors: i64 = store
            .with_cursor(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM vec_chunks", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(remaining_chunks, 0);
        assert_eq!(remaining_vectors, 0);
    }
}
