use kb_core::{KbError, Result};
use kb_store::Store;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ChunkRecord {
    pub id: i64,
    pub file_id: i64,
    pub doc_title: String,
    pub chunk_text: String,
}

/// A chunk ready to be written, produced by the chunker (C3) and embedded
/// by C4. `embedding` is the raw little-endian float32 buffer described in
/// §6; its length must equal `4 * vector_dim` (I-C2) before it reaches
/// this layer — the repository does not re-validate it.
pub struct NewChunk {
    pub doc_title: String,
    pub chunk_text: String,
    pub embedding: Vec<u8>,
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<ChunkRecord> {
    Ok(ChunkRecord {
        id: row.get("id")?,
        file_id: row.get("file_id")?,
        doc_title: row.get("doc_title")?,
        chunk_text: row.get("chunk_text")?,
    })
}

pub struct ChunkRepository<'a> {
    store: &'a Store,
}

impl<'a> ChunkRepository<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// I-C1: inserts the Chunk row (firing the FTS5 triggers) and the
    /// matching vector row inside one transaction.
    pub fn insert(&self, file_id: i64, doc_title: &str, chunk_text: &str, embedding: &[u8]) -> Result<i64> {
        self.store
            .transaction(|tx| insert_chunk_and_vector(tx, file_id, doc_title, chunk_text, embedding))
    }

    /// One transaction per batch of `chunks`, as required by §4.5's
    /// write-batch stage. Returns the assigned chunk ids in insertion
    /// order (monotonic, reflecting source order per §5's ordering
    /// guarantee).
    pub fn batch_insert(&self, file_id: i64, chunks: &[NewChunk]) -> Result<Vec<i64>> {
        self.store.transaction(|tx| {
            let mut ids = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                let id = insert_chunk_and_vector(
                    tx,
                    file_id,
                    &chunk.doc_title,
                    &chunk.chunk_text,
                    &chunk.embedding,
                )?;
                ids.push(id);
            }
            Ok(ids)
        })
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<ChunkRecord>> {
        self.store.with_cursor(|conn| {
            Ok(conn
                .query_row("SELECT id, file_id, doc_title, chunk_text FROM chunks WHERE id = ?1", params![id], row_to_chunk)
                .optional()?)
        })
    }

    pub fn find_by_file_id(&self, file_id: i64) -> Result<Vec<ChunkRecord>> {
        self.store.with_cursor(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, file_id, doc_title, chunk_text FROM chunks WHERE file_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![file_id], row_to_chunk)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn count_by_file_id(&self, file_id: i64) -> Result<i64> {
        self.store.with_cursor(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM chunks WHERE file_id = ?1",
                params![file_id],
                |row| row.get(0),
            )?)
        })
    }

    pub fn total_count(&self) -> Result<i64> {
        self.store
            .with_cursor(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?))
    }

    pub fn update_title(&self, chunk_id: i64, doc_title: &str) -> Result<bool> {
        self.store.with_cursor(|conn| {
            let affected = conn.execute(
                "UPDATE chunks SET doc_title = ?1 WHERE id = ?2",
                params![doc_title, chunk_id],
            )?;
            Ok(affected > 0)
        })
    }

    /// Atomically updates both the Chunk row's text/embedding and the
    /// vector mirror (§4.2).
    pub fn update_content(&self, chunk_id: i64, chunk_text: &str, embedding: &[u8]) -> Result<bool> {
        self.store.transaction(|tx| {
            let affected = tx.execute(
                "UPDATE chunks SET chunk_text = ?1, embedding = ?2 WHERE id = ?3",
                params![chunk_text, embedding, chunk_id],
            )?;
            if affected > 0 {
                tx.execute(
                    "UPDATE vec_chunks SET embedding = ?1 WHERE chunk_id = ?2",
                    params![embedding, chunk_id],
                )?;
            }
            Ok(affected > 0)
        })
    }

    /// Deletes the vector row then the Chunk row (FTS5 cleaned by
    /// trigger), per §4.2.
    pub fn delete_with_vectors(&self, chunk_id: i64) -> Result<bool> {
        self.store.transaction(|tx| {
            tx.execute("DELETE FROM vec_chunks WHERE chunk_id = ?1", params![chunk_id])?;
            let affected = tx.execute("DELETE FROM chunks WHERE id = ?1", params![chunk_id])?;
            Ok(affected > 0)
        })
    }

    /// Bulk-deletes vectors for all chunks of a file, then the chunks
    /// themselves, per §4.2.
    pub fn delete_by_file_id(&self, file_id: i64) -> Result<usize> {
        self.store.transaction(|tx| {
            tx.execute(
                "DELETE FROM vec_chunks WHERE chunk_id IN (SELECT id FROM chunks WHERE file_id = ?1)",
                params![file_id],
            )?;
            let affected = tx.execute("DELETE FROM chunks WHERE file_id = ?1", params![file_id])?;
            Ok(affected)
        })
    }
}

fn insert_chunk_and_vector(
    conn: &Connection,
    file_id: i64,
    doc_title: &str,
    chunk_text: &str,
    embedding: &[u8],
) -> Result<i64> {
    conn.execute(
        "INSERT INTO chunks (file_id, doc_title, chunk_text, embedding) VALUES (?1, ?2, ?3, ?4)",
        params![file_id, doc_title, chunk_text, embedding],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref sqlite_err, _)
            if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            KbError::NotFound(format!("file {file_id} does not exist"))
        }
        other => KbError::from(other),
    })?;
    let chunk_id = conn.last_insert_rowid();

    conn.execute(
        "INSERT INTO vec_chunks (chunk_id, embedding) VALUES (?1, ?2)",
        params![chunk_id, embedding],
    )?;

    Ok(chunk_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_repository::FileRepository;
    use kb_store::Store;

    const VECTOR_DIM: usize = 4;

    fn embedding() -> Vec<u8> {
        let mut bytes = Vec::with_capacity(VECTOR_DIM * 4);
        for i in 0..VECTOR_DIM {
            bytes.extend_from_slice(&(i as f32).to_le_bytes());
        }
        bytes
    }

    fn store_with_file() -> (Store, i64) {
        let store = Store::open_in_memory(VECTOR_DIM).expect("store should open");
        let file_id = FileRepository::new(&store)
            .create("h", "f.md", "/f.md", None, None, None)
            .expect("file should be created");
        (store, file_id)
    }

    #[test]
    fn given_inserted_chunk_when_counting_rows_then_chunk_fts_and_vector_rows_match() {
        let (store, file_id) = store_with_file();
        let repo = ChunkRepository::new(&store);
        let chunk_id = repo
            .insert(file_id, "f_intro", "hello world", &embedding())
            .expect("insert should succeed");

        let chunk_count: i64 = store
            .with_cursor(|c| Ok(c.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?))
            .unwrap();
        let fts_count: i64 = store
            .with_cursor(|c| Ok(c.query_row("SELECT COUNT(*) FROM chunks_fts", [], |r| r.get(0))?))
            .unwrap();
        let vec_count: i64 = store
            .with_cursor(|c| {
                Ok(c.query_row(
                    "SELECT COUNT(*) FROM vec_chunks WHERE chunk_id = ?1",
                    params![chunk_id],
                    |r| r.get(0),
                )?)
            })
            .unwrap();

        assert_eq!(chunk_count, 1);
        assert_eq!(fts_count, 1);
        assert_eq!(vec_count, 1);
    }

    #[test]
    fn update_content_replaces_both_chunk_and_vector_rows() {
        let (store, file_id) = store_with_file();
        let repo = ChunkRepository::new(&store);
        let chunk_id = repo.insert(file_id, "t", "old text", &embedding()).unwrap();

        let mut new_embedding = embedding();
        new_embedding[0] = 0xFF;
        assert!(repo.update_content(chunk_id, "new text", &new_embedding).unwrap());

        let (text, vec_bytes): (String, Vec<u8>) = store
            .with_cursor(|c| {
                let text: String =
                    c.query_row("SELECT chunk_text FROM chunks WHERE id = ?1", params![chunk_id], |r| r.get(0))?;
                let vec_bytes: Vec<u8> = c.query_row(
                    "SELECT embedding FROM vec_chunks WHERE chunk_id = ?1",
                    params![chunk_id],
                    |r| r.get(0),
                )?;
                Ok((text, vec_bytes))
            })
            .unwrap();

        assert_eq!(text, "new text");
        assert_eq!(vec_bytes, new_embedding);
    }

    #[test]
    fn delete_with_vectors_removes_both_rows() {
        let (store, file_id) = store_with_file();
        let repo = ChunkRepository::new(&store);
        let chunk_id = repo.insert(file_id, "t", "text", &embedding()).unwrap();

        assert!(repo.delete_with_vectors(chunk_id).unwrap());

        let chunk_exists: Option<i64> = store
            .with_cursor(|c| {
                Ok(c.query_row("SELECT id FROM chunks WHERE id = ?1", params![chunk_id], |r| r.get(0))
                    .optional()?)
            })
            .unwrap();
        let vec_exists: Option<i64> = store
            .with_cursor(|c| {
                Ok(c.query_row(
                    "SELECT chunk_id FROM vec_chunks WHERE chunk_id = ?1",
                    params![chunk_id],
                    |r| r.get(0),
                )
                .optional()?)
            })
            .unwrap();

        assert!(chunk_exists.is_none());
        assert!(vec_exists.is_none());
    }

    #[test]
    fn batch_insert_assigns_monotonic_ids_reflecting_source_order() {
        let (store, file_id) = store_with_file();
        let repo = ChunkRepository::new(&store);
        let chunks = vec![
            NewChunk { doc_title: "a".into(), chunk_text: "1".into(), embedding: embedding() },
            NewChunk { doc_title: "b".into(), chunk_text: "2".into(), embedding: embedding() },
            NewChunk { doc_title: "c".into(), chunk_text: "3".into(), embedding: embedding() },
        ];
        let ids = repo.batch_insert(file_id, &chunks).unwrap();
        assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
    }
}
