use anyhow::{Context, Result};
use rusqlite::Connection;

/// Applies the full schema, idempotently. Safe to call on every startup:
/// every statement is `IF NOT EXISTS` and triggers are named so repeated
/// `CREATE TRIGGER IF NOT EXISTS` calls are no-ops.
pub fn apply(conn: &Connection, vector_dim: usize) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_hash TEXT UNIQUE NOT NULL,
            filename TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER,
            original_file_type TEXT,
            original_file_path TEXT,
            status TEXT DEFAULT 'pending' CHECK(status IN ('pending', 'indexed', 'error', 'empty')),
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_file_hash ON files(file_hash);
        CREATE INDEX IF NOT EXISTS idx_file_status ON files(status);

        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id INTEGER NOT NULL,
            doc_title TEXT NOT NULL,
            chunk_text TEXT NOT NULL,
            embedding BLOB,
            FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_doc_title ON chunks(doc_title);
        CREATE INDEX IF NOT EXISTS idx_file_id ON chunks(file_id);

        CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
            chunk_text,
            doc_title,
            content='chunks',
            content_rowid='id',
            tokenize='unicode61'
        );

        CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
            INSERT INTO chunks_fts(rowid, chunk_text, doc_title)
            VALUES (new.id, new.chunk_text, new.doc_title);
        END;

        CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
            INSERT INTO chunks_fts(chunks_fts, rowid, chunk_text, doc_title)
            VALUES ('delete', old.id, old.chunk_text, old.doc_title);
        END;

        CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
            INSERT INTO chunks_fts(chunks_fts, rowid, chunk_text, doc_title)
            VALUES ('delete', old.id, old.chunk_text, old.doc_title);
            INSERT INTO chunks_fts(rowid, chunk_text, doc_title)
            VALUES (new.id, new.chunk_text, new.doc_title);
        END;

        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id INTEGER,
            original_filename TEXT NOT NULL,
            status TEXT DEFAULT 'pending' CHECK(status IN ('pending', 'processing', 'completed', 'failed')),
            progress INTEGER DEFAULT 0,
            payload TEXT,
            result_chunk_id INTEGER,
            error_message TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE SET NULL
        );

        CREATE INDEX IF NOT EXISTS idx_task_status ON tasks(status);
        ",
    )
    .context("failed to apply base schema")?;

    // vec0 column typing can't take a bound parameter, so the dimension is
    // interpolated; it comes from trusted config, never user input.
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(
            chunk_id INTEGER PRIMARY KEY,
            embedding float[{vector_dim}]
        );"
    ))
    .context("failed to create vec_chunks virtual table")?;

    Ok(())
}
