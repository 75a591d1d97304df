pub mod pool;
pub mod schema;
pub mod sqlite_ext;

use std::path::Path;

use kb_core::{KbError, Result};
use pool::SqlitePool;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub type PooledConn = PooledConnection<SqliteConnectionManager>;

/// Owns the connection pool for the embedded database and applies schema
/// once at construction. Repositories (C2) borrow connections from here;
/// this type never holds a connection itself.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct StoreInfo {
    pub sqlite_version: String,
    pub vec_version: String,
    pub file_count: i64,
    pub chunk_count: i64,
    pub vec_count: i64,
}

impl Store {
    pub fn open(db_path: &Path, vector_dim: usize, pool_size: Option<u32>) -> Result<Self> {
        let pool = pool::build_pool(db_path, pool_size).map_err(KbError::Internal)?;
        {
            let conn = pool.get()?;
            schema::apply(&conn, vector_dim).map_err(KbError::Internal)?;
        }
        Ok(Store { pool })
    }

    /// In-memory store for tests: one connection, WAL/cache PRAGMAs are
    /// meaningless for `:memory:` so they're skipped.
    #[cfg(any(test, feature = "test-util"))]
    pub fn open_in_memory(vector_dim: usize) -> Result<Self> {
        sqlite_ext::register_auto_extension().map_err(KbError::Internal)?;
        let manager = SqliteConnectionManager::memory();
        let pool = r2d2::Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| KbError::Storage(e.to_string()))?;
        {
            let conn = pool.get()?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            schema::apply(&conn, vector_dim).map_err(KbError::Internal)?;
        }
        Ok(Store { pool })
    }

    pub fn get(&self) -> Result<PooledConn> {
        Ok(self.pool.get()?)
    }

    /// Runs `op` with a pooled connection outside any explicit
    /// transaction; for reads or statements that manage their own
    /// atomicity (e.g. a single `INSERT`).
    pub fn with_cursor<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.get()?;
        op(&conn)
    }

    /// Runs `op` inside a transaction; rolls back on error or panic unwind
    /// and returns the connection to the pool in a clean state either way.
    pub fn transaction<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.get()?;
        let tx = conn.transaction().map_err(KbError::from)?;
        let result = op(&tx)?;
        tx.commit().map_err(KbError::from)?;
        Ok(result)
    }

    pub fn info(&self) -> Result<StoreInfo> {
        self.with_cursor(|conn| {
            let sqlite_version: String =
                conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;
            let vec_version: String =
                conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
            let file_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
            let chunk_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
            let vec_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM vec_chunks", [], |row| row.get(0))?;
            Ok(StoreInfo {
                sqlite_version,
                vec_version,
                file_count,
                chunk_count,
                vec_count,
            })
        })
    }
}
