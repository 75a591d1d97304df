use std::path::Path;

use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::sqlite_ext;

pub type SqlitePool = Pool<SqliteConnectionManager>;

const DEFAULT_POOL_SIZE: u32 = 10;
const CACHE_SIZE_KIB: i64 = -64_000; // negative => size in KiB, per SQLite PRAGMA semantics.

/// Builds the bounded connection pool described by C1: WAL journal mode,
/// foreign keys enforced, ~64 MB page cache per connection, and the
/// sqlite-vec extension loaded on every connection via the auto-extension
/// hook registered once per process.
pub fn build_pool(db_path: &Path, pool_size: Option<u32>) -> Result<SqlitePool> {
    sqlite_ext::register_auto_extension()?;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create data directory {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(|conn: &mut Connection| {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "cache_size", CACHE_SIZE_KIB)?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        Ok(())
    });

    let pool = Pool::builder()
        .max_size(pool_size.unwrap_or(DEFAULT_POOL_SIZE))
        .build(manager)
        .context("failed to build sqlite connection pool")?;

    Ok(pool)
}
