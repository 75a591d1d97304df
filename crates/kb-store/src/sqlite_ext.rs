use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use rusqlite::ffi::sqlite3_auto_extension;
use sqlite_vec::sqlite3_vec_init;

const SQLITE_OK: i32 = 0;

/// Registers the sqlite-vec extension as a SQLite auto-extension so every
/// connection opened afterwards (including pooled ones) picks up
/// `vec0`/`vec_distance_cosine` without an explicit per-connection load
/// step. Safe to call repeatedly; registration happens once.
pub fn register_auto_extension() -> Result<()> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();

    let result = INIT.get_or_init(|| unsafe {
        let rc = sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(format!(
                "Failed to register sqlite-vec auto extension (sqlite rc={rc})"
            ))
        }
    });

    match result {
        Ok(()) => Ok(()),
        Err(message) => Err(anyhow!(message.clone())),
    }
}
