use kb_core::Result;
use kb_store::Store;
use rusqlite::types::Value;

use crate::title_path::escape_fts_phrase;
use crate::RetrievalConfig;

#[derive(Debug, Clone)]
pub struct ScoredTitle {
    pub doc_title: String,
    pub score: f64,
}

/// Body recall path (§4.7 step 3, "Body BM25 path"): OR-joins all tokens
/// against the FTS5 body index, scored by negated `bm25()` so larger is
/// better. Ported from `bm25_search_node.py`.
pub fn recall(store: &Store, tokens: &[String], file_ids: &[i64], config: &RetrievalConfig) -> Result<Vec<ScoredTitle>> {
    let query_str = tokens
        .iter()
        .map(|t| format!("\"{}\"", escape_fts_phrase(t)))
        .collect::<Vec<_>>()
        .join(" OR ");

    store.with_cursor(|conn| {
        let mut sql = "SELECT DISTINCT c.doc_title, -bm25(chunks_fts) AS score FROM chunks_fts \
             JOIN chunks c ON chunks_fts.rowid = c.id WHERE chunks_fts MATCH ?"
            .to_string();
        let mut params: Vec<Value> = vec![Value::Text(query_str)];
        if !file_ids.is_empty() {
            let placeholders = file_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            sql.push_str(&format!(" AND c.file_id IN ({placeholders})"));
            params.extend(file_ids.iter().map(|id| Value::Integer(*id)));
        }
        sql.push_str(" ORDER BY score DESC LIMIT ?");
        params.push(Value::Integer(config.bm25_top_k as i64));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(ScoredTitle { doc_title: row.get(0)?, score: row.get(1)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })
}
