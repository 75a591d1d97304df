use kb_core::Result;
use kb_store::Store;
use rusqlite::types::Value;

use crate::RetrievalConfig;

#[derive(Debug, Clone)]
pub struct ScoredTitle {
    pub doc_title: String,
    pub score: f64,
}

/// Title recall path (§4.7 step 3, "Title path"): AND-of-tokens `LIKE`
/// match scored 1.0, topped up with an AND-of-tokens BM25 query
/// restricted to `doc_title` (normalized to [0,1]) when LIKE alone
/// under-fills the path's top-k. Ported from `exact_match_node.py`.
pub fn recall(store: &Store, tokens: &[String], file_ids: &[i64], config: &RetrievalConfig) -> Result<Vec<ScoredTitle>> {
    store.with_cursor(|conn| {
        let mut results = Vec::new();
        let mut seen = std::collections::HashSet::new();

        let like_conditions: Vec<String> = (0..tokens.len()).map(|_| "doc_title LIKE ? ESCAPE '\\'".to_string()).collect();
        let mut like_sql = format!(
            "SELECT DISTINCT doc_title FROM chunks WHERE {}",
            like_conditions.join(" AND ")
        );
        let mut like_params: Vec<Value> = tokens.iter().map(|t| Value::Text(format!("%{}%", escape_like(t)))).collect();
        if !file_ids.is_empty() {
            let placeholders = file_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            like_sql.push_str(&format!(" AND file_id IN ({placeholders})"));
            like_params.extend(file_ids.iter().map(|id| Value::Integer(*id)));
        }
        like_sql.push_str(" LIMIT ?");
        like_params.push(Value::Integer(config.exact_top_k as i64));

        {
            let mut stmt = conn.prepare(&like_sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(like_params.iter()), |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for doc_title in rows {
                if seen.insert(doc_title.clone()) {
                    results.push(ScoredTitle { doc_title, score: 1.0 });
                }
            }
        }

        if results.len() < config.exact_top_k {
            let query_terms = tokens
                .iter()
                .map(|t| format!("doc_title:\"{}\"", escape_fts_phrase(t)))
                .collect::<Vec<_>>()
                .join(" AND ");
            let remaining = (config.exact_top_k - results.len() + seen.len()) as i64;

            let mut bm25_sql = "SELECT DISTINCT c.doc_title, -bm25(chunks_fts) AS score FROM chunks_fts \
                 JOIN chunks c ON chunks_fts.rowid = c.id WHERE chunks_fts MATCH ?"
                .to_string();
            let mut bm25_params: Vec<Value> = vec![Value::Text(query_terms)];
            if !file_ids.is_empty() {
                let placeholders = file_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                bm25_sql.push_str(&format!(" AND c.file_id IN ({placeholders})"));
                bm25_params.extend(file_ids.iter().map(|id| Value::Integer(*id)));
            }
            bm25_sql.push_str(" ORDER BY score DESC LIMIT ?");
            bm25_params.push(Value::Integer(remaining));

            let fallback: rusqlite::Result<Vec<(String, f64)>> = (|| {
                let mut stmt = conn.prepare(&bm25_sql)?;
                let result = stmt.query_map(rusqlite::params_from_iter(bm25_params.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
                })?
                .collect();
                result
            })();

            // BM25 title top-up is best-effort: malformed FTS queries from
            // unusual tokens must not sink the whole title path.
            if let Ok(rows) = fallback {
                for (doc_title, score) in rows {
                    if seen.insert(doc_title.clone()) {
                        results.push(ScoredTitle { doc_title, score: (score / 10.0).min(1.0) });
                        if results.len() >= config.exact_top_k {
                            break;
                        }
                    }
                }
            }
        }

        Ok(results)
    })
}

pub(crate) fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub(crate) fn escape_fts_phrase(raw: &str) -> String {
    raw.replace('"', "\"\"")
}
