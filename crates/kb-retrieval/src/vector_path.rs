use kb_core::Result;
use kb_embedding::EmbeddingClient;
use kb_store::Store;
use rusqlite::types::Value;

use crate::RetrievalConfig;

#[derive(Debug, Clone)]
pub struct ScoredTitle {
    pub doc_title: String,
    pub score: f64,
}

/// Vector recall path (§4.7 step 3, "Vector path"): embeds the query via
/// C4, ranks by `vec_distance_cosine`, and rescales the 0-2 cosine
/// distance to a 0-1 similarity (`1 - distance/2`). Ported from
/// `vector_search_node.py`.
pub async fn recall(
    store: &Store,
    embedding: &EmbeddingClient,
    query: &str,
    file_ids: &[i64],
    config: &RetrievalConfig,
) -> Result<Vec<ScoredTitle>> {
    let query_embedding = embedding.embed_query(query).await?;

    store.with_cursor(|conn| {
        let mut sql = "SELECT c.doc_title, 1 - (vec_distance_cosine(v.embedding, ?) / 2) AS similarity \
             FROM vec_chunks v JOIN chunks c ON v.chunk_id = c.id"
            .to_string();
        let mut params: Vec<Value> = vec![Value::Blob(query_embedding.clone())];
        if !file_ids.is_empty() {
            let placeholders = file_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            sql.push_str(&format!(" WHERE c.file_id IN ({placeholders})"));
            params.extend(file_ids.iter().map(|id| Value::Integer(*id)));
        }
        sql.push_str(" ORDER BY vec_distance_cosine(v.embedding, ?) LIMIT ?");
        params.push(Value::Blob(query_embedding.clone()));
        params.push(Value::Integer(config.vector_top_k as i64));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(ScoredTitle { doc_title: row.get(0)?, score: row.get(1)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })
}
