pub mod bm25_path;
pub mod config;
pub mod fuse;
pub mod preprocess;
pub mod stopwords;
pub mod title_path;
pub mod vector_path;

use std::collections::HashMap;

use jieba_rs::Jieba;
use kb_core::{KbError, Result};
use kb_embedding::EmbeddingClient;
use kb_repositories::FileRepository;
use kb_store::Store;
use serde::Serialize;

pub use config::RetrievalConfig;

const DEFAULT_MAX_RESULTS: usize = 20;
const MAX_RESULTS_CAP: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalStats {
    pub total_fused_results: usize,
    pub final_top_k: usize,
    pub title_recall_count: usize,
    pub bm25_recall_count: usize,
    pub vector_recall_count: usize,
    pub query: String,
    pub cleaned_query: String,
    pub tokens: Vec<String>,
    pub file_ids_filter: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutput {
    pub keywords: Vec<String>,
    pub confidence_scores: HashMap<String, f64>,
    pub title_path_hits: Vec<String>,
    pub stats: RetrievalStats,
}

/// Read-only hybrid retriever (C7): fuses title, BM25-body, and vector
/// recall via weighted RRF (§4.7). Never mutates the store.
pub struct Retriever {
    store: Store,
    embedding: EmbeddingClient,
    jieba: Jieba,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(store: Store, embedding: EmbeddingClient) -> Self {
        Self {
            store,
            embedding,
            jieba: Jieba::new(),
            config: RetrievalConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn search(&self, query: &str, filenames: &[String], max_results: Option<usize>) -> Result<RetrievalOutput> {
        let cleaned_query = preprocess::clean_whitespace(query);
        if cleaned_query.is_empty() {
            return Err(KbError::validation("query text must not be empty"));
        }

        let tokens = preprocess::tokenize_query(&self.jieba, &cleaned_query);
        if tokens.is_empty() {
            return Err(KbError::validation("no valid keywords"));
        }

        let file_ids = if filenames.is_empty() {
            Vec::new()
        } else {
            FileRepository::new(&self.store).find_ids_by_filename_substrings(filenames)?
        };

        let max_results = max_results.unwrap_or(DEFAULT_MAX_RESULTS).min(MAX_RESULTS_CAP);

        let title_results = title_path::recall(&self.store, &tokens, &file_ids, &self.config)?;
        let bm25_results = bm25_path::recall(&self.store, &tokens, &file_ids, &self.config)?;
        let vector_results = vector_path::recall(&self.store, &self.embedding, &cleaned_query, &file_ids, &self.config).await?;

        let title_titles: Vec<String> = title_results.iter().map(|r| r.doc_title.clone()).collect();
        let paths = vec![
            fuse::PathResult { name: "title", weight: self.config.exact_weight, ranked_titles: title_titles.clone() },
            fuse::PathResult {
                name: "bm25",
                weight: self.config.bm25_weight,
                ranked_titles: bm25_results.iter().map(|r| r.doc_title.clone()).collect(),
            },
            fuse::PathResult {
                name: "vector",
                weight: self.config.vector_weight,
                ranked_titles: vector_results.iter().map(|r| r.doc_title.clone()).collect(),
            },
        ];

        let fused = fuse::fuse(&paths, self.config.rrf_k);
        let final_k = self.config.final_top_k.min(max_results);
        let top = &fused[..fused.len().min(final_k)];

        let keywords: Vec<String> = top.iter().map(|c| c.doc_title.clone()).collect();
        let confidence_scores: HashMap<String, f64> = top
            .iter()
            .map(|c| (c.doc_title.clone(), fuse::confidence(c.rrf_score, &self.config)))
            .collect();

        Ok(RetrievalOutput {
            keywords,
            confidence_scores,
            title_path_hits: title_titles,
            stats: RetrievalStats {
                total_fused_results: fused.len(),
                final_top_k: final_k,
                title_recall_count: title_results.len(),
                bm25_recall_count: bm25_results.len(),
                vector_recall_count: vector_results.len(),
                query: query.to_string(),
                cleaned_query,
                tokens,
                file_ids_filter: if file_ids.is_empty() { None } else { Some(file_ids) },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::EmbeddingConfig;

    fn retriever() -> Retriever {
        let store = Store::open_in_memory(4).expect("store should open");
        let embedding = EmbeddingClient::new(EmbeddingConfig {
            base_url: "http://127.0.0.1:1".into(),
            api_key: "k".into(),
            model: "m".into(),
            vector_dim: 4,
            max_tokens: 8192,
            rpm: 6000,
        });
        Retriever::new(store, embedding)
    }

    #[tokio::test]
    async fn given_blank_query_when_searched_then_returns_validation_error() {
        let result = retriever().search("   ", &[], None).await;
        assert!(matches!(result, Err(KbError::Validation(_))));
    }

    #[tokio::test]
    async fn given_only_stopwords_when_searched_then_returns_no_valid_keywords_error() {
        let result = retriever().search("的 是 了", &[], None).await;
        assert!(matches!(result, Err(KbError::Validation(_))));
    }
}
