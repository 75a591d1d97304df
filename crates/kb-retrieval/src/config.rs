/// Hybrid retrieval tuning knobs (§4.7), defaults ported verbatim from
/// `examples/original_source/retrieval/config.py`.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalConfig {
    pub exact_top_k: usize,
    pub exact_weight: f64,
    pub bm25_top_k: usize,
    pub bm25_weight: f64,
    pub vector_top_k: usize,
    pub vector_weight: f64,
    pub rrf_k: u32,
    pub final_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            exact_top_k: 10,
            exact_weight: 0.4,
            bm25_top_k: 10,
            bm25_weight: 0.3,
            vector_top_k: 10,
            vector_weight: 0.3,
            rrf_k: 60,
            final_top_k: 20,
        }
    }
}
