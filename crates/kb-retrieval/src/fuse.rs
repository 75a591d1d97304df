use std::collections::HashMap;

use crate::RetrievalConfig;

/// One recall path's ranked output, generic over the three path modules'
/// near-identical `ScoredTitle` types.
pub struct PathResult {
    pub name: &'static str,
    pub weight: f64,
    pub ranked_titles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub doc_title: String,
    pub rrf_score: f64,
    pub hit_paths: Vec<&'static str>,
}

/// N-way weighted Reciprocal Rank Fusion (§4.7 step 4), generalizing
/// `rrf_fusion_two_way` from `rrf_rerank_node.py` to three recall paths.
/// A candidate absent from a path contributes 0 for that path, which also
/// reproduces the original's single-path special cases without a branch.
pub fn fuse(paths: &[PathResult], rrf_k: u32) -> Vec<FusedCandidate> {
    let mut order: HashMap<String, usize> = HashMap::new();
    let mut candidates: Vec<FusedCandidate> = Vec::new();

    for path in paths {
        for (rank0, doc_title) in path.ranked_titles.iter().enumerate() {
            let rank = rank0 + 1;
            let contribution = path.weight / (rrf_k as f64 + rank as f64);

            let index = *order.entry(doc_title.clone()).or_insert_with(|| {
                candidates.push(FusedCandidate { doc_title: doc_title.clone(), rrf_score: 0.0, hit_paths: Vec::new() });
                candidates.len() - 1
            });

            candidates[index].rrf_score += contribution;
            candidates[index].hit_paths.push(path.name);
        }
    }

    // Stable sort preserves first-seen order as the tiebreak (§4.7).
    candidates.sort_by(|a, b| b.rrf_score.partial_cmp(&a.rrf_score).unwrap_or(std::cmp::Ordering::Equal));
    candidates
}

/// Confidence normalization (§4.7 step 5): the theoretical max RRF score
/// for a single path is `weight / (k + 1)`; dividing by the sum of all
/// configured weights' single-rank-1 contribution normalizes the
/// multi-path max to 1.0, rounded to 4 decimals.
pub fn confidence(rrf_score: f64, config: &RetrievalConfig) -> f64 {
    let max_rrf = (config.exact_weight + config.bm25_weight + config.vector_weight) / (config.rrf_k as f64 + 1.0);
    if max_rrf == 0.0 {
        return 0.0;
    }
    (rrf_score / max_rrf * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_candidate_hit_by_all_three_paths_when_fused_then_it_ranks_above_single_path_hits() {
        let paths = vec![
            PathResult { name: "title", weight: 0.4, ranked_titles: vec!["a".into(), "b".into()] },
            PathResult { name: "bm25", weight: 0.3, ranked_titles: vec!["a".into(), "c".into()] },
            PathResult { name: "vector", weight: 0.3, ranked_titles: vec!["a".into()] },
        ];
        let fused = fuse(&paths, 60);
        assert_eq!(fused[0].doc_title, "a");
        assert_eq!(fused[0].hit_paths.len(), 3);
    }

    #[test]
    fn given_single_path_result_when_fused_then_score_still_reflects_that_paths_weight() {
        let paths = vec![PathResult { name: "bm25", weight: 0.3, ranked_titles: vec!["x".into()] }];
        let fused = fuse(&paths, 60);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].rrf_score - (0.3 / 61.0)).abs() < 1e-9);
    }

    #[test]
    fn given_tied_scores_when_fused_then_order_matches_first_seen_across_paths() {
        // "b" and "a" both land at rank 1 of an equal-weight path, so their
        // rrf_score ties exactly; §4.7 requires the tie to break by
        // insertion order, not the random order a `HashMap` would give.
        let paths = vec![
            PathResult { name: "title", weight: 0.3, ranked_titles: vec!["b".into()] },
            PathResult { name: "bm25", weight: 0.3, ranked_titles: vec!["a".into()] },
        ];
        for _ in 0..5 {
            let fused = fuse(&paths, 60);
            assert!((fused[0].rrf_score - fused[1].rrf_score).abs() < 1e-12);
            let titles: Vec<&str> = fused.iter().map(|c| c.doc_title.as_str()).collect();
            assert_eq!(titles, vec!["b", "a"]);
        }
    }

    #[test]
    fn confidence_of_rank_one_all_paths_hit_is_one() {
        let config = RetrievalConfig::default();
        let max_score = (config.exact_weight + config.bm25_weight + config.vector_weight) / (config.rrf_k as f64 + 1.0);
        assert_eq!(confidence(max_score, &config), 1.0);
    }
}
