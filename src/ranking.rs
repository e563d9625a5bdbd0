//! Vector ranking and Reciprocal Rank Fusion for hybrid search. The keyword
//! ranking lives in [`crate::keywords`].

use std::cmp::Ordering;
use std::collections::HashMap;

/// RRF smoothing constant.
pub const RRF_K: f64 = 60.0;

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Higher score first, then lower document index.
pub(crate) fn by_score_desc<S: PartialOrd>(a: &(usize, S), b: &(usize, S)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then(a.0.cmp(&b.0))
}

/// Rank vectors by similarity to `query`, best first.
pub fn rank_by_similarity<'a, I>(query: &[f32], vectors: I, limit: usize) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut scored: Vec<(usize, f32)> = vectors
        .into_iter()
        .enumerate()
        .map(|(i, v)| (i, cosine_similarity(query, v)))
        .collect();
    scored.sort_by(by_score_desc);
    scored.truncate(limit);
    scored
}

/// Merge ranked lists of document indices. Each appearance at rank `r`
/// (0-based) contributes `1 / (k + r + 1)`.
pub fn reciprocal_rank_fusion(rankings: &[Vec<usize>], k: f64) -> Vec<(usize, f64)> {
    let mut fused: HashMap<usize, f64> = HashMap::new();
    for ranking in rankings {
        for (rank, &doc) in ranking.iter().enumerate() {
            *fused.entry(doc).or_default() += 1.0 / (k + rank as f64 + 1.0);
        }
    }

    let mut merged: Vec<(usize, f64)> = fused.into_iter().collect();
    merged.sort_by(by_score_desc);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);

        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rank_by_similarity() {
        let vectors = [vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]];
        let ranked = rank_by_similarity(&[1.0, 0.0], vectors.iter().map(|v| v.as_slice()), 2);
        let order: Vec<usize> = ranked.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn test_rrf_rewards_agreement() {
        let vector = vec![0, 1, 2];
        let keyword = vec![2, 3];
        let fused = reciprocal_rank_fusion(&[vector, keyword], RRF_K);

        let order: Vec<usize> = fused.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![2, 0, 1, 3]);
        assert!((fused[0].1 - (1.0 / 63.0 + 1.0 / 61.0)).abs() < 1e-12);
    }

    #[test]
    fn test_rrf_ties_break_by_index() {
        let fused = reciprocal_rank_fusion(&[vec![5], vec![3]], RRF_K);
        assert_eq!(fused[0].0, 3);
        assert_eq!(fused[1].0, 5);
    }
}
