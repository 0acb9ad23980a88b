//! Reciprocal Rank Fusion of vector and lexical result lists, plus the
//! alternative weighted-score fusion (not on the default path).

use std::collections::HashMap;

use super::ScoredPassage;

/// RRF's rank-damping constant. 60 is the standard value from the
/// original Cormack/Clarke/Buttcher paper and is what most hybrid search
/// systems default to.
pub const RRF_K: f64 = 60.0;

/// Fuses `vector_results` and `bm25_results` (each assumed already ordered
/// best-first, already carrying their own `vector_rank`/`bm25_rank`) by
/// Reciprocal Rank Fusion: `score = sum(1 / (RRF_K + rank))` across
/// whichever lists a passage appears in, ranks 1-indexed. Returns a single
/// list ordered by fused score descending, truncated to `limit`, each
/// entry carrying `rrf_score` and `fusion_rank`. Ties are broken by
/// insertion order of first appearance (vector list first, then bm25).
#[must_use]
pub fn reciprocal_rank_fusion(
    vector_results: &[ScoredPassage],
    bm25_results: &[ScoredPassage],
    limit: usize,
) -> Vec<ScoredPassage> {
    let mut order: Vec<String> = Vec::new();
    let mut entries: HashMap<String, ScoredPassage> = HashMap::new();
    let mut rrf_scores: HashMap<String, f64> = HashMap::new();

    for result in vector_results {
        let id = result.passage.chunk_id.clone();
        if !entries.contains_key(&id) {
            order.push(id.clone());
            entries.insert(id.clone(), result.clone());
        }
        let rank = result.vector_rank.unwrap_or(1);
        *rrf_scores.entry(id).or_insert(0.0) += 1.0 / (RRF_K + rank as f64);
    }

    for result in bm25_results {
        let id = result.passage.chunk_id.clone();
        entries
            .entry(id.clone())
            .and_modify(|existing| existing.bm25_rank = result.bm25_rank)
            .or_insert_with(|| {
                order.push(id.clone());
                result.clone()
            });
        let rank = result.bm25_rank.unwrap_or(1);
        *rrf_scores.entry(id).or_insert(0.0) += 1.0 / (RRF_K + rank as f64);
    }

    let mut merged: Vec<ScoredPassage> = order
        .into_iter()
        .map(|id| {
            let mut scored = entries.remove(&id).expect("id was just inserted into order");
            let rrf_score = rrf_scores.remove(&id).unwrap_or(0.0);
            scored.rrf_score = Some(rrf_score);
            scored.score = rrf_score as f32;
            scored
        })
        .collect();

    merged.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    merged.truncate(limit);
    for (rank, scored) in merged.iter_mut().enumerate() {
        scored.fusion_rank = Some(rank + 1);
    }
    merged
}

/// Weight of the vector score in [`weighted_score_fusion`].
pub const VECTOR_WEIGHT: f64 = 0.7;
/// Weight of the lexical score in [`weighted_score_fusion`].
pub const LEXICAL_WEIGHT: f64 = 0.3;

/// Alternative fusion strategy: min-max normalizes each list's native
/// score independently, then combines with fixed weights
/// ([`VECTOR_WEIGHT`], [`LEXICAL_WEIGHT`]). Not used by the default
/// retrieval path (§4.11), but kept available for callers that prefer a
/// score-weighted blend over RRF's rank-only blend.
#[must_use]
pub fn weighted_score_fusion(
    vector_results: &[ScoredPassage],
    bm25_results: &[ScoredPassage],
    limit: usize,
) -> Vec<ScoredPassage> {
    let vector_norm = min_max_normalize(vector_results);
    let bm25_norm = min_max_normalize(bm25_results);

    let mut order: Vec<String> = Vec::new();
    let mut entries: HashMap<String, ScoredPassage> = HashMap::new();
    let mut weighted: HashMap<String, f64> = HashMap::new();

    for (result, norm_score) in vector_results.iter().zip(vector_norm) {
        let id = result.passage.chunk_id.clone();
        order.push(id.clone());
        entries.insert(id.clone(), result.clone());
        *weighted.entry(id).or_insert(0.0) += norm_score * VECTOR_WEIGHT;
    }

    for (result, norm_score) in bm25_results.iter().zip(bm25_norm) {
        let id = result.passage.chunk_id.clone();
        entries.entry(id.clone()).or_insert_with(|| {
            order.push(id.clone());
            result.clone()
        });
        *weighted.entry(id).or_insert(0.0) += norm_score * LEXICAL_WEIGHT;
    }

    let mut merged: Vec<ScoredPassage> = order
        .into_iter()
        .map(|id| {
            let mut scored = entries.remove(&id).expect("id was just inserted into order");
            scored.score = weighted.remove(&id).unwrap_or(0.0) as f32;
            scored
        })
        .collect();

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(limit);
    merged
}

/// Diagnostic counts over a fused result list: how many passages were
/// vector-only, bm25-only, or present in both lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionStats {
    pub vector_only: usize,
    pub bm25_only: usize,
    pub both: usize,
}

/// Computes [`FusionStats`] over an already-fused list (one carrying
/// `vector_rank`/`bm25_rank` as set by [`reciprocal_rank_fusion`]).
#[must_use]
pub fn get_fusion_stats(fused: &[ScoredPassage]) -> FusionStats {
    let mut stats = FusionStats::default();
    for passage in fused {
        match (passage.vector_rank.is_some(), passage.bm25_rank.is_some()) {
            (true, true) => stats.both += 1,
            (true, false) => stats.vector_only += 1,
            (false, true) => stats.bm25_only += 1,
            (false, false) => {}
        }
    }
    stats
}

fn min_max_normalize(results: &[ScoredPassage]) -> Vec<f64> {
    if results.is_empty() {
        return Vec::new();
    }
    let scores: Vec<f64> = results.iter().map(|r| r.score as f64).collect();
    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return scores.iter().map(|_| 1.0).collect();
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Passage;

    fn now() -> String {
        "2026-01-01T00:00:00Z".to_string()
    }

    fn passage_at(id: &str, vector_rank: Option<usize>, bm25_rank: Option<usize>) -> ScoredPassage {
        let mut scored = ScoredPassage::new(Passage::new("proj", format!("{id}.md"), 0, "content", "hash", now()), 1.0);
        scored.vector_rank = vector_rank;
        scored.bm25_rank = bm25_rank;
        scored
    }

    #[test]
    fn passage_in_both_lists_outranks_single_list_hits() {
        let vector = vec![passage_at("a", Some(1), None), passage_at("b", Some(2), None)];
        let bm25 = vec![passage_at("b", None, Some(1)), passage_at("c", None, Some(2))];

        let fused = reciprocal_rank_fusion(&vector, &bm25, 10);
        assert_eq!(fused[0].passage.chunk_id, passage_at("b", None, None).passage.chunk_id);
        assert_eq!(fused[0].fusion_rank, Some(1));
    }

    #[test]
    fn fusion_stats_count_overlap_and_exclusivity() {
        let vector = vec![passage_at("a", Some(1), None), passage_at("b", Some(2), None)];
        let bm25 = vec![passage_at("b", None, Some(1)), passage_at("c", None, Some(2))];
        let fused = reciprocal_rank_fusion(&vector, &bm25, 10);
        let stats = get_fusion_stats(&fused);
        assert_eq!(stats.both, 1);
        assert_eq!(stats.vector_only, 1);
        assert_eq!(stats.bm25_only, 1);
    }

    #[test]
    fn empty_lists_produce_empty_result() {
        let fused = reciprocal_rank_fusion(&[], &[], 10);
        assert!(fused.is_empty());
    }

    #[test]
    fn vector_only_results_are_preserved() {
        let vector = vec![passage_at("a", Some(1), None), passage_at("b", Some(2), None)];
        let fused = reciprocal_rank_fusion(&vector, &[], 10);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].passage.chunk_id, passage_at("a", None, None).passage.chunk_id);
    }

    #[test]
    fn truncates_to_limit() {
        let vector = vec![
            passage_at("a", Some(1), None),
            passage_at("b", Some(2), None),
            passage_at("c", Some(3), None),
        ];
        let fused = reciprocal_rank_fusion(&vector, &[], 2);
        assert_eq!(fused.len(), 2);
    }

    /// RRF monotonicity (§8 property 9): if a document's rank is no worse
    /// than another's in every list it appears in, its fused score is no
    /// lower.
    #[test]
    fn rrf_score_is_monotonic_in_ranks() {
        let vector = vec![passage_at("d1", Some(1), None), passage_at("d2", Some(2), None)];
        let bm25 = vec![passage_at("d1", None, Some(1)), passage_at("d2", None, Some(2))];
        let fused = reciprocal_rank_fusion(&vector, &bm25, 10);
        let d1 = fused.iter().find(|p| p.passage.chunk_id == passage_at("d1", None, None).passage.chunk_id).unwrap();
        let d2 = fused.iter().find(|p| p.passage.chunk_id == passage_at("d2", None, None).passage.chunk_id).unwrap();
        assert!(d1.rrf_score.unwrap() >= d2.rrf_score.unwrap());
    }
}
