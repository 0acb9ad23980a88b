//! Property-style tests for the Safe-SQL and RRF-monotonicity invariants,
//! driven by randomized string and rank generation rather than fixed
//! examples.

#[macro_use]
extern crate proptest;

use proptest::prelude::*;

use vexrag::retrieval::fusion::reciprocal_rank_fusion;
use vexrag::retrieval::ScoredPassage;
use vexrag::store::{escape_sql_literal, Passage};

/// Unescapes a SQL string literal produced by doubling single quotes,
/// the inverse of [`escape_sql_literal`]'s quoting rule.
fn unescape_sql_literal(escaped: &str) -> String {
    escaped.replace("''", "'")
}

proptest! {
    /// §8 property 6: sanitizing `s` then embedding it in `'<s>'` yields a
    /// literal whose value, once unescaped, is `s` again. Covers arbitrary
    /// strings, including ones already containing single quotes.
    #[test]
    fn escaped_literal_round_trips_to_original(s in ".*") {
        let escaped = escape_sql_literal(&s);
        let literal = format!("'{escaped}'");
        let inner = &literal[1..literal.len() - 1];
        prop_assert_eq!(unescape_sql_literal(inner), s);
    }

    /// A value with no single quotes should pass through unchanged, since
    /// there is nothing to double.
    #[test]
    fn quote_free_values_are_untouched(s in "[a-zA-Z0-9_ ./-]*") {
        prop_assert_eq!(escape_sql_literal(&s), s);
    }
}

fn passage_with_ranks(id: &str, vector_rank: Option<usize>, bm25_rank: Option<usize>) -> ScoredPassage {
    let mut scored = ScoredPassage::new(
        Passage::new("proj", format!("{id}.md"), 0, "content", "hash", "2026-01-01T00:00:00Z"),
        1.0,
    );
    scored.vector_rank = vector_rank;
    scored.bm25_rank = bm25_rank;
    scored
}

proptest! {
    /// §8 property 9: fusing two documents that appear in the same lists,
    /// where one's rank is never worse than the other's in either list,
    /// never produces a lower fused score for it than for the other.
    #[test]
    fn rrf_score_is_monotonic_in_ranks(
        d1_vector in 1usize..20,
        d1_bm25 in 1usize..20,
        gap_vector in 0usize..20,
        gap_bm25 in 0usize..20,
    ) {
        // d2's ranks are never better than d1's in either list.
        let d2_vector = d1_vector + gap_vector;
        let d2_bm25 = d1_bm25 + gap_bm25;

        let vector = vec![
            passage_with_ranks("d1", Some(d1_vector), None),
            passage_with_ranks("d2", Some(d2_vector), None),
        ];
        let bm25 = vec![
            passage_with_ranks("d1", None, Some(d1_bm25)),
            passage_with_ranks("d2", None, Some(d2_bm25)),
        ];

        let fused = reciprocal_rank_fusion(&vector, &bm25, 10);
        let d1 = fused.iter().find(|p| p.passage.chunk_id == passage_with_ranks("d1", None, None).passage.chunk_id).unwrap();
        let d2 = fused.iter().find(|p| p.passage.chunk_id == passage_with_ranks("d2", None, None).passage.chunk_id).unwrap();

        prop_assert!(d1.rrf_score.unwrap() >= d2.rrf_score.unwrap());
    }
}
