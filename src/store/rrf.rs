//! Rank fusion for the hybrid retriever.
//!
//! Dense and lexical search each produce an ordered candidate list. Fusion
//! assigns every candidate the sum of its reciprocal ranks `1/(c + rank)`
//! across the lists it appears in, then reorders by that fused score. A
//! candidate present in only one list still scores; equal scores resolve
//! by id so repeated queries produce identical orderings.

use std::collections::BTreeMap;

/// Parameters for rank fusion.
#[derive(Debug, Clone, Copy)]
pub struct RrfConfig {
    /// Dampening constant added to each rank before inversion. Larger
    /// values shrink the gap between neighboring ranks; 60 is the
    /// conventional default.
    pub c: u32,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self { c: 60 }
    }
}

impl RrfConfig {
    /// Creates a config with the given dampening constant.
    #[must_use]
    pub const fn new(c: u32) -> Self {
        Self { c }
    }
}

/// Fuses ranked candidate lists into one scored ranking.
///
/// Each list contributes `1/(c + rank)` per candidate, with ranks counted
/// from 1 at the head of the list. The result is sorted by fused score
/// descending; ties are broken by id lexicographic order.
///
/// # Arguments
///
/// * `ranked_lists` - Candidate id lists, each ordered best first.
/// * `config` - Fusion parameters.
///
/// # Returns
///
/// `(id, fused_score)` pairs, best first.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn reciprocal_rank_fusion(ranked_lists: &[&[String]], config: &RrfConfig) -> Vec<(String, f64)> {
    // Accumulate in id order so the stable sort below leaves equal
    // scores id-sorted
    let mut scores: BTreeMap<&str, f64> = BTreeMap::new();

    for list in ranked_lists {
        for (position, id) in list.iter().enumerate() {
            let rank = position as u32 + 1;
            *scores.entry(id.as_str()).or_default() += 1.0 / f64::from(config.c + rank);
        }
    }

    let mut fused: Vec<(String, f64)> = scores
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_single_list_keeps_input_order() {
        let list = ids(&["first", "second", "third"]);

        let fused = reciprocal_rank_fusion(&[&list], &RrfConfig::new(10));

        let ranking: Vec<&str> = fused.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ranking, vec!["first", "second", "third"]);
        assert!(fused[0].1 > fused[1].1 && fused[1].1 > fused[2].1);
    }

    #[test]
    fn test_candidate_in_both_lists_outranks_single_list_peers() {
        let dense = ids(&["shared", "dense-only"]);
        let lexical = ids(&["shared", "lexical-only"]);

        let fused = reciprocal_rank_fusion(&[&dense, &lexical], &RrfConfig::new(10));

        // shared: 1/11 twice; the others: 1/12 once
        assert_eq!(fused[0].0, "shared");
        assert!((fused[0].1 - 2.0 / 11.0).abs() < 1e-12);
        assert!((fused[1].1 - 1.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_disjoint_lists_tie_exactly_at_equal_ranks() {
        let dense = ids(&["bravo", "delta"]);
        let lexical = ids(&["alpha", "charlie"]);

        let fused = reciprocal_rank_fusion(&[&dense, &lexical], &RrfConfig::new(10));
        assert_eq!(fused.len(), 4);

        // Heads of the two lists score identically, as do the tails
        let score_of = |wanted: &str| {
            fused
                .iter()
                .find(|(id, _)| id == wanted)
                .map(|(_, score)| *score)
                .unwrap_or_default()
        };
        assert!((score_of("alpha") - score_of("bravo")).abs() < f64::EPSILON);
        assert!((score_of("charlie") - score_of("delta")).abs() < f64::EPSILON);
        assert!(score_of("alpha") > score_of("charlie"));
    }

    #[test]
    fn test_ties_resolve_by_id() {
        // Both candidates hold rank 1 of their own list
        let dense = ids(&["zz-late"]);
        let lexical = ids(&["aa-early"]);

        let fused = reciprocal_rank_fusion(&[&dense, &lexical], &RrfConfig::default());

        assert_eq!(fused[0].0, "aa-early");
        assert_eq!(fused[1].0, "zz-late");
    }

    #[test]
    fn test_rank_one_score_matches_formula() {
        let list = ids(&["only"]);

        // c = 9 puts the head of the list at 1/(9 + 1)
        let fused = reciprocal_rank_fusion(&[&list], &RrfConfig::new(9));
        assert!((fused[0].1 - 0.1).abs() < 1e-12);

        // Appearing at rank 1 in two lists doubles it
        let fused = reciprocal_rank_fusion(&[&list, &list], &RrfConfig::new(9));
        assert!((fused[0].1 - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_dampening_flattens_rank_gaps() {
        let list = ids(&["top", "runner-up"]);

        let sharp = reciprocal_rank_fusion(&[&list], &RrfConfig::new(1));
        let flat = reciprocal_rank_fusion(&[&list], &RrfConfig::new(200));

        let gap = |fused: &[(String, f64)]| fused[0].1 - fused[1].1;
        assert!(gap(&sharp) > gap(&flat));
    }

    #[test]
    fn test_empty_input() {
        let empty: Vec<String> = Vec::new();
        assert!(reciprocal_rank_fusion(&[&empty], &RrfConfig::default()).is_empty());
        assert!(reciprocal_rank_fusion(&[], &RrfConfig::default()).is_empty());
    }

    #[test]
    fn test_default_dampening_constant() {
        assert_eq!(RrfConfig::default().c, 60);
    }
}
