use std::collections::HashSet;

use super::scoring::ScoredCandidate;

/// `|A ∩ B| / |A ∪ B|`; 0 when either side is empty.
pub fn jaccard(a: &[i64], b: &[i64]) -> f64 {
    let set_a: HashSet<i64> = a.iter().copied().collect();
    let set_b: HashSet<i64> = b.iter().copied().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    if intersection == 0 {
        return 0.0;
    }
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Greedy Maximal Marginal Relevance over tag-set similarity: pick the top
/// scorer, then repeatedly the candidate maximizing
/// `lambda * score - (1 - lambda) * max_sim` against the selection so far.
pub fn mmr_select(candidates: Vec<ScoredCandidate>, top_n: usize, lambda: f64) -> Vec<ScoredCandidate> {
    if candidates.is_empty() {
        return candidates;
    }

    let mut ranked = candidates;
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    if top_n >= ranked.len() {
        return ranked;
    }

    let mut remaining = ranked;
    let mut selected = Vec::with_capacity(top_n);
    selected.push(remaining.remove(0));

    while selected.len() < top_n && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (idx, entry) in remaining.iter().enumerate() {
            let max_sim = selected
                .iter()
                .map(|s| jaccard(&entry.candidate.tag_ids, &s.candidate.tag_ids))
                .fold(0.0, f64::max);
            let mmr = lambda * entry.score - (1.0 - lambda) * max_sim;
            if mmr > best_score {
                best_score = mmr;
                best_idx = idx;
            }
        }
        selected.push(remaining.remove(best_idx));
    }

    selected
}

#[cfg(test)]
mod test {
    use crate::recommendation::scoring::Candidate;

    use super::*;

    fn scored(item_id: i64, score: f64, tag_ids: Vec<i64>) -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate {
                item_id,
                item_name: None,
                item_url: None,
                affiliate_url: None,
                price_yen: None,
                rank: None,
                popularity_score: None,
                review_average: None,
                review_count: None,
                tag_ids,
                vector_score: score,
            },
            score,
            s_vec: score,
            s_pop: 0.0,
            s_rev: 0.0,
        }
    }

    #[test]
    fn jaccard_edge_cases() {
        assert_eq!(jaccard(&[], &[]), 0.0);
        assert_eq!(jaccard(&[1], &[]), 0.0);
        assert_eq!(jaccard(&[1, 2], &[3, 4]), 0.0);
        assert_eq!(jaccard(&[1, 2], &[1, 2]), 1.0);
        assert_eq!(jaccard(&[1, 2], &[2, 3]), 1.0 / 3.0);
    }

    #[test]
    fn suppresses_the_duplicate_tag_set() {
        let pool = vec![
            scored(1, 0.9, vec![1, 2]),
            scored(2, 0.85, vec![1, 2]),
            scored(3, 0.8, vec![3, 4]),
        ];

        let picked = mmr_select(pool, 2, 0.5);

        let ids: Vec<i64> = picked.iter().map(|s| s.candidate.item_id).collect();
        assert_eq!(ids, vec![1, 3], "overlapping runner-up should be displaced");
    }

    #[test]
    fn lambda_one_degenerates_to_score_order() {
        let pool = vec![
            scored(1, 0.3, vec![1]),
            scored(2, 0.9, vec![1]),
            scored(3, 0.6, vec![1]),
            scored(4, 0.5, vec![1]),
        ];

        let picked = mmr_select(pool, 3, 1.0);

        let ids: Vec<i64> = picked.iter().map(|s| s.candidate.item_id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn short_pools_come_back_whole_and_sorted() {
        let pool = vec![scored(1, 0.2, vec![]), scored(2, 0.9, vec![])];
        let picked = mmr_select(pool, 10, 0.5);
        let ids: Vec<i64> = picked.iter().map(|s| s.candidate.item_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn missing_tags_are_treated_as_empty_sets() {
        let pool = vec![
            scored(1, 0.9, vec![]),
            scored(2, 0.8, vec![]),
            scored(3, 0.7, vec![]),
        ];
        let picked = mmr_select(pool, 2, 0.0);
        // with no tag overlap anywhere, pure diversity keeps score order
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].candidate.item_id, 1);
    }
}
