use super::mode::ResolvedParams;

/// One active item joined with its embedding similarity.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub item_id: i64,
    pub item_name: Option<String>,
    pub item_url: Option<String>,
    pub affiliate_url: Option<String>,
    pub price_yen: Option<i64>,
    pub rank: Option<i32>,
    pub popularity_score: Option<f64>,
    pub review_average: Option<f64>,
    pub review_count: Option<i64>,
    pub tag_ids: Vec<i64>,
    pub vector_score: f64,
}

#[derive(Clone, Debug)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
    pub s_vec: f64,
    pub s_pop: f64,
    pub s_rev: f64,
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

// Min-max to [0,1]; a flat component maps everything to 0.
fn normalize_0_1(values: &[f64]) -> Vec<f64> {
    let Some(first) = values.first() else {
        return Vec::new();
    };
    let (min, max) = values.iter().fold((*first, *first), |(min, max), &v| {
        (min.min(v), max.max(v))
    });
    if max == min {
        return vec![0.0; values.len()];
    }
    values.iter().map(|&v| (v - min) / (max - min)).collect()
}

/// Normalizes the vector/popularity/review components over the candidate set
/// and blends them with the resolved weights.
pub fn score_candidates(candidates: Vec<Candidate>, params: &ResolvedParams) -> Vec<ScoredCandidate> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let max_review_count = candidates
        .iter()
        .map(|c| c.review_count.unwrap_or(0) as f64)
        .fold(0.0, f64::max);

    let vec_raw: Vec<f64> = candidates.iter().map(|c| c.vector_score).collect();
    let pop_raw: Vec<f64> = candidates
        .iter()
        .map(|c| match c.popularity_score {
            Some(score) => score,
            // missing is not zero: fall back to the rank signal
            None => match c.rank {
                Some(rank) => 1.0 / (rank as f64 + 1.0),
                None => 0.0,
            },
        })
        .collect();
    let rev_raw: Vec<f64> = candidates
        .iter()
        .map(|c| {
            let quality = (c.review_average.unwrap_or(0.0) / 5.0).clamp(0.0, 1.0);
            let count = c.review_count.unwrap_or(0) as f64;
            let confidence = if max_review_count > 0.0 {
                count.ln_1p() / max_review_count.ln_1p()
            } else {
                0.0
            };
            quality * confidence
        })
        .collect();

    let vec_norm = normalize_0_1(&vec_raw);
    let pop_norm = normalize_0_1(&pop_raw);
    let rev_norm = normalize_0_1(&rev_raw);

    candidates
        .into_iter()
        .enumerate()
        .map(|(i, candidate)| {
            let (s_vec, s_pop, s_rev) = (vec_norm[i], pop_norm[i], rev_norm[i]);
            ScoredCandidate {
                candidate,
                score: params.w_vec * s_vec + params.w_pop * s_pop + params.w_rev * s_rev,
                s_vec,
                s_pop,
                s_rev,
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use crate::recommendation::mode::resolve_mode;

    use super::*;

    fn candidate(
        item_id: i64,
        vector_score: f64,
        popularity_score: Option<f64>,
        review_average: Option<f64>,
        review_count: Option<i64>,
    ) -> Candidate {
        Candidate {
            item_id,
            item_name: None,
            item_url: None,
            affiliate_url: None,
            price_yen: None,
            rank: None,
            popularity_score,
            review_average,
            review_count,
            tag_ids: Vec::new(),
            vector_score,
        }
    }

    fn blend_pool() -> Vec<Candidate> {
        vec![
            candidate(1, 0.9, Some(10.0), Some(5.0), Some(100)),
            candidate(2, 0.5, Some(20.0), Some(3.0), Some(50)),
            candidate(3, 0.1, Some(5.0), Some(4.0), Some(10)),
        ]
    }

    #[test]
    fn balanced_weights_favor_the_vector_leader() {
        let params = resolve_mode("balanced", None).unwrap();
        let scored = score_candidates(blend_pool(), &params);
        let top = scored
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .unwrap();
        assert_eq!(top.candidate.item_id, 1);
    }

    #[test]
    fn popular_weights_flip_the_leader_to_the_popularity_winner() {
        let params = resolve_mode("popular", None).unwrap();
        let scored = score_candidates(blend_pool(), &params);
        let top = scored
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .unwrap();
        assert_eq!(top.candidate.item_id, 2);
    }

    #[test]
    fn normalized_components_span_the_unit_interval() {
        let params = resolve_mode("balanced", None).unwrap();
        let scored = score_candidates(blend_pool(), &params);

        for component in [
            scored.iter().map(|s| s.s_vec).collect::<Vec<_>>(),
            scored.iter().map(|s| s.s_pop).collect::<Vec<_>>(),
            scored.iter().map(|s| s.s_rev).collect::<Vec<_>>(),
        ] {
            assert!(component.iter().all(|&v| (0.0..=1.0).contains(&v)));
            assert!(component.iter().any(|&v| v == 0.0));
            assert!(component.iter().any(|&v| v == 1.0));
        }
    }

    #[test]
    fn flat_components_collapse_to_zero() {
        let params = resolve_mode("balanced", None).unwrap();
        let pool = vec![
            candidate(1, 0.4, Some(2.0), None, None),
            candidate(2, 0.4, Some(2.0), None, None),
        ];
        let scored = score_candidates(pool, &params);
        assert!(scored.iter().all(|s| s.score == 0.0));
    }

    #[test]
    fn missing_popularity_falls_back_to_rank() {
        let params = resolve_mode("balanced", None).unwrap();
        let mut with_rank = candidate(1, 0.5, None, None, None);
        with_rank.rank = Some(0);
        let without_anything = candidate(2, 0.5, None, None, None);

        let scored = score_candidates(vec![with_rank, without_anything], &params);
        // rank 0 → raw 1.0, no signal → raw 0.0; after min-max: 1 and 0
        assert_eq!(scored[0].s_pop, 1.0);
        assert_eq!(scored[1].s_pop, 0.0);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), None);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), None);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), None);
        let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-9);
    }
}
