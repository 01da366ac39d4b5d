use serde_json::json;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    VectorOnly,
    VectorRanked,
    VectorRankedMmr,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::VectorOnly => "vector_only",
            Algorithm::VectorRanked => "vector_ranked",
            Algorithm::VectorRankedMmr => "vector_ranked_mmr",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "vector_only" => Some(Algorithm::VectorOnly),
            "vector_ranked" => Some(Algorithm::VectorRanked),
            "vector_ranked_mmr" => Some(Algorithm::VectorRankedMmr),
            _ => None,
        }
    }
}

/// Concrete ranking parameters resolved from the user-facing mode.
#[derive(Clone, Debug)]
pub struct ResolvedParams {
    pub mode: String,
    pub algorithm: Algorithm,
    pub k: usize,
    pub w_vec: f64,
    pub w_pop: f64,
    pub w_rev: f64,
    pub mmr_lambda: f64,
    pub n_in: usize,
    pub n_out: usize,
    pub resolved_by: &'static str,
}

impl ResolvedParams {
    pub fn response_params(&self) -> serde_json::Value {
        json!({
            "k": self.k,
            "w_vec": self.w_vec,
            "w_pop": self.w_pop,
            "w_rev": self.w_rev,
            "mmr_lambda": self.mmr_lambda,
            "n_in": self.n_in,
            "n_out": self.n_out,
        })
    }
}

/// Maps a mode (and optional admin override) onto concrete parameters.
pub fn resolve_mode(mode: &str, algorithm_override: Option<&str>) -> Result<ResolvedParams, String> {
    let (algorithm, k, w_vec, w_pop, w_rev, mmr_lambda) = match mode {
        "popular" => (Algorithm::VectorRankedMmr, 120, 0.25, 0.55, 0.20, 0.85),
        "balanced" => (Algorithm::VectorRankedMmr, 120, 0.60, 0.20, 0.20, 0.55),
        "diverse" => (Algorithm::VectorRankedMmr, 220, 0.65, 0.15, 0.20, 0.25),
        other => return Err(format!("invalid mode: {other}")),
    };

    let (algorithm, resolved_by) = match algorithm_override {
        None => (algorithm, "mode"),
        Some(value) => match Algorithm::parse(value) {
            Some(parsed) => (parsed, "admin_override"),
            None => return Err(format!("invalid algorithmOverride: {value}")),
        },
    };

    Ok(ResolvedParams {
        mode: mode.to_string(),
        algorithm,
        k,
        w_vec,
        w_pop,
        w_rev,
        mmr_lambda,
        n_in: 50,
        n_out: 20,
        resolved_by,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolves_each_mode_to_its_defaults() {
        let popular = resolve_mode("popular", None).unwrap();
        assert_eq!(popular.algorithm, Algorithm::VectorRankedMmr);
        assert_eq!(popular.k, 120);
        assert_eq!(popular.w_pop, 0.55);
        assert_eq!(popular.mmr_lambda, 0.85);
        assert_eq!(popular.resolved_by, "mode");

        let balanced = resolve_mode("balanced", None).unwrap();
        assert_eq!(balanced.w_vec, 0.60);
        assert_eq!(balanced.mmr_lambda, 0.55);

        let diverse = resolve_mode("diverse", None).unwrap();
        assert_eq!(diverse.k, 220);
        assert_eq!(diverse.mmr_lambda, 0.25);

        assert_eq!(popular.n_in, 50);
        assert_eq!(popular.n_out, 20);
    }

    #[test]
    fn override_replaces_algorithm_and_marks_provenance() {
        let resolved = resolve_mode("balanced", Some("vector_only")).unwrap();
        assert_eq!(resolved.algorithm, Algorithm::VectorOnly);
        assert_eq!(resolved.resolved_by, "admin_override");
        // the numeric defaults still come from the mode
        assert_eq!(resolved.k, 120);
        assert_eq!(resolved.w_vec, 0.60);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert!(resolve_mode("random", None).is_err());
        assert!(resolve_mode("balanced", Some("bogus")).is_err());
    }
}
