use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{App, error::AppError};

pub mod candidates;
pub mod mmr;
pub mod mode;
pub mod scoring;

use mode::Algorithm;
use scoring::ScoredCandidate;

pub const EMBEDDING_VERSION: i32 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    pub mode: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub budget_min: Option<i64>,
    #[serde(default)]
    pub budget_max: Option<i64>,
    #[serde(default)]
    pub features_like: Vec<String>,
    #[serde(default)]
    pub features_not_like: Vec<String>,
    #[serde(default)]
    pub features_ng: Vec<String>,
    #[serde(default)]
    pub algorithm_override: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedItem {
    pub item_id: String,
    pub rank: usize,
    pub score: f64,
    pub vector_score: f64,
    pub rerank_score: f64,
    pub reason: serde_json::Value,
    pub item_name: Option<String>,
    pub item_url: Option<String>,
    pub affiliate_url: Option<String>,
    pub price_yen: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAlgorithm {
    pub name: String,
    pub params: serde_json::Value,
    pub resolved_by: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub request_id: String,
    pub context: serde_json::Value,
    pub resolved: ResolvedAlgorithm,
    pub items: Vec<RecommendedItem>,
    pub generated_at: String,
}

pub fn route() -> Router<App> {
    Router::<App>::new().route("/recommendations", post(post_recommendations))
}

async fn post_recommendations(
    State(ctx): State<App>,
    crate::json::Json(req): crate::json::Json<RecommendationRequest>,
) -> Result<Json<RecommendationResponse>, AppError> {
    let request_id = uuid::Uuid::new_v4().to_string();

    let resolved =
        mode::resolve_mode(&req.mode, req.algorithm_override.as_deref()).map_err(AppError::BadRequest)?;

    let context_text = build_context_text(&req);
    let context_vector = ctx
        .embedder
        .embed(&context_text)
        .await
        .map_err(|e| AppError::Internal(eyre::eyre!("embedding failed: {e}")))?;

    let mut conn = ctx.diesel.get().await?;
    let feature_rows =
        candidates::load_feature_rows(&mut conn, req.budget_min, req.budget_max)
            .await
            .map_err(AppError::Database)?;
    if feature_rows.is_empty() {
        return Err(AppError::Internal(eyre::eyre!(
            "no active item features available"
        )));
    }

    let item_ids: Vec<i64> = feature_rows.iter().map(|row| row.item_id).collect();
    let embeddings = candidates::load_embeddings(&mut conn, &item_ids, &ctx.embedder.model)
        .await
        .map_err(AppError::Database)?;

    let mut pool = candidates::join_candidates(feature_rows, &embeddings, &context_vector);
    if pool.is_empty() {
        return Err(AppError::Internal(eyre::eyre!("no candidates with embeddings")));
    }

    // pre-filter to the k most similar before any score composition
    pool.sort_by(|a, b| b.vector_score.total_cmp(&a.vector_score));
    pool.truncate(resolved.k);

    let mut scored = scoring::score_candidates(pool, &resolved);
    let selected: Vec<ScoredCandidate> = match resolved.algorithm {
        Algorithm::VectorOnly => {
            scored.sort_by(|a, b| b.s_vec.total_cmp(&a.s_vec));
            scored.truncate(resolved.n_out);
            scored
        }
        Algorithm::VectorRanked => {
            scored.sort_by(|a, b| b.score.total_cmp(&a.score));
            scored.truncate(resolved.n_out);
            scored
        }
        Algorithm::VectorRankedMmr => {
            scored.sort_by(|a, b| b.score.total_cmp(&a.score));
            scored.truncate(resolved.n_in);
            mmr::mmr_select(scored, resolved.n_out, resolved.mmr_lambda)
        }
    };

    let items = selected
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            let affiliate_url = entry
                .candidate
                .affiliate_url
                .clone()
                .or_else(|| entry.candidate.item_url.clone());
            RecommendedItem {
                item_id: entry.candidate.item_id.to_string(),
                rank: idx + 1,
                score: entry.score,
                vector_score: entry.s_vec,
                rerank_score: entry.score,
                reason: json!({
                    "type": "scoring",
                    "scores": {
                        "s_vec": entry.s_vec,
                        "s_pop": entry.s_pop,
                        "s_rev": entry.s_rev,
                    }
                }),
                item_name: entry.candidate.item_name,
                item_url: entry.candidate.item_url,
                affiliate_url,
                price_yen: entry.candidate.price_yen,
            }
        })
        .collect();

    Ok(Json(RecommendationResponse {
        request_id,
        context: json!({
            "contextText": context_text,
            "contextVector": context_vector,
            "embeddingModel": ctx.embedder.model,
            "embeddingVersion": EMBEDDING_VERSION,
        }),
        resolved: ResolvedAlgorithm {
            name: resolved.algorithm.as_str().to_string(),
            params: resolved.response_params(),
            resolved_by: resolved.resolved_by.to_string(),
        },
        items,
        generated_at: Utc::now().to_rfc3339(),
    }))
}

/// Compact summary of the request, used as the embedding query. An empty
/// request still embeds something useful.
pub fn build_context_text(req: &RecommendationRequest) -> String {
    let mut parts = Vec::new();
    if let Some(event) = &req.event_id
        && !event.trim().is_empty()
    {
        parts.push(format!("event: {event}"));
    }
    if let Some(recipient) = &req.recipient_id
        && !recipient.trim().is_empty()
    {
        parts.push(format!("recipient: {recipient}"));
    }
    if req.budget_min.is_some() || req.budget_max.is_some() {
        let min = req.budget_min.map(|v| v.to_string()).unwrap_or_default();
        let max = req.budget_max.map(|v| v.to_string()).unwrap_or_default();
        parts.push(format!("budget: {min}-{max}円"));
    }
    if !req.features_like.is_empty() {
        parts.push(format!("like: {}", req.features_like.join(", ")));
    }
    if !req.features_not_like.is_empty() {
        parts.push(format!("not_like: {}", req.features_not_like.join(", ")));
    }
    if !req.features_ng.is_empty() {
        parts.push(format!("ng: {}", req.features_ng.join(", ")));
    }

    if parts.is_empty() {
        "ギフト".to_string()
    } else {
        parts.join(" / ")
    }
}
