use std::collections::HashMap;

use diesel::prelude::*;
use diesel::sql_types::{Array, BigInt, Double, Integer, Nullable, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use super::scoring::{self, Candidate};

// Keeps each embedding select comfortably bounded, whatever the feature set
// size ends up being.
const EMBEDDING_CHUNK: usize = 100;

#[derive(QueryableByName, Debug)]
pub struct FeatureRow {
    #[diesel(sql_type = BigInt)]
    pub item_id: i64,
    #[diesel(sql_type = Nullable<Text>)]
    pub item_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub item_url: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub affiliate_url: Option<String>,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub price_yen: Option<i64>,
    #[diesel(sql_type = Nullable<Integer>)]
    pub rank: Option<i32>,
    #[diesel(sql_type = Nullable<Double>)]
    pub popularity_score: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub review_average: Option<f64>,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub review_count: Option<i64>,
    #[diesel(sql_type = Nullable<Array<BigInt>>)]
    pub tag_ids: Option<Vec<i64>>,
}

/// Feature rows of active items, optionally filtered to the budget range.
pub async fn load_feature_rows(
    conn: &mut AsyncPgConnection,
    budget_min: Option<i64>,
    budget_max: Option<i64>,
) -> Result<Vec<FeatureRow>, eyre::Error> {
    let rows = diesel::sql_query(
        "SELECT f.item_id, i.item_name, i.item_url, i.affiliate_url, f.price_yen, \
                f.rank, f.popularity_score, f.review_average, f.review_count, f.tag_ids \
         FROM apl.item_features f \
         JOIN apl.item i ON i.id = f.item_id \
         WHERE i.is_active = TRUE \
           AND ($1 IS NULL OR f.price_yen >= $1) \
           AND ($2 IS NULL OR f.price_yen <= $2)",
    )
    .bind::<Nullable<BigInt>, _>(budget_min)
    .bind::<Nullable<BigInt>, _>(budget_max)
    .load::<FeatureRow>(conn)
    .await?;
    Ok(rows)
}

#[derive(QueryableByName)]
struct EmbeddingRow {
    #[diesel(sql_type = BigInt)]
    item_id: i64,
    #[diesel(sql_type = crate::schema::PgVector)]
    embedding: pgvector::Vector,
}

/// Embeddings for `item_ids` under `model`, loaded in bounded batches.
pub async fn load_embeddings(
    conn: &mut AsyncPgConnection,
    item_ids: &[i64],
    model: &str,
) -> Result<HashMap<i64, pgvector::Vector>, eyre::Error> {
    let mut embeddings = HashMap::with_capacity(item_ids.len());
    for chunk in item_ids.chunks(EMBEDDING_CHUNK) {
        let rows = diesel::sql_query(
            "SELECT item_id, embedding FROM apl.item_embedding \
             WHERE model = $1 AND item_id = ANY($2)",
        )
        .bind::<Text, _>(model)
        .bind::<Array<BigInt>, _>(chunk)
        .load::<EmbeddingRow>(conn)
        .await?;
        for row in rows {
            embeddings.insert(row.item_id, row.embedding);
        }
    }
    Ok(embeddings)
}

/// In-memory join against the context vector. Rows without an embedding, or
/// whose dimension disagrees with the context, are dropped.
pub fn join_candidates(
    rows: Vec<FeatureRow>,
    embeddings: &HashMap<i64, pgvector::Vector>,
    context_vector: &[f32],
) -> Vec<Candidate> {
    rows.into_iter()
        .filter_map(|row| {
            let embedding = embeddings.get(&row.item_id)?;
            let vector_score = scoring::cosine_similarity(context_vector, embedding.as_slice())?;
            Some(Candidate {
                item_id: row.item_id,
                item_name: row.item_name,
                item_url: row.item_url,
                affiliate_url: row.affiliate_url,
                price_yen: row.price_yen,
                rank: row.rank,
                popularity_score: row.popularity_score,
                review_average: row.review_average,
                review_count: row.review_count,
                tag_ids: row.tag_ids.unwrap_or_default(),
                vector_score,
            })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn feature_row(item_id: i64) -> FeatureRow {
        FeatureRow {
            item_id,
            item_name: Some(format!("item {item_id}")),
            item_url: None,
            affiliate_url: None,
            price_yen: Some(1000),
            rank: None,
            popularity_score: None,
            review_average: None,
            review_count: None,
            tag_ids: None,
        }
    }

    #[test]
    fn join_drops_rows_without_embeddings_or_mismatched_dims() {
        let rows = vec![feature_row(1), feature_row(2), feature_row(3)];
        let mut embeddings = HashMap::new();
        embeddings.insert(1, pgvector::Vector::from(vec![1.0, 0.0]));
        embeddings.insert(3, pgvector::Vector::from(vec![1.0, 0.0, 0.0]));

        let joined = join_candidates(rows, &embeddings, &[1.0, 0.0]);

        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].item_id, 1);
        assert!((joined[0].vector_score - 1.0).abs() < 1e-9);
        assert!(joined[0].tag_ids.is_empty());
    }
}
