use diesel::prelude::*;
use diesel::sql_types::{Array, BigInt, Double, Int4, Integer, Nullable, Timestamptz};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::EtlError;

use super::context::{JobContext, today_start_utc};
use super::{BuildSummary, UpsertOutcome};

pub const FEATURES_VERSION: i32 = 1;

#[derive(QueryableByName, Debug)]
pub struct FeatureSourceRow {
    #[diesel(sql_type = BigInt)]
    pub item_id: i64,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub price_yen: Option<i64>,
    #[diesel(sql_type = Nullable<Integer>)]
    pub point_rate: Option<i32>,
    #[diesel(sql_type = Nullable<Integer>)]
    pub availability: Option<i32>,
    #[diesel(sql_type = Nullable<Double>)]
    pub review_average: Option<f64>,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub review_count: Option<i64>,
    #[diesel(sql_type = Nullable<Integer>)]
    pub rank: Option<i32>,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub rakuten_genre_id: Option<i64>,
    #[diesel(sql_type = Nullable<Array<BigInt>>)]
    pub tag_ids: Option<Vec<i64>>,
}

/// Active items with feature activity since `since`, from the feature view.
pub async fn fetch_feature_rows(
    conn: &mut AsyncPgConnection,
    since: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<FeatureSourceRow>, EtlError> {
    let rows = diesel::sql_query(
        "select item_id, item_price as price_yen, point_rate, availability, \
         review_average, review_count, rank, rakuten_genre_id, \
         rakuten_tag_ids as tag_ids \
         from apl.item_feature_view \
         where is_active = true and feature_updated_at >= $1 \
         order by item_id",
    )
    .bind::<Timestamptz, _>(since)
    .load::<FeatureSourceRow>(conn)
    .await?;
    Ok(rows)
}

/// `ln(v)` for positive values; zero and negative collapse to null.
pub fn log_value(value: Option<i64>) -> Option<f64> {
    match value {
        Some(v) if v > 0 => Some((v as f64).ln()),
        _ => None,
    }
}

/// Missing review counts stay null; zero reviews score 0; otherwise
/// `clamp(avg/5, 0, 1) * ln(1 + count)`.
pub fn popularity_score(review_average: Option<f64>, review_count: Option<i64>) -> Option<f64> {
    let count = review_count?;
    if count <= 0 {
        return Some(0.0);
    }
    let quality = review_average
        .map(|avg| (avg / 5.0).clamp(0.0, 1.0))
        .unwrap_or(0.0);
    Some(quality * (count as f64).ln_1p())
}

#[derive(QueryableByName)]
struct InsertedRow {
    #[diesel(sql_type = diesel::sql_types::Bool)]
    inserted: bool,
}

/// Diff-gated upsert keyed by `item_id`; unchanged rows are no-ops.
pub async fn upsert_features(
    conn: &mut AsyncPgConnection,
    row: &FeatureSourceRow,
    price_log: Option<f64>,
    review_count_log: Option<f64>,
    popularity: Option<f64>,
) -> Result<UpsertOutcome, EtlError> {
    let result = diesel::sql_query(
        "insert into apl.item_features \
         (item_id, price_yen, price_log, point_rate, availability, \
         review_average, review_count, review_count_log, rank, \
         popularity_score, rakuten_genre_id, tag_ids, features_version, updated_at) \
         values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, now()) \
         on conflict (item_id) do update set \
         price_yen = excluded.price_yen, \
         price_log = excluded.price_log, \
         point_rate = excluded.point_rate, \
         availability = excluded.availability, \
         review_average = excluded.review_average, \
         review_count = excluded.review_count, \
         review_count_log = excluded.review_count_log, \
         rank = excluded.rank, \
         popularity_score = excluded.popularity_score, \
         rakuten_genre_id = excluded.rakuten_genre_id, \
         tag_ids = excluded.tag_ids, \
         features_version = excluded.features_version, \
         updated_at = now() \
         where \
         apl.item_features.price_yen is distinct from excluded.price_yen \
         or apl.item_features.price_log is distinct from excluded.price_log \
         or apl.item_features.point_rate is distinct from excluded.point_rate \
         or apl.item_features.availability is distinct from excluded.availability \
         or apl.item_features.review_average is distinct from excluded.review_average \
         or apl.item_features.review_count is distinct from excluded.review_count \
         or apl.item_features.review_count_log is distinct from excluded.review_count_log \
         or apl.item_features.rank is distinct from excluded.rank \
         or apl.item_features.popularity_score is distinct from excluded.popularity_score \
         or apl.item_features.rakuten_genre_id is distinct from excluded.rakuten_genre_id \
         or apl.item_features.tag_ids is distinct from excluded.tag_ids \
         or apl.item_features.features_version is distinct from excluded.features_version \
         returning (xmax = 0) as inserted",
    )
    .bind::<BigInt, _>(row.item_id)
    .bind::<Nullable<BigInt>, _>(row.price_yen)
    .bind::<Nullable<Double>, _>(price_log)
    .bind::<Nullable<Int4>, _>(row.point_rate)
    .bind::<Nullable<Int4>, _>(row.availability)
    .bind::<Nullable<Double>, _>(row.review_average)
    .bind::<Nullable<BigInt>, _>(row.review_count)
    .bind::<Nullable<Double>, _>(review_count_log)
    .bind::<Nullable<Int4>, _>(row.rank)
    .bind::<Nullable<Double>, _>(popularity)
    .bind::<Nullable<BigInt>, _>(row.rakuten_genre_id)
    .bind::<Array<BigInt>, _>(row.tag_ids.clone().unwrap_or_default())
    .bind::<Int4, _>(FEATURES_VERSION)
    .get_result::<InsertedRow>(conn)
    .await
    .optional()?;

    Ok(match result {
        None => UpsertOutcome::Skipped,
        Some(row) if row.inserted => UpsertOutcome::Inserted,
        Some(_) => UpsertOutcome::Updated,
    })
}

/// Derives numeric features for every active item touched today.
pub async fn run_features_build(
    conn: &mut AsyncPgConnection,
    ctx: &JobContext,
) -> Result<BuildSummary, EtlError> {
    let since = today_start_utc(ctx.job_start_at);
    let rows = fetch_feature_rows(conn, since).await?;

    let mut summary = BuildSummary {
        total_targets: rows.len(),
        ..Default::default()
    };

    for row in &rows {
        let price_log = log_value(row.price_yen);
        let review_count_log = log_value(row.review_count);
        let popularity = popularity_score(row.review_average, row.review_count);

        if ctx.dry_run {
            summary.skipped_no_diff += 1;
            continue;
        }

        match upsert_features(conn, row, price_log, review_count_log, popularity).await {
            Ok(outcome) => summary.record(outcome),
            Err(e) => {
                summary.failure_count += 1;
                tracing::error!(error = %e, item_id = row.item_id, "item features build failed");
            }
        }
    }

    tracing::info!(
        total_targets = summary.total_targets,
        upsert_inserted = summary.upsert_inserted,
        upsert_updated = summary.upsert_updated,
        skipped_no_diff = summary.skipped_no_diff,
        failure_count = summary.failure_count,
        failure_rate = summary.failure_rate(),
        "item features build summary"
    );
    Ok(summary)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn log_value_requires_a_positive_input() {
        assert_eq!(log_value(None), None);
        assert_eq!(log_value(Some(0)), None);
        assert_eq!(log_value(Some(-5)), None);
        assert!((log_value(Some(1)).unwrap()).abs() < 1e-12);
        assert!((log_value(Some(100)).unwrap() - 100f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn popularity_distinguishes_missing_from_zero() {
        assert_eq!(popularity_score(Some(4.0), None), None);
        assert_eq!(popularity_score(Some(4.0), Some(0)), Some(0.0));
        assert_eq!(popularity_score(Some(4.0), Some(-1)), Some(0.0));
    }

    #[test]
    fn popularity_blends_quality_and_volume() {
        let score = popularity_score(Some(5.0), Some(99)).unwrap();
        assert!((score - 100f64.ln()).abs() < 1e-12);

        // null average counts as zero quality
        assert_eq!(popularity_score(None, Some(50)), Some(0.0));
    }

    #[test]
    fn quality_is_clamped_to_unit_range() {
        let above = popularity_score(Some(7.5), Some(10)).unwrap();
        let at_max = popularity_score(Some(5.0), Some(10)).unwrap();
        assert_eq!(above, at_max);

        let below = popularity_score(Some(-3.0), Some(10)).unwrap();
        assert_eq!(below, 0.0);
    }
}
