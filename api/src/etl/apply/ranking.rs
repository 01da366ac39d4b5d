use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde_json::Value;

use crate::error::EtlError;
use crate::etl::context::JobContext;
use crate::etl::payload;
use crate::etl::service::EntityApplier;
use crate::models::catalog::NewRankSnapshot;
use crate::schema::item_rank_snapshot;

pub struct RankingApplier;

#[async_trait]
impl EntityApplier<AsyncPgConnection> for RankingApplier {
    async fn apply(
        &self,
        conn: &mut AsyncPgConnection,
        normalized: &Value,
        ctx: &JobContext,
        target: &str,
    ) -> Result<(), EtlError> {
        let genre_id: i64 = target
            .parse()
            .map_err(|_| EtlError::Payload(format!("ranking target is not a genre id: {target}")))?;

        let rows = build_rank_snapshots(normalized, genre_id, ctx.job_start_at);
        if rows.is_empty() {
            tracing::warn!(target_id = target, "ranking payload carried no usable items");
            return Ok(());
        }

        diesel::insert_into(item_rank_snapshot::table)
            .values(&rows)
            .on_conflict((
                item_rank_snapshot::rakuten_genre_id,
                item_rank_snapshot::rakuten_item_code,
                item_rank_snapshot::collected_at,
            ))
            .do_nothing()
            .execute(conn)
            .await?;
        Ok(())
    }
}

/// Flattens a ranking payload into snapshot rows. The enclosing `title` and
/// `lastBuildDate` are copied into entries that lack them; `collected_at`
/// comes from the payload's `lastBuildDate` (the job start is only a fallback
/// for unparseable dates).
pub fn build_rank_snapshots(
    normalized: &Value,
    genre_id: i64,
    fallback_collected_at: DateTime<Utc>,
) -> Vec<NewRankSnapshot> {
    let outer_title = payload::pick_str(normalized, &["title"]);
    let outer_build_date = payload::pick_str(normalized, &["lastBuildDate", "last_build_date"]);

    payload::extract_items(normalized)
        .into_iter()
        .filter_map(|item| {
            let rakuten_item_code = payload::pick_str(item, &["itemCode", "item_code"])?;
            let build_date = payload::pick_str(
                item,
                &["lastBuildDate", "last_build_date", "collectedAt", "collected_at"],
            )
            .or_else(|| outer_build_date.clone());
            let last_build_date = build_date.as_deref().and_then(parse_build_date);
            let collected_at = last_build_date.unwrap_or(fallback_collected_at);
            Some(NewRankSnapshot {
                rakuten_item_code,
                collected_at,
                rakuten_genre_id: genre_id,
                title: payload::pick_str(item, &["title"]).or_else(|| outer_title.clone()),
                last_build_date,
                rank: payload::pick_i32(item, &["rank"]),
            })
        })
        .collect()
}

/// Upstream emits `2024-06-01 10:00` style wall-clock timestamps; RFC 3339 is
/// accepted too.
pub fn parse_build_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    None
}
