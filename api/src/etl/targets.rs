use diesel::prelude::*;
use diesel::sql_types::{Array, BigInt, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::EtlError;
use crate::schema::{item_rank_snapshot, target_genre_config};

use super::context::{JobContext, today_start_utc};
use super::staging;

/// Genre ids enabled for the ranking crawl.
pub async fn targets_ranking_genre_ids(
    conn: &mut AsyncPgConnection,
) -> Result<Vec<i64>, EtlError> {
    let ids = target_genre_config::table
        .filter(target_genre_config::is_enabled.eq(true))
        .select(target_genre_config::rakuten_genre_id)
        .order(target_genre_config::rakuten_genre_id.asc())
        .load::<i64>(conn)
        .await?;
    Ok(ids)
}

/// Item codes ranked since today's UTC midnight.
pub async fn targets_item_codes(
    conn: &mut AsyncPgConnection,
    ctx: &JobContext,
) -> Result<Vec<String>, EtlError> {
    let since = today_start_utc(ctx.job_start_at);
    let codes = item_rank_snapshot::table
        .filter(item_rank_snapshot::collected_at.ge(since))
        .select(item_rank_snapshot::rakuten_item_code)
        .distinct()
        .order(item_rank_snapshot::rakuten_item_code.asc())
        .load::<String>(conn)
        .await?;
    Ok(codes)
}

#[derive(QueryableByName)]
struct IdRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
}

/// Genre ids of items whose staging rows advanced since the job started.
/// No item activity means nothing to fetch downstream.
pub async fn targets_genre_ids_from_today_items(
    conn: &mut AsyncPgConnection,
    ctx: &JobContext,
) -> Result<Vec<i64>, EtlError> {
    let source_ids = staging::fetch_item_source_ids_since(conn, ctx.job_start_at).await?;
    if source_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = diesel::sql_query(
        "select distinct rakuten_genre_id as id \
         from apl.item \
         where rakuten_item_code = any($1) \
         and rakuten_genre_id is not null \
         order by rakuten_genre_id",
    )
    .bind::<Array<Text>, _>(&source_ids)
    .load::<IdRow>(conn)
    .await?;
    Ok(rows.into_iter().map(|row| row.id).collect())
}

/// Tag ids of items whose staging rows advanced since the job started.
pub async fn targets_tag_ids_from_today_items(
    conn: &mut AsyncPgConnection,
    ctx: &JobContext,
) -> Result<Vec<i64>, EtlError> {
    let source_ids = staging::fetch_item_source_ids_since(conn, ctx.job_start_at).await?;
    if source_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = diesel::sql_query(
        "select distinct it.rakuten_tag_id as id \
         from apl.item_tag it \
         join apl.item i on i.id = it.item_id \
         where i.rakuten_item_code = any($1) \
         order by it.rakuten_tag_id",
    )
    .bind::<Array<Text>, _>(&source_ids)
    .load::<IdRow>(conn)
    .await?;
    Ok(rows.into_iter().map(|row| row.id).collect())
}
