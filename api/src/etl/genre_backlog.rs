use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::EtlError;
use crate::schema::genre_fetch_queue;
use crate::upstream::rakuten::RakutenClient;

use super::apply::genre::upsert_genre;
use super::canonicalize::canonicalize;
use super::context::JobContext;

#[derive(QueryableByName, Debug)]
pub struct ClaimedGenre {
    #[diesel(sql_type = BigInt)]
    pub queue_id: i64,
    #[diesel(sql_type = BigInt)]
    pub rakuten_genre_id: i64,
}

#[derive(Debug, Default)]
pub struct BacklogSummary {
    pub claimed: usize,
    pub done: usize,
    pub failed: usize,
}

/// Claims up to `batch_size` queued rows and advances them to `in_progress`.
/// `SKIP LOCKED` keeps concurrent workers off each other's claims.
pub async fn claim_batch(
    conn: &mut AsyncPgConnection,
    batch_size: i64,
) -> Result<Vec<ClaimedGenre>, EtlError> {
    let rows = diesel::sql_query(
        "update apl.genre_fetch_queue q \
         set status = 'in_progress', claimed_at = now(), updated_at = now() \
         where q.id in ( \
             select id from apl.genre_fetch_queue \
             where status = 'queued' \
             order by id \
             for update skip locked \
             limit $1 \
         ) \
         returning q.id as queue_id, q.rakuten_genre_id",
    )
    .bind::<BigInt, _>(batch_size)
    .load::<ClaimedGenre>(conn)
    .await?;
    Ok(rows)
}

async fn mark(conn: &mut AsyncPgConnection, queue_id: i64, status: &str) -> Result<(), EtlError> {
    diesel::update(genre_fetch_queue::table.filter(genre_fetch_queue::id.eq(queue_id)))
        .set((
            genre_fetch_queue::status.eq(status),
            genre_fetch_queue::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// Drains the genre backlog: claim a batch, fetch and apply each genre, mark
/// the row done or failed. Safe to run from several workers at once.
pub async fn run_genre_backlog(
    conn: &mut AsyncPgConnection,
    ctx: &JobContext,
    client: &RakutenClient,
    batch_size: i64,
) -> Result<BacklogSummary, EtlError> {
    let mut summary = BacklogSummary::default();
    if ctx.dry_run {
        tracing::info!("dry run: leaving the genre backlog untouched");
        return Ok(summary);
    }

    loop {
        let claims = claim_batch(conn, batch_size).await?;
        if claims.is_empty() {
            break;
        }
        summary.claimed += claims.len();

        for claim in claims {
            let result = match client.fetch_genre(claim.rakuten_genre_id).await {
                Ok(raw) => {
                    let normalized = canonicalize("genre", &raw);
                    upsert_genre(conn, &normalized).await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(_) => {
                    mark(conn, claim.queue_id, "done").await?;
                    summary.done += 1;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        genre_id = claim.rakuten_genre_id,
                        "genre backlog fetch failed"
                    );
                    mark(conn, claim.queue_id, "failed").await?;
                    summary.failed += 1;
                }
            }
        }
    }

    tracing::info!(
        claimed = summary.claimed,
        done = summary.done,
        failed = summary.failed,
        "genre backlog drained"
    );
    Ok(summary)
}
