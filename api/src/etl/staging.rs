use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::EtlError;
use crate::models::staging::{NewStagingRecord, StagingStatus};
use crate::schema::staging;

use super::service::StagingLedger;

#[async_trait]
impl StagingLedger for AsyncPgConnection {
    async fn get_latest_status(
        &mut self,
        source: &str,
        entity: &str,
        source_id: &str,
    ) -> Result<Option<StagingStatus>, EtlError> {
        let row = staging::table
            .filter(staging::source.eq(source))
            .filter(staging::entity.eq(entity))
            .filter(staging::source_id.eq(source_id))
            .select((staging::content_hash, staging::applied_version))
            .first::<(String, Option<i32>)>(self)
            .await
            .optional()?;

        Ok(row.map(|(content_hash, applied_version)| StagingStatus {
            content_hash,
            applied_version,
        }))
    }

    async fn batch_upsert(&mut self, rows: &[NewStagingRecord]) -> Result<usize, EtlError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let affected = diesel::insert_into(staging::table)
            .values(rows)
            .on_conflict((staging::source, staging::entity, staging::source_id))
            .do_update()
            .set((
                staging::content_hash.eq(excluded(staging::content_hash)),
                staging::s3_key.eq(excluded(staging::s3_key)),
                staging::etag.eq(excluded(staging::etag)),
                staging::saved_at.eq(excluded(staging::saved_at)),
                // content changed, so any previous apply no longer covers it
                staging::applied_at.eq(None::<DateTime<Utc>>),
                staging::applied_version.eq(None::<i32>),
                staging::updated_at.eq(Utc::now()),
            ))
            .execute(self)
            .await?;
        Ok(affected)
    }

    async fn mark_applied(
        &mut self,
        source: &str,
        entity: &str,
        source_id: &str,
        content_hash: &str,
        applied_version: i32,
    ) -> Result<usize, EtlError> {
        // The hash in the predicate keeps a concurrent run from marking a
        // stale payload applied.
        let affected = diesel::update(
            staging::table
                .filter(staging::source.eq(source))
                .filter(staging::entity.eq(entity))
                .filter(staging::source_id.eq(source_id))
                .filter(staging::content_hash.eq(content_hash)),
        )
        .set((
            staging::applied_at.eq(Utc::now()),
            staging::applied_version.eq(applied_version),
            staging::updated_at.eq(Utc::now()),
        ))
        .execute(self)
        .await?;
        Ok(affected)
    }
}

/// Distinct item source ids whose staging rows advanced since `since`.
pub async fn fetch_item_source_ids_since(
    conn: &mut AsyncPgConnection,
    since: DateTime<Utc>,
) -> Result<Vec<String>, EtlError> {
    let ids = staging::table
        .filter(staging::source.eq("rakuten"))
        .filter(staging::entity.eq("item"))
        .filter(staging::saved_at.ge(since))
        .select(staging::source_id)
        .distinct()
        .order(staging::source_id.asc())
        .load::<String>(conn)
        .await?;
    Ok(ids)
}
