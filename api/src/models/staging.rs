use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Latest staged content for one `(source, entity, source_id)`.
#[derive(Debug, Clone)]
pub struct StagingStatus {
    pub content_hash: String,
    pub applied_version: Option<i32>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::staging)]
pub struct NewStagingRecord {
    pub source: String,
    pub entity: String,
    pub source_id: String,
    pub content_hash: String,
    pub s3_key: String,
    pub etag: Option<String>,
    pub saved_at: DateTime<Utc>,
}
