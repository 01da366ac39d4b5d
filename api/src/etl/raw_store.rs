use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::EtlError;

use super::service::RawObjectStore;

// Process-wide client, initialized on first use. Jobs construct `RawStore`
// freely; the underlying SDK client (connection pools, credential cache) is
// shared.
static S3_CLIENT: OnceCell<aws_sdk_s3::Client> = OnceCell::const_new();

#[derive(Debug, Clone)]
pub struct RawPutResult {
    pub s3_key: String,
    pub etag: Option<String>,
    pub saved_at: DateTime<Utc>,
}

pub struct RawStore {
    region: String,
}

impl RawStore {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
        }
    }

    async fn client(&self) -> &aws_sdk_s3::Client {
        let region = self.region.clone();
        S3_CLIENT
            .get_or_init(|| async move {
                let config = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(region))
                    .load()
                    .await;
                aws_sdk_s3::Client::new(&config)
            })
            .await
    }
}

#[async_trait]
impl RawObjectStore for RawStore {
    fn build_key(&self, source: &str, entity: &str, source_id: &str, content_hash: &str) -> String {
        format!("raw/source={source}/entity={entity}/source_id={source_id}/hash={content_hash}.json")
    }

    async fn put_json(
        &self,
        bucket: &str,
        s3_key: &str,
        body: &Value,
    ) -> Result<RawPutResult, EtlError> {
        let payload = body.to_string();
        let response = self
            .client()
            .await
            .put_object()
            .bucket(bucket)
            .key(s3_key)
            .content_type("application/json")
            .body(ByteStream::from(payload.into_bytes()))
            .send()
            .await
            .map_err(|e| EtlError::RawStore(e.to_string()))?;

        Ok(RawPutResult {
            s3_key: s3_key.to_string(),
            etag: response.e_tag().map(str::to_string),
            saved_at: Utc::now(),
        })
    }
}
