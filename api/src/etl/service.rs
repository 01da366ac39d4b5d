use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::EtlError;
use crate::models::staging::{NewStagingRecord, StagingStatus};

use super::canonicalize::canonicalize;
use super::context::JobContext;
use super::hasher::content_hash;
use super::raw_store::RawPutResult;

/// Dedupe/apply bookkeeping, implemented directly on the job's connection.
#[async_trait]
pub trait StagingLedger: Send {
    async fn get_latest_status(
        &mut self,
        source: &str,
        entity: &str,
        source_id: &str,
    ) -> Result<Option<StagingStatus>, EtlError>;

    async fn batch_upsert(&mut self, rows: &[NewStagingRecord]) -> Result<usize, EtlError>;

    async fn mark_applied(
        &mut self,
        source: &str,
        entity: &str,
        source_id: &str,
        content_hash: &str,
        applied_version: i32,
    ) -> Result<usize, EtlError>;
}

/// Canonical-JSON archive keyed by content hash.
#[async_trait]
pub trait RawObjectStore: Sync {
    fn build_key(&self, source: &str, entity: &str, source_id: &str, content_hash: &str) -> String;

    async fn put_json(
        &self,
        bucket: &str,
        s3_key: &str,
        body: &Value,
    ) -> Result<RawPutResult, EtlError>;
}

/// Translates one canonical payload into relational upserts.
#[async_trait]
pub trait EntityApplier<C: Send>: Sync {
    async fn apply(
        &self,
        conn: &mut C,
        normalized: &Value,
        ctx: &JobContext,
        target: &str,
    ) -> Result<(), EtlError>;
}

/// Identity of one entity ETL run.
pub struct EntityRun<'a> {
    pub source: &'a str,
    pub entity: &'a str,
    pub apply_version: Option<i32>,
}

#[derive(Debug, Default)]
pub struct EtlOutcome {
    pub total_targets: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub failure_rate: f64,
}

/// Runs `fetch → canonicalize → hash → dedupe → store → stage → apply` for
/// each target in order. A failed target is counted and the loop moves on;
/// there is no job-wide rollback.
pub async fn run_entity_etl<C, R, A, F, Fut>(
    conn: &mut C,
    raw_store: &R,
    bucket: &str,
    ctx: &JobContext,
    run: EntityRun<'_>,
    targets: Vec<String>,
    fetcher: F,
    applier: &A,
) -> EtlOutcome
where
    C: StagingLedger,
    R: RawObjectStore,
    A: EntityApplier<C>,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Value, EtlError>>,
{
    let total_targets = targets.len();
    let mut success_count = 0;
    let mut failure_count = 0;
    tracing::info!(
        source = run.source,
        entity = run.entity,
        total_targets,
        dry_run = ctx.dry_run,
        "etl start"
    );

    for target in targets {
        match process_target(conn, raw_store, bucket, ctx, &run, &target, &fetcher, applier).await
        {
            Ok(()) => success_count += 1,
            Err(e) => {
                failure_count += 1;
                tracing::error!(
                    error = %e,
                    target_id = %target,
                    source = run.source,
                    entity = run.entity,
                    "etl target failed"
                );
            }
        }
    }

    let failure_rate = if total_targets > 0 {
        failure_count as f64 / total_targets as f64
    } else {
        0.0
    };
    tracing::info!(
        source = run.source,
        entity = run.entity,
        success_count,
        failure_count,
        failure_rate,
        "etl done"
    );

    EtlOutcome {
        total_targets,
        success_count,
        failure_count,
        failure_rate,
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_target<C, R, A, F, Fut>(
    conn: &mut C,
    raw_store: &R,
    bucket: &str,
    ctx: &JobContext,
    run: &EntityRun<'_>,
    target: &str,
    fetcher: &F,
    applier: &A,
) -> Result<(), EtlError>
where
    C: StagingLedger,
    R: RawObjectStore,
    A: EntityApplier<C>,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Value, EtlError>>,
{
    let raw = fetcher(target.to_string()).await?;
    let normalized = canonicalize(run.entity, &raw);
    let hash = content_hash(&normalized);
    tracing::debug!(target_id = target, hash = %hash, "etl normalized");

    let status = conn.get_latest_status(run.source, run.entity, target).await?;
    if let Some(status) = status
        && status.content_hash == hash
    {
        if let Some(apply_version) = run.apply_version
            && status.applied_version != Some(apply_version)
            && !ctx.dry_run
        {
            // same content but older apply logic: re-run the applier only
            tracing::info!(target_id = target, apply_version, "etl reapply");
            applier.apply(conn, &normalized, ctx, target).await?;
            conn.mark_applied(run.source, run.entity, target, &hash, apply_version)
                .await?;
        } else {
            tracing::debug!(target_id = target, "etl skip: content unchanged");
        }
        return Ok(());
    }

    if ctx.dry_run {
        tracing::info!(target_id = target, "etl skip: dry run");
        return Ok(());
    }

    let s3_key = raw_store.build_key(run.source, run.entity, target, &hash);
    let put = raw_store.put_json(bucket, &s3_key, &normalized).await?;
    // The applier must not run before the staging upsert lands, else a crash
    // would lose the dedupe marker for an already-applied payload.
    conn.batch_upsert(&[NewStagingRecord {
        source: run.source.to_string(),
        entity: run.entity.to_string(),
        source_id: target.to_string(),
        content_hash: hash.clone(),
        s3_key: put.s3_key,
        etag: put.etag,
        saved_at: put.saved_at,
    }])
    .await?;
    applier.apply(conn, &normalized, ctx, target).await?;
    if let Some(apply_version) = run.apply_version {
        conn.mark_applied(run.source, run.entity, target, &hash, apply_version)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use chrono::Utc;
    use serde_json::json;

    use crate::config::Env;
    use crate::etl::context::build_context;

    use super::*;

    #[derive(Default)]
    struct FakeConn {
        status: Option<StagingStatus>,
        upserts: Vec<NewStagingRecord>,
        marks: Vec<(String, String, i32)>,
    }

    #[async_trait]
    impl StagingLedger for FakeConn {
        async fn get_latest_status(
            &mut self,
            _source: &str,
            _entity: &str,
            _source_id: &str,
        ) -> Result<Option<StagingStatus>, EtlError> {
            Ok(self.status.clone())
        }

        async fn batch_upsert(&mut self, rows: &[NewStagingRecord]) -> Result<usize, EtlError> {
            self.upserts.extend_from_slice(rows);
            Ok(rows.len())
        }

        async fn mark_applied(
            &mut self,
            _source: &str,
            _entity: &str,
            source_id: &str,
            content_hash: &str,
            applied_version: i32,
        ) -> Result<usize, EtlError> {
            self.marks
                .push((source_id.to_string(), content_hash.to_string(), applied_version));
            Ok(1)
        }
    }

    #[derive(Default)]
    struct FakeStore {
        puts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RawObjectStore for FakeStore {
        fn build_key(
            &self,
            source: &str,
            entity: &str,
            source_id: &str,
            content_hash: &str,
        ) -> String {
            format!("raw/source={source}/entity={entity}/source_id={source_id}/hash={content_hash}.json")
        }

        async fn put_json(
            &self,
            _bucket: &str,
            s3_key: &str,
            _body: &Value,
        ) -> Result<RawPutResult, EtlError> {
            self.puts.lock().unwrap().push(s3_key.to_string());
            Ok(RawPutResult {
                s3_key: s3_key.to_string(),
                etag: Some("etag".to_string()),
                saved_at: Utc::now(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingApplier {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EntityApplier<FakeConn> for RecordingApplier {
        async fn apply(
            &self,
            _conn: &mut FakeConn,
            _normalized: &Value,
            _ctx: &JobContext,
            target: &str,
        ) -> Result<(), EtlError> {
            self.calls.lock().unwrap().push(target.to_string());
            Ok(())
        }
    }

    fn run<'a>(apply_version: Option<i32>) -> EntityRun<'a> {
        EntityRun {
            source: "rakuten",
            entity: "item",
            apply_version,
        }
    }

    fn ctx(dry_run: bool) -> JobContext {
        build_context("JOB-X", Env::Dev, Some("run-1".to_string()), dry_run)
    }

    #[tokio::test]
    async fn writes_stage_and_apply_for_fresh_payload() {
        let mut conn = FakeConn::default();
        let store = FakeStore::default();
        let applier = RecordingApplier::default();

        let outcome = run_entity_etl(
            &mut conn,
            &store,
            "bucket",
            &ctx(false),
            run(None),
            vec!["id-1".to_string()],
            |_| async { Ok(json!({"itemCode": "id-1"})) },
            &applier,
        )
        .await;

        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.failure_count, 0);
        assert_eq!(store.puts.lock().unwrap().len(), 1);
        assert_eq!(conn.upserts.len(), 1);
        assert_eq!(conn.upserts[0].source_id, "id-1");
        assert_eq!(applier.calls.lock().unwrap().as_slice(), ["id-1"]);
    }

    #[tokio::test]
    async fn unchanged_content_skips_store_stage_and_apply() {
        let payload = json!({"itemCode": "id-1"});
        let hash = content_hash(&canonicalize("item", &payload));
        let mut conn = FakeConn {
            status: Some(StagingStatus {
                content_hash: hash,
                applied_version: None,
            }),
            ..Default::default()
        };
        let store = FakeStore::default();
        let applier = RecordingApplier::default();

        let outcome = run_entity_etl(
            &mut conn,
            &store,
            "bucket",
            &ctx(false),
            run(None),
            vec!["id-1".to_string()],
            |_| async { Ok(json!({"itemCode": "id-1"})) },
            &applier,
        )
        .await;

        assert_eq!(outcome.success_count, 1);
        assert!(store.puts.lock().unwrap().is_empty());
        assert!(conn.upserts.is_empty());
        assert!(applier.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn version_mismatch_reapplies_without_rewriting() {
        let payload = json!({"itemCode": "id-1"});
        let hash = content_hash(&canonicalize("item", &payload));
        let mut conn = FakeConn {
            status: Some(StagingStatus {
                content_hash: hash.clone(),
                applied_version: Some(1),
            }),
            ..Default::default()
        };
        let store = FakeStore::default();
        let applier = RecordingApplier::default();

        let outcome = run_entity_etl(
            &mut conn,
            &store,
            "bucket",
            &ctx(false),
            run(Some(2)),
            vec!["id-1".to_string()],
            |_| async { Ok(json!({"itemCode": "id-1"})) },
            &applier,
        )
        .await;

        assert_eq!(outcome.success_count, 1);
        assert!(store.puts.lock().unwrap().is_empty());
        assert!(conn.upserts.is_empty());
        assert_eq!(applier.calls.lock().unwrap().len(), 1);
        assert_eq!(conn.marks, vec![("id-1".to_string(), hash, 2)]);
    }

    #[tokio::test]
    async fn dry_run_counts_success_without_writes() {
        let mut conn = FakeConn::default();
        let store = FakeStore::default();
        let applier = RecordingApplier::default();

        let outcome = run_entity_etl(
            &mut conn,
            &store,
            "bucket",
            &ctx(true),
            run(None),
            vec!["id-1".to_string()],
            |_| async { Ok(json!({"itemCode": "id-1"})) },
            &applier,
        )
        .await;

        assert_eq!(outcome.success_count, 1);
        assert!(store.puts.lock().unwrap().is_empty());
        assert!(conn.upserts.is_empty());
        assert!(applier.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_failed_target_does_not_stop_the_loop() {
        let mut conn = FakeConn::default();
        let store = FakeStore::default();
        let applier = RecordingApplier::default();

        let outcome = run_entity_etl(
            &mut conn,
            &store,
            "bucket",
            &ctx(false),
            run(None),
            vec!["bad".to_string(), "good".to_string()],
            |target| async move {
                if target == "bad" {
                    Err(EtlError::RetriesExhausted(5))
                } else {
                    Ok(json!({"itemCode": target}))
                }
            },
            &applier,
        )
        .await;

        assert_eq!(outcome.total_targets, 2);
        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.failure_count, 1);
        assert_eq!(outcome.failure_rate, 0.5);
        assert_eq!(applier.calls.lock().unwrap().as_slice(), ["good"]);
    }
}
