use diesel_async::{AsyncConnection, AsyncPgConnection};

use crate::config::{CatalogConfig, JobConfig, OpenAiConfig};
use crate::error::EtlError;
use crate::upstream::openai::EmbeddingClient;
use crate::upstream::rakuten::RakutenClient;

use super::apply::genre::GenreApplier;
use super::apply::item::ItemApplier;
use super::apply::ranking::RankingApplier;
use super::apply::tag::TagApplier;
use super::context::build_context;
use super::genre_backlog::{self, BacklogSummary};
use super::raw_store::RawStore;
use super::service::{EntityRun, EtlOutcome, run_entity_etl};
use super::{BuildSummary, embedding_build, embedding_source, features, targets};

/// JOB-R-01: ranking snapshots for every enabled genre.
pub async fn run_ranking_job(
    config: &CatalogConfig,
    run_id: Option<String>,
    dry_run: bool,
) -> Result<EtlOutcome, EtlError> {
    let ctx = build_context("JOB-R-01", config.job.env, run_id, dry_run);
    let mut conn = AsyncPgConnection::establish(&config.job.database_url).await?;
    let client = rakuten_client(config);
    let raw_store = RawStore::new(&config.aws_region);

    let targets: Vec<String> = targets::targets_ranking_genre_ids(&mut conn)
        .await?
        .into_iter()
        .map(|id| id.to_string())
        .collect();

    let fetcher = |target: String| {
        let client = &client;
        async move {
            let genre_id = parse_id(&target)?;
            client.fetch_ranking(genre_id).await
        }
    };

    Ok(run_entity_etl(
        &mut conn,
        &raw_store,
        &config.s3_bucket_raw,
        &ctx,
        EntityRun {
            source: "rakuten",
            entity: "ranking",
            apply_version: None,
        },
        targets,
        fetcher,
        &RankingApplier,
    )
    .await)
}

/// JOB-I-01: item details for every item ranked today.
pub async fn run_item_job(
    config: &CatalogConfig,
    run_id: Option<String>,
    dry_run: bool,
) -> Result<EtlOutcome, EtlError> {
    let ctx = build_context("JOB-I-01", config.job.env, run_id, dry_run);
    let mut conn = AsyncPgConnection::establish(&config.job.database_url).await?;
    let client = rakuten_client(config);
    let raw_store = RawStore::new(&config.aws_region);

    let targets = targets::targets_item_codes(&mut conn, &ctx).await?;
    tracing::info!(count = targets.len(), "item targets from ranking");

    let fetcher = |target: String| {
        let client = &client;
        async move { client.fetch_item(&target).await }
    };

    Ok(run_entity_etl(
        &mut conn,
        &raw_store,
        &config.s3_bucket_raw,
        &ctx,
        EntityRun {
            source: "rakuten",
            entity: "item",
            apply_version: None,
        },
        targets,
        fetcher,
        &ItemApplier,
    )
    .await)
}

/// JOB-G-01: genre trees for genres referenced by today's items.
pub async fn run_genre_job(
    config: &CatalogConfig,
    run_id: Option<String>,
    dry_run: bool,
) -> Result<EtlOutcome, EtlError> {
    let ctx = build_context("JOB-G-01", config.job.env, run_id, dry_run);
    let mut conn = AsyncPgConnection::establish(&config.job.database_url).await?;
    let client = rakuten_client(config);
    let raw_store = RawStore::new(&config.aws_region);

    let targets: Vec<String> = targets::targets_genre_ids_from_today_items(&mut conn, &ctx)
        .await?
        .into_iter()
        .map(|id| id.to_string())
        .collect();

    let fetcher = |target: String| {
        let client = &client;
        async move {
            let genre_id = parse_id(&target)?;
            client.fetch_genre(genre_id).await
        }
    };

    Ok(run_entity_etl(
        &mut conn,
        &raw_store,
        &config.s3_bucket_raw,
        &ctx,
        EntityRun {
            source: "rakuten",
            entity: "genre",
            apply_version: None,
        },
        targets,
        fetcher,
        &GenreApplier,
    )
    .await)
}

/// JOB-T-01: tag groups for tags referenced by today's items.
pub async fn run_tag_job(
    config: &CatalogConfig,
    run_id: Option<String>,
    dry_run: bool,
) -> Result<EtlOutcome, EtlError> {
    let ctx = build_context("JOB-T-01", config.job.env, run_id, dry_run);
    let mut conn = AsyncPgConnection::establish(&config.job.database_url).await?;
    let client = rakuten_client(config);
    let raw_store = RawStore::new(&config.aws_region);

    let targets: Vec<String> = targets::targets_tag_ids_from_today_items(&mut conn, &ctx)
        .await?
        .into_iter()
        .map(|id| id.to_string())
        .collect();

    let fetcher = |target: String| {
        let client = &client;
        async move {
            let tag_id = parse_id(&target)?;
            client.fetch_tag(tag_id).await
        }
    };

    Ok(run_entity_etl(
        &mut conn,
        &raw_store,
        &config.s3_bucket_raw,
        &ctx,
        EntityRun {
            source: "rakuten",
            entity: "tag",
            apply_version: None,
        },
        targets,
        fetcher,
        &TagApplier,
    )
    .await)
}

/// Claim-based genre backlog worker.
pub async fn run_genre_backlog_job(
    config: &CatalogConfig,
    batch_size: i64,
    run_id: Option<String>,
    dry_run: bool,
) -> Result<BacklogSummary, EtlError> {
    let ctx = build_context("JOB-G-02", config.job.env, run_id, dry_run);
    let mut conn = AsyncPgConnection::establish(&config.job.database_url).await?;
    let client = rakuten_client(config);
    genre_backlog::run_genre_backlog(&mut conn, &ctx, &client, batch_size).await
}

/// JOB-F-01: derived numeric features.
pub async fn run_features_job(
    config: &JobConfig,
    run_id: Option<String>,
    dry_run: bool,
) -> Result<BuildSummary, EtlError> {
    let ctx = build_context("JOB-F-01", config.env, run_id, dry_run);
    let mut conn = AsyncPgConnection::establish(&config.database_url).await?;
    features::run_features_build(&mut conn, &ctx).await
}

/// JOB-E-01: embedding source texts.
pub async fn run_embedding_source_job(
    config: &JobConfig,
    run_id: Option<String>,
    dry_run: bool,
) -> Result<BuildSummary, EtlError> {
    let ctx = build_context("JOB-E-01", config.env, run_id, dry_run);
    let mut conn = AsyncPgConnection::establish(&config.database_url).await?;
    embedding_source::run_embedding_source_build(&mut conn, &ctx).await
}

/// JOB-E-02: embedding vectors for diffed source texts.
pub async fn run_embedding_build_job(
    config: &JobConfig,
    openai: &OpenAiConfig,
    run_id: Option<String>,
    dry_run: bool,
) -> Result<BuildSummary, EtlError> {
    let ctx = build_context("JOB-E-02", config.env, run_id, dry_run);
    let mut conn = AsyncPgConnection::establish(&config.database_url).await?;
    let client = EmbeddingClient::new(openai);
    embedding_build::run_embedding_build(&mut conn, &ctx, &client).await
}

fn rakuten_client(config: &CatalogConfig) -> RakutenClient {
    RakutenClient::new(
        config.rakuten_app_id.clone(),
        config.rakuten_affiliate_id.clone(),
    )
}

fn parse_id(target: &str) -> Result<i64, EtlError> {
    target
        .parse()
        .map_err(|_| EtlError::Payload(format!("target is not a numeric id: {target}")))
}
