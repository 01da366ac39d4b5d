use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use giftreco::config::{CatalogConfig, JobConfig, OpenAiConfig};
use giftreco::etl::jobs;

#[derive(Parser)]
#[command(name = "giftreco-etl", about = "Gift catalog batch jobs")]
struct Cli {
    #[command(subcommand)]
    job: Job,

    /// Resolve targets and compute hashes without writing anything.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Override the generated run id (useful when re-driving a failed run).
    #[arg(long, global = true)]
    run_id: Option<String>,
}

#[derive(Subcommand)]
enum Job {
    /// JOB-R-01: ranking snapshots for enabled genres
    Ranking,
    /// JOB-I-01: item details for today's ranked items
    Items,
    /// JOB-G-01: genre trees for today's items
    Genres,
    /// JOB-T-01: tag groups for today's items
    Tags,
    /// Claim-based genre backlog worker (multi-worker safe)
    GenreBacklog {
        #[arg(long, default_value_t = 20)]
        batch_size: i64,
    },
    /// JOB-F-01: derived item features
    Features,
    /// JOB-E-01: embedding source texts
    EmbeddingSource,
    /// JOB-E-02: embedding vectors
    EmbeddingBuild,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let run_id = cli.run_id.clone();
    let dry_run = cli.dry_run;

    // Per-target failures are counted inside the job loops; only a failure
    // before the loop begins (config, connection) exits nonzero.
    let result = match cli.job {
        Job::Ranking => jobs::run_ranking_job(&CatalogConfig::new_from_env(), run_id, dry_run)
            .await
            .map(|_| ()),
        Job::Items => jobs::run_item_job(&CatalogConfig::new_from_env(), run_id, dry_run)
            .await
            .map(|_| ()),
        Job::Genres => jobs::run_genre_job(&CatalogConfig::new_from_env(), run_id, dry_run)
            .await
            .map(|_| ()),
        Job::Tags => jobs::run_tag_job(&CatalogConfig::new_from_env(), run_id, dry_run)
            .await
            .map(|_| ()),
        Job::GenreBacklog { batch_size } => {
            jobs::run_genre_backlog_job(&CatalogConfig::new_from_env(), batch_size, run_id, dry_run)
                .await
                .map(|_| ())
        }
        Job::Features => jobs::run_features_job(&JobConfig::new_from_env(), run_id, dry_run)
            .await
            .map(|_| ()),
        Job::EmbeddingSource => {
            jobs::run_embedding_source_job(&JobConfig::new_from_env(), run_id, dry_run)
                .await
                .map(|_| ())
        }
        Job::EmbeddingBuild => jobs::run_embedding_build_job(
            &JobConfig::new_from_env(),
            &OpenAiConfig::new_from_env(),
            run_id,
            dry_run,
        )
        .await
        .map(|_| ()),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "job failed before the target loop");
        std::process::exit(1);
    }
}
