use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::EtlError;
use crate::upstream::openai::EmbeddingClient;

use super::context::JobContext;
use super::{BuildSummary, UpsertOutcome};

#[derive(QueryableByName, Debug)]
pub struct DiffSourceRow {
    #[diesel(sql_type = BigInt)]
    pub item_id: i64,
    #[diesel(sql_type = Text)]
    pub source_text: String,
    #[diesel(sql_type = Text)]
    pub source_hash: String,
}

/// Source rows with no embedding for `model` yet, or whose text moved on
/// since the last embed.
pub async fn fetch_diff_sources(
    conn: &mut AsyncPgConnection,
    model: &str,
) -> Result<Vec<DiffSourceRow>, EtlError> {
    let rows = diesel::sql_query(
        "select s.item_id, s.source_text, s.source_hash \
         from apl.item_embedding_source s \
         left join apl.item_embedding e \
         on e.item_id = s.item_id and e.model = $1 \
         where e.item_id is null or e.source_hash is distinct from s.source_hash \
         order by s.item_id",
    )
    .bind::<Text, _>(model)
    .load::<DiffSourceRow>(conn)
    .await?;
    Ok(rows)
}

/// Compact `[v1,v2,...]` vector literal with 8 fractional digits, bound as
/// text and cast `::vector` on the way in.
pub fn format_embedding(values: &[f32]) -> String {
    let mut out = String::with_capacity(values.len() * 12 + 2);
    out.push('[');
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        out.push_str(&format!("{value:.8}"));
    }
    out.push(']');
    out
}

#[derive(QueryableByName)]
struct InsertedRow {
    #[diesel(sql_type = Bool)]
    inserted: bool,
}

/// Upsert keyed by `(item_id, model)`, gated by `source_hash`.
pub async fn upsert_embedding(
    conn: &mut AsyncPgConnection,
    item_id: i64,
    model: &str,
    embedding: &[f32],
    source_hash: &str,
) -> Result<UpsertOutcome, EtlError> {
    let result = diesel::sql_query(
        "insert into apl.item_embedding \
         (item_id, model, embedding, source_hash, updated_at) \
         values ($1, $2, $3::vector, $4, now()) \
         on conflict (item_id, model) do update set \
         embedding = excluded.embedding, \
         source_hash = excluded.source_hash, \
         updated_at = now() \
         where apl.item_embedding.source_hash is distinct from excluded.source_hash \
         returning (xmax = 0) as inserted",
    )
    .bind::<BigInt, _>(item_id)
    .bind::<Text, _>(model)
    .bind::<Text, _>(format_embedding(embedding))
    .bind::<Text, _>(source_hash)
    .get_result::<InsertedRow>(conn)
    .await
    .optional()?;

    Ok(match result {
        None => UpsertOutcome::Skipped,
        Some(row) if row.inserted => UpsertOutcome::Inserted,
        Some(_) => UpsertOutcome::Updated,
    })
}

/// Embeds every diffed source text and writes the vectors.
pub async fn run_embedding_build(
    conn: &mut AsyncPgConnection,
    ctx: &JobContext,
    client: &EmbeddingClient,
) -> Result<BuildSummary, EtlError> {
    let rows = fetch_diff_sources(conn, &client.model).await?;

    let mut summary = BuildSummary {
        total_targets: rows.len(),
        ..Default::default()
    };

    for row in &rows {
        if ctx.dry_run {
            summary.skipped_no_diff += 1;
            continue;
        }
        let outcome = async {
            let embedding = client.embed(&row.source_text).await?;
            upsert_embedding(conn, row.item_id, &client.model, &embedding, &row.source_hash).await
        }
        .await;
        match outcome {
            Ok(outcome) => summary.record(outcome),
            Err(e) => {
                summary.failure_count += 1;
                tracing::error!(error = %e, item_id = row.item_id, "embedding build failed");
            }
        }
    }

    tracing::info!(
        model = %client.model,
        total_targets = summary.total_targets,
        upsert_inserted = summary.upsert_inserted,
        upsert_updated = summary.upsert_updated,
        skipped_no_diff = summary.skipped_no_diff,
        failure_count = summary.failure_count,
        failure_rate = summary.failure_rate(),
        "embedding build summary"
    );
    Ok(summary)
}
