use std::sync::LazyLock;

use diesel::prelude::*;
use diesel::sql_types::{Array, BigInt, Bool, Int4, Nullable, Text, Timestamptz};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::EtlError;

use super::context::{JobContext, today_start_utc};
use super::{BuildSummary, UpsertOutcome};

pub const SOURCE_VERSION: i32 = 1;

const CAPTION_LIMIT: usize = 2000;
const TAG_LIMIT: usize = 30;

// Embedding inputs under this length are almost always broken catalog rows;
// they are still written so the diff gate can settle.
const SHORT_SOURCE_WARNING_LEN: usize = 20;

static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("static html tag pattern"));
static SPACE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("static space run pattern"));

#[derive(QueryableByName, Debug)]
pub struct EmbeddingSourceView {
    #[diesel(sql_type = BigInt)]
    pub item_id: i64,
    #[diesel(sql_type = Nullable<Text>)]
    pub item_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub catchcopy: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub item_caption: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub genre_name: Option<String>,
    #[diesel(sql_type = Nullable<Array<Text>>)]
    pub tag_names: Option<Vec<String>>,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub item_price: Option<i64>,
}

pub async fn fetch_source_rows(
    conn: &mut AsyncPgConnection,
    since: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<EmbeddingSourceView>, EtlError> {
    let rows = diesel::sql_query(
        "select item_id, item_name, catchcopy, item_caption, genre_name, \
         tag_names, item_price \
         from apl.item_feature_view \
         where is_active = true and feature_updated_at >= $1 \
         order by item_id",
    )
    .bind::<Timestamptz, _>(since)
    .load::<EmbeddingSourceView>(conn)
    .await?;
    Ok(rows)
}

/// Strips HTML-like tags, unifies line endings, collapses space/tab runs per
/// line, trims each line, and drops blank lines.
pub fn normalize_text(value: &str) -> String {
    let unified = value.replace("\r\n", "\n").replace('\r', "\n");
    let stripped = HTML_TAG_RE.replace_all(&unified, "");
    stripped
        .split('\n')
        .map(|line| SPACE_RUN_RE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Labeled item text fed to the embedding model. Empty fields are omitted
/// with their label; the blank separator appears only when both the header
/// block and the detail block are nonempty.
pub fn build_source_text(row: &EmbeddingSourceView) -> String {
    let item_name = row.item_name.as_deref().map(normalize_text).unwrap_or_default();
    let catchcopy = row.catchcopy.as_deref().map(normalize_text).unwrap_or_default();
    let caption: String = row
        .item_caption
        .as_deref()
        .map(normalize_text)
        .unwrap_or_default()
        .chars()
        .take(CAPTION_LIMIT)
        .collect();
    let genre_name = row.genre_name.as_deref().map(normalize_text).unwrap_or_default();
    let tags: Vec<String> = row
        .tag_names
        .iter()
        .flatten()
        .map(|tag| normalize_text(tag))
        .filter(|tag| !tag.is_empty())
        .take(TAG_LIMIT)
        .collect();

    let mut lines = Vec::new();
    if !item_name.is_empty() {
        lines.push(format!("商品名: {item_name}"));
    }
    if !catchcopy.is_empty() {
        lines.push(format!("キャッチコピー: {catchcopy}"));
    }
    if !caption.is_empty() {
        lines.push(format!("商品説明: {caption}"));
    }

    let mut detail = Vec::new();
    if !genre_name.is_empty() {
        detail.push(format!("ジャンル: {genre_name}"));
    }
    if !tags.is_empty() {
        detail.push(format!("タグ: {}", tags.join(", ")));
    }
    if let Some(price) = row.item_price {
        detail.push(format!("価格: {price}円"));
    }

    if !lines.is_empty() && !detail.is_empty() {
        lines.push(String::new());
    }
    lines.extend(detail);
    lines.join("\n")
}

pub fn source_hash(source_text: &str) -> String {
    hex::encode(Sha256::digest(source_text.as_bytes()))
}

#[derive(QueryableByName)]
struct InsertedRow {
    #[diesel(sql_type = Bool)]
    inserted: bool,
}

/// Upsert gated by `source_hash`; an unchanged text is a no-op.
pub async fn upsert_source(
    conn: &mut AsyncPgConnection,
    item_id: i64,
    source_text: &str,
    hash: &str,
) -> Result<UpsertOutcome, EtlError> {
    let result = diesel::sql_query(
        "insert into apl.item_embedding_source \
         (item_id, source_version, source_text, source_hash, updated_at) \
         values ($1, $2, $3, $4, now()) \
         on conflict (item_id) do update set \
         source_version = excluded.source_version, \
         source_text = excluded.source_text, \
         source_hash = excluded.source_hash, \
         updated_at = now() \
         where apl.item_embedding_source.source_hash is distinct from excluded.source_hash \
         returning (xmax = 0) as inserted",
    )
    .bind::<BigInt, _>(item_id)
    .bind::<Int4, _>(SOURCE_VERSION)
    .bind::<Text, _>(source_text)
    .bind::<Text, _>(hash)
    .get_result::<InsertedRow>(conn)
    .await
    .optional()?;

    Ok(match result {
        None => UpsertOutcome::Skipped,
        Some(row) if row.inserted => UpsertOutcome::Inserted,
        Some(_) => UpsertOutcome::Updated,
    })
}

/// Rebuilds the per-item embedding source text for items touched today.
pub async fn run_embedding_source_build(
    conn: &mut AsyncPgConnection,
    ctx: &JobContext,
) -> Result<BuildSummary, EtlError> {
    let since = today_start_utc(ctx.job_start_at);
    let rows = fetch_source_rows(conn, since).await?;

    let mut summary = BuildSummary {
        total_targets: rows.len(),
        ..Default::default()
    };

    for row in &rows {
        let source_text = build_source_text(row);
        let hash = source_hash(&source_text);
        if source_text.chars().count() < SHORT_SOURCE_WARNING_LEN {
            tracing::warn!(
                item_id = row.item_id,
                length = source_text.chars().count(),
                "short source_text detected"
            );
        }
        if ctx.dry_run {
            summary.skipped_no_diff += 1;
            continue;
        }
        match upsert_source(conn, row.item_id, &source_text, &hash).await {
            Ok(outcome) => summary.record(outcome),
            Err(e) => {
                summary.failure_count += 1;
                tracing::error!(error = %e, item_id = row.item_id, "embedding source build failed");
            }
        }
    }

    tracing::info!(
        total_targets = summary.total_targets,
        upsert_inserted = summary.upsert_inserted,
        upsert_updated = summary.upsert_updated,
        skipped_no_diff = summary.skipped_no_diff,
        failure_count = summary.failure_count,
        failure_rate = summary.failure_rate(),
        "embedding source build summary"
    );
    Ok(summary)
}

#[cfg(test)]
mod test {
    use super::*;

    fn row(
        item_name: Option<&str>,
        catchcopy: Option<&str>,
        caption: Option<&str>,
        genre: Option<&str>,
        tags: Option<Vec<&str>>,
        price: Option<i64>,
    ) -> EmbeddingSourceView {
        EmbeddingSourceView {
            item_id: 1,
            item_name: item_name.map(str::to_string),
            catchcopy: catchcopy.map(str::to_string),
            item_caption: caption.map(str::to_string),
            genre_name: genre.map(str::to_string),
            tag_names: tags.map(|t| t.into_iter().map(str::to_string).collect()),
            item_price: price,
        }
    }

    #[test]
    fn normalize_strips_tags_and_collapses_whitespace() {
        let text = "<p>一行目   です</p>\r\n\r\n二行目\t\tです\r三行目";
        assert_eq!(normalize_text(text), "一行目 です\n二行目 です\n三行目");
    }

    #[test]
    fn builds_both_blocks_with_separator() {
        let row = row(
            Some("高級タオル"),
            Some("ふわふわ"),
            Some("綿100%のタオルです"),
            Some("タオル"),
            Some(vec!["ギフト", "日用品"]),
            Some(3000),
        );

        let text = build_source_text(&row);

        assert_eq!(
            text,
            "商品名: 高級タオル\nキャッチコピー: ふわふわ\n商品説明: 綿100%のタオルです\n\nジャンル: タオル\nタグ: ギフト, 日用品\n価格: 3000円"
        );
    }

    #[test]
    fn separator_is_omitted_when_a_block_is_empty() {
        let header_only = row(Some("タオル"), None, None, None, None, None);
        assert_eq!(build_source_text(&header_only), "商品名: タオル");

        let detail_only = row(None, None, None, Some("タオル"), None, Some(100));
        assert_eq!(build_source_text(&detail_only), "ジャンル: タオル\n価格: 100円");

        assert_eq!(build_source_text(&row(None, None, None, None, None, None)), "");
    }

    #[test]
    fn caption_is_trimmed_to_codepoint_limit() {
        let long = "あ".repeat(CAPTION_LIMIT + 50);
        let row = row(None, None, Some(&long), None, None, None);
        let text = build_source_text(&row);
        let caption = text.strip_prefix("商品説明: ").unwrap();
        assert_eq!(caption.chars().count(), CAPTION_LIMIT);
    }

    #[test]
    fn tags_are_capped_and_empty_tags_dropped() {
        let many: Vec<String> = (0..40).map(|i| format!("tag{i}")).collect();
        let mut tags: Vec<&str> = many.iter().map(String::as_str).collect();
        tags.insert(0, "  ");
        let row = row(None, None, None, None, Some(tags), None);

        let text = build_source_text(&row);
        let tag_line = text.lines().find(|l| l.starts_with("タグ: ")).unwrap();
        assert_eq!(tag_line.matches(',').count(), TAG_LIMIT - 1);
        assert!(tag_line.contains("tag0"));
        assert!(!tag_line.contains("tag30"));
    }

    #[test]
    fn source_hash_is_stable_hex() {
        let a = source_hash("商品名: タオル");
        let b = source_hash("商品名: タオル");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, source_hash("商品名: 別物"));
    }
}
