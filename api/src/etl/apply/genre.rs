use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde_json::Value;

use crate::error::EtlError;
use crate::etl::context::JobContext;
use crate::etl::payload;
use crate::etl::service::EntityApplier;
use crate::models::catalog::NewGenre;
use crate::schema::genre;

pub struct GenreApplier;

#[async_trait]
impl EntityApplier<AsyncPgConnection> for GenreApplier {
    async fn apply(
        &self,
        conn: &mut AsyncPgConnection,
        normalized: &Value,
        _ctx: &JobContext,
        target: &str,
    ) -> Result<(), EtlError> {
        let written = upsert_genre(conn, normalized).await?;
        if written == 0 {
            tracing::warn!(target_id = target, "genre payload skipped: unresolvable genre chain");
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
pub struct GenreNode {
    pub genre_id: i64,
    pub name: Option<String>,
    pub level: Option<i32>,
}

fn pick_node(map: &Value) -> Option<GenreNode> {
    Some(GenreNode {
        genre_id: payload::pick_i64(map, &["genreId", "genre_id", "rakuten_genre_id"])?,
        name: payload::pick_str(map, &["genreName", "genre_name", "name"]),
        level: payload::pick_i32(map, &["genreLevel", "genre_level", "level"]),
    })
}

/// The upsert chain in root-first order, ending with the current genre.
/// `None` when the current genre or any listed parent lacks a usable
/// `genreId` — the whole apply must then be a no-op.
pub fn resolve_chain(normalized: &Value) -> Option<Vec<GenreNode>> {
    let current_map = normalized
        .get("current")
        .filter(|value| value.is_object())
        .unwrap_or(normalized);
    let current = pick_node(current_map)?;

    let mut chain = Vec::new();
    if let Some(parents) = normalized.get("parents").and_then(Value::as_array) {
        for parent in parents.iter().filter(|parent| parent.is_object()) {
            chain.push(pick_node(parent)?);
        }
    }
    chain.push(current);
    Some(chain)
}

/// Upserts the parent chain and the genre itself inside one transaction, so a
/// mid-chain failure writes nothing. Returns the number of payloads written
/// (0 for an unresolvable chain).
pub async fn upsert_genre(
    conn: &mut AsyncPgConnection,
    normalized: &Value,
) -> Result<usize, EtlError> {
    let Some(chain) = resolve_chain(normalized) else {
        return Ok(0);
    };

    conn.transaction(|conn| {
        Box::pin(async move {
            let mut parent_id: Option<i64> = None;
            for node in &chain {
                let id = diesel::insert_into(genre::table)
                    .values(NewGenre {
                        rakuten_genre_id: node.genre_id,
                        name: node.name.clone(),
                        level: node.level,
                        parent_id,
                    })
                    .on_conflict(genre::rakuten_genre_id)
                    .do_update()
                    .set((
                        genre::name.eq(excluded(genre::name)),
                        genre::level.eq(excluded(genre::level)),
                        genre::parent_id.eq(excluded(genre::parent_id)),
                        genre::updated_at.eq(Utc::now()),
                    ))
                    .returning(genre::id)
                    .get_result::<i64>(conn)
                    .await?;
                parent_id = Some(id);
            }
            Ok::<_, diesel::result::Error>(())
        })
    })
    .await?;
    Ok(1)
}
