use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Nullable, Text};
use diesel::upsert::excluded;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde_json::Value;

use crate::error::EtlError;
use crate::etl::context::JobContext;
use crate::etl::payload;
use crate::etl::service::EntityApplier;
use crate::models::catalog::NewTagGroup;
use crate::schema::tag_group;

pub struct TagApplier;

#[async_trait]
impl EntityApplier<AsyncPgConnection> for TagApplier {
    async fn apply(
        &self,
        conn: &mut AsyncPgConnection,
        normalized: &Value,
        _ctx: &JobContext,
        target: &str,
    ) -> Result<(), EtlError> {
        upsert_tag_group(conn, normalized).await?;
        let upserted = upsert_tags(conn, normalized).await?;
        tracing::debug!(target_id = target, upserted, "tag payload applied");
        Ok(())
    }
}

/// The group container: `tagGroups[*].tagGroup`, a single `tagGroup`, or the
/// payload itself when it carries the group fields directly.
pub fn pick_tag_group(normalized: &Value) -> Option<&Value> {
    if let Some(groups) = normalized.get("tagGroups").and_then(Value::as_array)
        && let Some(first) = groups.iter().find(|group| group.is_object())
    {
        return match first.get("tagGroup") {
            Some(inner) if inner.is_object() => Some(inner),
            _ => Some(first),
        };
    }
    for key in ["tagGroup", "tag_group"] {
        if let Some(group) = normalized.get(key).filter(|value| value.is_object()) {
            return Some(group);
        }
    }
    payload::pick(normalized, &["tagGroupId", "tag_group_id"]).map(|_| normalized)
}

pub async fn upsert_tag_group(
    conn: &mut AsyncPgConnection,
    normalized: &Value,
) -> Result<Option<i64>, EtlError> {
    let Some(group) = pick_tag_group(normalized) else {
        return Ok(None);
    };
    let Some(group_id) =
        payload::pick_i64(group, &["tagGroupId", "tag_group_id", "rakuten_tag_group_id"])
    else {
        return Ok(None);
    };

    let id = diesel::insert_into(tag_group::table)
        .values(NewTagGroup {
            rakuten_tag_group_id: group_id,
            name: payload::pick_str(group, &["tagGroupName", "tag_group_name", "name"]),
        })
        .on_conflict(tag_group::rakuten_tag_group_id)
        .do_update()
        .set((
            tag_group::name.eq(excluded(tag_group::name)),
            tag_group::updated_at.eq(Utc::now()),
        ))
        .returning(tag_group::id)
        .get_result::<i64>(conn)
        .await?;
    Ok(Some(id))
}

#[derive(Debug, Clone)]
pub struct TagNode {
    pub tag_id: i64,
    pub name: Option<String>,
    pub parent_tag_id: Option<i64>,
}

/// Tag arena keyed by id. Entries may be wrapped as `tags[].tag` or flat
/// maps; parent id 0 or null means root.
pub fn collect_tags(normalized: &Value) -> HashMap<i64, TagNode> {
    let entries = pick_tag_group(normalized)
        .and_then(|group| group.get("tags"))
        .and_then(Value::as_array)
        .or_else(|| normalized.get("tags").and_then(Value::as_array));
    let Some(entries) = entries else {
        return HashMap::new();
    };

    let mut tags = HashMap::new();
    for entry in entries {
        let inner = match entry.get("tag") {
            Some(wrapped) if wrapped.is_object() => wrapped,
            _ => entry,
        };
        if !inner.is_object() {
            continue;
        }
        let Some(tag_id) = payload::pick_i64(inner, &["tagId", "tag_id", "rakuten_tag_id"]) else {
            continue;
        };
        let parent_tag_id = payload::pick_i64(inner, &["parentTagId", "parent_tag_id"])
            .filter(|&parent| parent != 0);
        tags.insert(
            tag_id,
            TagNode {
                tag_id,
                name: payload::pick_str(inner, &["tagName", "tag_name", "name"]),
                parent_tag_id,
            },
        );
    }
    tags
}

/// Upsert order with parents before children. Explicit DFS state over the
/// arena: a back-edge marks the node and every ancestor on the walk as
/// unresolvable, as does a parent id absent from the arena.
pub fn plan_tag_order(tags: &HashMap<i64, TagNode>) -> Vec<i64> {
    let mut resolvable: HashMap<i64, bool> = HashMap::new();
    let mut order = Vec::new();

    let mut ids: Vec<i64> = tags.keys().copied().collect();
    ids.sort_unstable();

    for &start in &ids {
        if resolvable.contains_key(&start) {
            continue;
        }
        let mut path = Vec::new();
        let mut visiting = HashSet::new();
        let mut cursor = start;
        let outcome = loop {
            if let Some(&known) = resolvable.get(&cursor) {
                break known;
            }
            if !visiting.insert(cursor) {
                break false;
            }
            path.push(cursor);
            match tags[&cursor].parent_tag_id {
                None => break true,
                Some(parent) if !tags.contains_key(&parent) => break false,
                Some(parent) => cursor = parent,
            }
        };
        // deepest ancestor first, so parents land before children
        for &id in path.iter().rev() {
            resolvable.insert(id, outcome);
            if outcome {
                order.push(id);
            }
        }
    }
    order
}

#[derive(QueryableByName)]
struct TagRowResult {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = Bool)]
    inserted: bool,
}

/// Topologically upserts the payload's tags under their group. Returns how
/// many rows were newly inserted.
pub async fn upsert_tags(
    conn: &mut AsyncPgConnection,
    normalized: &Value,
) -> Result<usize, EtlError> {
    let Some(group) = pick_tag_group(normalized) else {
        return Ok(0);
    };
    let Some(group_id) =
        payload::pick_i64(group, &["tagGroupId", "tag_group_id", "rakuten_tag_group_id"])
    else {
        return Ok(0);
    };

    let group_row_id = tag_group::table
        .filter(tag_group::rakuten_tag_group_id.eq(group_id))
        .select(tag_group::id)
        .first::<i64>(conn)
        .await
        .optional()?;
    let Some(group_row_id) = group_row_id else {
        return Ok(0);
    };

    let tags = collect_tags(normalized);
    if tags.is_empty() {
        return Ok(0);
    }

    let mut row_ids: HashMap<i64, i64> = HashMap::new();
    let mut inserted = 0;
    for tag_id in plan_tag_order(&tags) {
        let node = &tags[&tag_id];
        let parent_row_id = node
            .parent_tag_id
            .and_then(|parent| row_ids.get(&parent).copied());
        let row = diesel::sql_query(
            "insert into apl.tag (rakuten_tag_id, name, group_id, parent_id, created_at, updated_at) \
             values ($1, $2, $3, $4, now(), now()) \
             on conflict (rakuten_tag_id) do update set \
             name = excluded.name, \
             group_id = excluded.group_id, \
             parent_id = excluded.parent_id, \
             updated_at = now() \
             returning id, (xmax = 0) as inserted",
        )
        .bind::<BigInt, _>(node.tag_id)
        .bind::<Nullable<Text>, _>(node.name.as_deref())
        .bind::<BigInt, _>(group_row_id)
        .bind::<Nullable<BigInt>, _>(parent_row_id)
        .get_result::<TagRowResult>(conn)
        .await?;
        if row.inserted {
            inserted += 1;
        }
        row_ids.insert(tag_id, row.id);
    }
    Ok(inserted)
}
