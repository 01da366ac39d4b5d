use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde_json::Value;

use crate::error::EtlError;
use crate::etl::context::JobContext;
use crate::etl::payload;
use crate::etl::service::EntityApplier;
use crate::models::catalog::{
    NewItem, NewItemImage, NewItemTag, NewMarketSnapshot, NewReviewSnapshot, NewShop,
};
use crate::schema::{item, item_image, item_market_snapshot, item_review_snapshot, item_tag, shop};

pub struct ItemApplier;

#[async_trait]
impl EntityApplier<AsyncPgConnection> for ItemApplier {
    async fn apply(
        &self,
        conn: &mut AsyncPgConnection,
        normalized: &Value,
        ctx: &JobContext,
        target: &str,
    ) -> Result<(), EtlError> {
        let Some(entry) = payload::extract_item_payload(normalized) else {
            tracing::warn!(target_id = target, "item payload carried no recognizable item entry");
            return Ok(());
        };

        if let Some(row) = new_shop(entry) {
            upsert_shop(conn, &row).await?;
        }
        let item_id = upsert_item(conn, entry).await?;
        sync_item_images(conn, item_id, entry).await?;
        insert_market_snapshot(conn, item_id, ctx.job_start_at, entry).await?;
        insert_review_snapshot(conn, item_id, ctx.job_start_at, entry).await?;
        let tag_ids = payload::extract_tag_ids(entry);
        sync_item_tags(conn, item_id, &tag_ids).await?;
        Ok(())
    }
}

fn new_shop(entry: &Value) -> Option<NewShop> {
    Some(NewShop {
        rakuten_shop_code: payload::pick_str(entry, &["shopCode"])?,
        shop_name: payload::pick_str(entry, &["shopName"]),
        shop_url: payload::pick_str(entry, &["shopUrl"]),
        shop_of_the_year_flag: payload::pick_i32(entry, &["shopOfTheYearFlag"]),
    })
}

async fn upsert_shop(conn: &mut AsyncPgConnection, row: &NewShop) -> Result<i64, EtlError> {
    let id = diesel::insert_into(shop::table)
        .values(row)
        .on_conflict(shop::rakuten_shop_code)
        .do_update()
        .set((
            shop::shop_name.eq(excluded(shop::shop_name)),
            shop::shop_url.eq(excluded(shop::shop_url)),
            shop::shop_of_the_year_flag.eq(excluded(shop::shop_of_the_year_flag)),
            shop::updated_at.eq(Utc::now()),
        ))
        .returning(shop::id)
        .get_result::<i64>(conn)
        .await?;
    Ok(id)
}

async fn upsert_item(conn: &mut AsyncPgConnection, entry: &Value) -> Result<i64, EtlError> {
    let Some(rakuten_item_code) = payload::pick_str(entry, &["itemCode"]) else {
        return Err(EtlError::Payload("item payload missing itemCode".into()));
    };
    let row = NewItem {
        rakuten_item_code,
        item_name: payload::pick_str(entry, &["itemName"]),
        item_url: payload::pick_str(entry, &["itemUrl"]),
        affiliate_url: payload::pick_str(entry, &["affiliateUrl"]),
        catchcopy: payload::pick_str(entry, &["catchcopy"]),
        item_caption: payload::pick_str(entry, &["itemCaption"]),
        image_flag: payload::pick_i32(entry, &["imageFlag"]),
        rakuten_shop_code: payload::pick_str(entry, &["shopCode"]),
        rakuten_genre_id: payload::pick_i64(entry, &["genreId"]),
        credit_card_flag: payload::pick_i32(entry, &["creditCardFlag"]),
    };

    let id = diesel::insert_into(item::table)
        .values(&row)
        .on_conflict(item::rakuten_item_code)
        .do_update()
        .set((
            item::item_name.eq(excluded(item::item_name)),
            item::item_url.eq(excluded(item::item_url)),
            item::affiliate_url.eq(excluded(item::affiliate_url)),
            item::catchcopy.eq(excluded(item::catchcopy)),
            item::item_caption.eq(excluded(item::item_caption)),
            item::image_flag.eq(excluded(item::image_flag)),
            item::rakuten_shop_code.eq(excluded(item::rakuten_shop_code)),
            item::rakuten_genre_id.eq(excluded(item::rakuten_genre_id)),
            item::credit_card_flag.eq(excluded(item::credit_card_flag)),
            item::updated_at.eq(Utc::now()),
        ))
        .returning(item::id)
        .get_result::<i64>(conn)
        .await?;
    Ok(id)
}

/// Image urls in payload order, numbered 1..n per size. Entries may be bare
/// strings or `{imageUrl: ...}` maps.
pub fn extract_images(entry: &Value) -> Vec<(&'static str, String, i32)> {
    let mut images = Vec::new();
    for (key, size) in [("smallImageUrls", "small"), ("mediumImageUrls", "medium")] {
        let Some(urls) = entry.get(key).and_then(Value::as_array) else {
            continue;
        };
        let mut sort_order = 1;
        for url_entry in urls {
            let url = match url_entry {
                Value::Object(map) => map.get("imageUrl").and_then(Value::as_str),
                other => other.as_str(),
            };
            if let Some(url) = url {
                images.push((size, url.to_string(), sort_order));
                sort_order += 1;
            }
        }
    }
    images
}

/// Replaces the item's image set: delete by item, reinsert small-then-medium.
pub async fn sync_item_images(
    conn: &mut AsyncPgConnection,
    item_id: i64,
    entry: &Value,
) -> Result<usize, EtlError> {
    diesel::delete(item_image::table.filter(item_image::item_id.eq(item_id)))
        .execute(conn)
        .await?;

    let rows: Vec<NewItemImage> = extract_images(entry)
        .into_iter()
        .map(|(size, url, sort_order)| NewItemImage {
            item_id,
            size: size.to_string(),
            url,
            sort_order,
        })
        .collect();
    if rows.is_empty() {
        return Ok(0);
    }
    let affected = diesel::insert_into(item_image::table)
        .values(&rows)
        .execute(conn)
        .await?;
    Ok(affected)
}

async fn insert_market_snapshot(
    conn: &mut AsyncPgConnection,
    item_id: i64,
    collected_at: DateTime<Utc>,
    entry: &Value,
) -> Result<usize, EtlError> {
    let row = NewMarketSnapshot {
        item_id,
        collected_at,
        item_price: payload::pick_i64(entry, &["itemPrice"]),
        tax_flag: payload::pick_i32(entry, &["taxFlag"]),
        postage_flag: payload::pick_i32(entry, &["postageFlag"]),
        gift_flag: payload::pick_i32(entry, &["giftFlag"]),
        availability: payload::pick_i32(entry, &["availability"]),
        asuraku_flag: payload::pick_i32(entry, &["asurakuFlag"]),
        asuraku_closing_time: payload::pick_str(entry, &["asurakuClosingTime"]),
        asuraku_area: payload::pick_str(entry, &["asurakuArea"]),
        start_time: payload::pick_str(entry, &["startTime"]),
        end_time: payload::pick_str(entry, &["endTime"]),
        point_rate: payload::pick_i32(entry, &["pointRate"]),
        point_rate_start_time: payload::pick_str(entry, &["pointRateStartTime"]),
        point_rate_end_time: payload::pick_str(entry, &["pointRateEndTime"]),
    };
    let affected = diesel::insert_into(item_market_snapshot::table)
        .values(&row)
        .execute(conn)
        .await?;
    Ok(affected)
}

async fn insert_review_snapshot(
    conn: &mut AsyncPgConnection,
    item_id: i64,
    collected_at: DateTime<Utc>,
    entry: &Value,
) -> Result<usize, EtlError> {
    let row = NewReviewSnapshot {
        item_id,
        collected_at,
        review_count: payload::pick_i64(entry, &["reviewCount"]),
        review_average: payload::pick_f64(entry, &["reviewAverage"]),
    };
    let affected = diesel::insert_into(item_review_snapshot::table)
        .values(&row)
        .execute(conn)
        .await?;
    Ok(affected)
}

/// Resets the item↔tag relation to exactly `tag_ids`.
pub async fn sync_item_tags(
    conn: &mut AsyncPgConnection,
    item_id: i64,
    tag_ids: &[i64],
) -> Result<usize, EtlError> {
    diesel::delete(item_tag::table.filter(item_tag::item_id.eq(item_id)))
        .execute(conn)
        .await?;
    if tag_ids.is_empty() {
        return Ok(0);
    }
    let rows: Vec<NewItemTag> = tag_ids
        .iter()
        .map(|&rakuten_tag_id| NewItemTag {
            item_id,
            rakuten_tag_id,
        })
        .collect();
    let affected = diesel::insert_into(item_tag::table)
        .values(&rows)
        .on_conflict((item_tag::item_id, item_tag::rakuten_tag_id))
        .do_nothing()
        .execute(conn)
        .await?;
    Ok(affected)
}
