use chrono::{DateTime, Utc};
use diesel::prelude::*;

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::shop)]
pub struct NewShop {
    pub rakuten_shop_code: String,
    pub shop_name: Option<String>,
    pub shop_url: Option<String>,
    pub shop_of_the_year_flag: Option<i32>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::item)]
pub struct NewItem {
    pub rakuten_item_code: String,
    pub item_name: Option<String>,
    pub item_url: Option<String>,
    pub affiliate_url: Option<String>,
    pub catchcopy: Option<String>,
    pub item_caption: Option<String>,
    pub image_flag: Option<i32>,
    pub rakuten_shop_code: Option<String>,
    pub rakuten_genre_id: Option<i64>,
    pub credit_card_flag: Option<i32>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::item_image)]
pub struct NewItemImage {
    pub item_id: i64,
    pub size: String,
    pub url: String,
    pub sort_order: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::item_market_snapshot)]
pub struct NewMarketSnapshot {
    pub item_id: i64,
    pub collected_at: DateTime<Utc>,
    pub item_price: Option<i64>,
    pub tax_flag: Option<i32>,
    pub postage_flag: Option<i32>,
    pub gift_flag: Option<i32>,
    pub availability: Option<i32>,
    pub asuraku_flag: Option<i32>,
    pub asuraku_closing_time: Option<String>,
    pub asuraku_area: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub point_rate: Option<i32>,
    pub point_rate_start_time: Option<String>,
    pub point_rate_end_time: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::item_review_snapshot)]
pub struct NewReviewSnapshot {
    pub item_id: i64,
    pub collected_at: DateTime<Utc>,
    pub review_count: Option<i64>,
    pub review_average: Option<f64>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::item_tag)]
pub struct NewItemTag {
    pub item_id: i64,
    pub rakuten_tag_id: i64,
}

#[derive(Insertable, Debug, PartialEq)]
#[diesel(table_name = crate::schema::item_rank_snapshot)]
pub struct NewRankSnapshot {
    pub rakuten_item_code: String,
    pub collected_at: DateTime<Utc>,
    pub rakuten_genre_id: i64,
    pub title: Option<String>,
    pub last_build_date: Option<DateTime<Utc>>,
    pub rank: Option<i32>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::genre)]
pub struct NewGenre {
    pub rakuten_genre_id: i64,
    pub name: Option<String>,
    pub level: Option<i32>,
    pub parent_id: Option<i64>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::tag_group)]
pub struct NewTagGroup {
    pub rakuten_tag_group_id: i64,
    pub name: Option<String>,
}
