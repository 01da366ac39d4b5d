use reqwest::{Client, Url};
use serde_json::Value;

use crate::error::EtlError;

use super::transport::{self, RetryPolicy};

const DEFAULT_BASE_URL: &str = "https://app.rakuten.co.jp/services/api/";

/// Typed facade over the Ichiba web API. All endpoints share the same base
/// parameter set and the transport's retry ladder.
pub struct RakutenClient {
    http: Client,
    policy: RetryPolicy,
    base_url: Url,
    application_id: String,
    affiliate_id: Option<String>,
}

impl RakutenClient {
    pub fn new(application_id: String, affiliate_id: Option<String>) -> Self {
        Self {
            http: Client::new(),
            policy: RetryPolicy::default(),
            base_url: Url::parse(DEFAULT_BASE_URL).expect("static base url"),
            application_id,
            affiliate_id,
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub async fn fetch_ranking(&self, genre_id: i64) -> Result<Value, EtlError> {
        self.get(
            "IchibaItem/Ranking/20220601",
            &[("genreId", genre_id.to_string())],
        )
        .await
    }

    pub async fn fetch_item(&self, item_code: &str) -> Result<Value, EtlError> {
        self.get(
            "IchibaItem/Search/20220601",
            &[
                ("itemCode", item_code.to_string()),
                ("hits", "1".to_string()),
                ("page", "1".to_string()),
            ],
        )
        .await
    }

    pub async fn fetch_genre(&self, genre_id: i64) -> Result<Value, EtlError> {
        self.get(
            "IchibaGenre/Search/20140222",
            &[("genreId", genre_id.to_string())],
        )
        .await
    }

    pub async fn fetch_tag(&self, tag_id: i64) -> Result<Value, EtlError> {
        self.get(
            "IchibaTag/Search/20140222",
            &[("tagId", tag_id.to_string())],
        )
        .await
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value, EtlError> {
        let mut url = self.base_url.join(endpoint).expect("static endpoint path");
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("applicationId", &self.application_id);
            query.append_pair("format", "json");
            query.append_pair("formatVersion", "2");
            if let Some(affiliate_id) = &self.affiliate_id {
                query.append_pair("affiliateId", affiliate_id);
            }
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        transport::get_json(&self.http, &self.policy, url).await
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use axum::Router;
    use axum::extract::Query;
    use axum::routing::get;

    use super::*;

    async fn echo_query_server() -> Url {
        let router = Router::new().route(
            "/IchibaItem/Ranking/20220601",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                axum::Json(serde_json::json!(params))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[tokio::test]
    async fn ranking_request_carries_base_params() {
        let base = echo_query_server().await;
        let client = RakutenClient::new("app-id".to_string(), Some("aff-id".to_string()))
            .with_base_url(base);

        let echoed = client.fetch_ranking(101).await.unwrap();

        assert_eq!(echoed["applicationId"], "app-id");
        assert_eq!(echoed["format"], "json");
        assert_eq!(echoed["formatVersion"], "2");
        assert_eq!(echoed["affiliateId"], "aff-id");
        assert_eq!(echoed["genreId"], "101");
    }

    #[tokio::test]
    async fn affiliate_id_is_omitted_when_absent() {
        let base = echo_query_server().await;
        let client = RakutenClient::new("app-id".to_string(), None).with_base_url(base);

        let echoed = client.fetch_ranking(101).await.unwrap();

        assert!(echoed.get("affiliateId").is_none());
    }
}
