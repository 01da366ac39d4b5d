use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

use crate::error::EtlError;

/// Retry budget shared by every upstream client.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        }
    }
}

pub async fn get_json(client: &Client, policy: &RetryPolicy, url: Url) -> Result<Value, EtlError> {
    request_json(policy, || client.get(url.clone())).await
}

pub async fn post_json(
    client: &Client,
    policy: &RetryPolicy,
    url: Url,
    body: &Value,
    bearer: Option<&str>,
) -> Result<Value, EtlError> {
    request_json(policy, || {
        let mut request = client.post(url.clone()).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        request
    })
    .await
}

async fn request_json<F>(policy: &RetryPolicy, build: F) -> Result<Value, EtlError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    for attempt in 1..=policy.max_attempts {
        let response = match build().timeout(policy.timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, attempt, "upstream request failed, retrying");
                sleep_backoff(None, attempt, policy).await;
                continue;
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<Value>().await?);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(EtlError::UpstreamAuth(status.as_u16()));
            }
            StatusCode::TOO_MANY_REQUESTS => {}
            s if s.is_server_error() => {}
            s => return Err(EtlError::UpstreamClient(s.as_u16())),
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok());
        tracing::warn!(status = status.as_u16(), attempt, "upstream returned retryable status");
        sleep_backoff(retry_after, attempt, policy).await;
    }

    Err(EtlError::RetriesExhausted(policy.max_attempts))
}

async fn sleep_backoff(retry_after: Option<f64>, attempt: u32, policy: &RetryPolicy) {
    let delay = match retry_after {
        Some(seconds) => Duration::from_secs_f64(seconds.max(0.0)),
        None => policy.base_backoff * 2u32.saturating_pow(attempt - 1),
    };
    tokio::time::sleep(delay).await;
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use axum::Router;
    use axum::response::IntoResponse;
    use axum::routing::get;

    use super::*;

    async fn spawn(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            timeout: Duration::from_secs(2),
        }
    }

    fn url_for(addr: SocketAddr) -> Url {
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[tokio::test]
    async fn retries_on_429_then_succeeds() {
        let hits = Arc::new(AtomicU32::new(0));
        let handler_hits = hits.clone();
        let router = Router::new().route(
            "/",
            get(move || {
                let hits = handler_hits.clone();
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (
                            axum::http::StatusCode::TOO_MANY_REQUESTS,
                            [("retry-after", "0")],
                            "slow down",
                        )
                            .into_response()
                    } else {
                        axum::Json(serde_json::json!({"ok": true})).into_response()
                    }
                }
            }),
        );

        let addr = spawn(router).await;
        let body = get_json(&Client::new(), &fast_policy(), url_for(addr))
            .await
            .unwrap();

        assert_eq!(body["ok"], serde_json::json!(true));
        assert_eq!(hits.load(Ordering::SeqCst), 2, "expected exactly one retry");
    }

    #[tokio::test]
    async fn auth_errors_fail_without_retrying() {
        let hits = Arc::new(AtomicU32::new(0));
        let handler_hits = hits.clone();
        let router = Router::new().route(
            "/",
            get(move || {
                let hits = handler_hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    axum::http::StatusCode::UNAUTHORIZED
                }
            }),
        );

        let addr = spawn(router).await;
        let result = get_json(&Client::new(), &fast_policy(), url_for(addr)).await;

        assert!(matches!(result, Err(EtlError::UpstreamAuth(401))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_4xx_fails_without_retrying() {
        let router = Router::new().route("/", get(|| async { axum::http::StatusCode::NOT_FOUND }));

        let addr = spawn(router).await;
        let result = get_json(&Client::new(), &fast_policy(), url_for(addr)).await;

        assert!(matches!(result, Err(EtlError::UpstreamClient(404))));
    }

    #[tokio::test]
    async fn exhausts_retries_on_persistent_5xx() {
        let hits = Arc::new(AtomicU32::new(0));
        let handler_hits = hits.clone();
        let router = Router::new().route(
            "/",
            get(move || {
                let hits = handler_hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        );

        let addr = spawn(router).await;
        let result = get_json(&Client::new(), &fast_policy(), url_for(addr)).await;

        assert!(matches!(result, Err(EtlError::RetriesExhausted(3))));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
