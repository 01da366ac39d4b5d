use reqwest::{Client, Url};
use serde_json::Value;

use crate::config::OpenAiConfig;
use crate::error::EtlError;

use super::transport::{self, RetryPolicy};

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

// The provider rejects empty input, so callers with nothing to say still get
// a usable gift-context vector.
const EMPTY_INPUT_PLACEHOLDER: &str = "ギフト";

/// Embedding provider facade sharing the transport's retry ladder with the
/// commerce client.
pub struct EmbeddingClient {
    http: Client,
    policy: RetryPolicy,
    url: Url,
    api_key: String,
    pub model: String,
}

impl EmbeddingClient {
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            http: Client::new(),
            policy: RetryPolicy {
                max_attempts: config.max_retries,
                base_backoff: config.backoff_base,
                timeout: config.timeout,
            },
            url: Url::parse(EMBEDDINGS_URL).expect("static embeddings url"),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    #[cfg(test)]
    fn with_url(mut self, url: Url) -> Self {
        self.url = url;
        self
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EtlError> {
        let input = if text.trim().is_empty() {
            EMPTY_INPUT_PLACEHOLDER
        } else {
            text
        };
        let body = serde_json::json!({ "model": self.model, "input": input });
        let payload =
            transport::post_json(&self.http, &self.policy, self.url.clone(), &body, Some(&self.api_key))
                .await?;
        extract_embedding(&payload)
    }
}

fn extract_embedding(payload: &Value) -> Result<Vec<f32>, EtlError> {
    let values = payload
        .get("data")
        .and_then(|data| data.get(0))
        .and_then(|first| first.get("embedding"))
        .and_then(Value::as_array)
        .ok_or_else(|| EtlError::Payload("embedding response missing data[0].embedding".into()))?;

    values
        .iter()
        .map(|value| {
            value
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| EtlError::Payload("non-numeric embedding component".into()))
        })
        .collect()
}
