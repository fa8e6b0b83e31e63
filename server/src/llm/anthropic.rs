use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    error::{AppError, AppResult},
    rate_limiters::{get_bucket, TokenBucket, CLAUDE_BUCKET},
    HttpClient,
};

use super::{LlmClient, MessagesRequest, MessagesResponse};

const API_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct AnthropicClient {
    http_client: HttpClient,
    api_key: String,
    rate_limiter: Arc<TokenBucket>,
}

impl AnthropicClient {
    pub fn new(http_client: HttpClient, api_key: String, requests_per_second: f64) -> Self {
        let capacity = requests_per_second.ceil().max(1.0) as u32;
        AnthropicClient {
            http_client,
            api_key,
            rate_limiter: get_bucket(CLAUDE_BUCKET, requests_per_second, capacity),
        }
    }

    pub fn from_env(http_client: HttpClient, requests_per_second: f64) -> AppResult<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            AppError::Authentication("ANTHROPIC_API_KEY is not set".to_string())
        })?;
        Ok(Self::new(http_client, api_key, requests_per_second))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn messages_create(&self, request: MessagesRequest) -> AppResult<MessagesResponse> {
        self.rate_limiter.consume(1).await?;

        let resp = self
            .http_client
            .post(API_ENDPOINT)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LlmApi {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                message: e.to_string(),
            })?;

        let status = resp.status().as_u16();
        let body: serde_json::Value = resp.json().await.map_err(|e| AppError::LlmApi {
            status,
            message: format!("response body decode failed: {e}"),
        })?;

        if !(200..300).contains(&status) {
            let message = body
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("request failed")
                .to_string();
            return Err(match status {
                401 | 403 => AppError::Authentication(message),
                _ => AppError::LlmApi { status, message },
            });
        }

        serde_json::from_value(body).map_err(|e| AppError::LlmApi {
            status,
            message: format!("response decode failed: {e}"),
        })
    }
}
