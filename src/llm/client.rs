use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{debug, info, warn};

use super::types::{ChatRequest, ChatResponse};
use crate::config::{LlmConfig, RequestConfig};
use crate::error::{LlmError, LlmResult};

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Client for an OpenAI-compatible chat completions API
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    endpoint: String,
    api_key: String,
    request_config: RequestConfig,
}

impl LlmClient {
    pub fn new(config: &LlmConfig, request_config: RequestConfig) -> LlmResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                COMPLETIONS_PATH
            ),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Run a chat completion.
    ///
    /// Failed attempts are retried up to `max_retries` times, waiting
    /// `retry_delay_ms * 2^(n-1)` before retry `n`. When every attempt fails
    /// the last error is wrapped in [`LlmError::Unavailable`].
    pub async fn chat(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        let attempts = self.request_config.max_retries + 1;
        let mut last_error = String::from("no attempt made");

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                warn!(
                    model = %request.model,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Retrying chat completion"
                );
                tokio::time::sleep(delay).await;
            }

            let started = Instant::now();
            match self.send_once(&request).await {
                Ok(response) => {
                    info!(
                        model = %request.model,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Chat completion succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        Err(LlmError::Unavailable {
            message: last_error,
            retries: attempts,
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.request_config.retry_delay_ms << (attempt - 1).min(16))
    }

    async fn send_once(&self, request: &ChatRequest) -> LlmResult<ChatResponse> {
        debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                message: e.to_string(),
            })
    }

    fn classify(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout {
                timeout_ms: self.request_config.timeout_ms,
            }
        } else {
            LlmError::Http(err)
        }
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str, retry_delay_ms: u64) -> LlmClient {
        let config = LlmConfig {
            api_key: "sk-unit".to_string(),
            base_url: base_url.to_string(),
        };
        let request = RequestConfig {
            retry_delay_ms,
            ..RequestConfig::default()
        };
        LlmClient::new(&config, request).unwrap()
    }

    #[test]
    fn test_endpoint_ignores_trailing_slash() {
        assert_eq!(
            client("https://api.openai.com/", 1000).endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            client("http://localhost:8080", 1000).endpoint(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_backoff_doubles() {
        let c = client("http://localhost", 100);
        assert_eq!(c.backoff(1), Duration::from_millis(100));
        assert_eq!(c.backoff(2), Duration::from_millis(200));
        assert_eq!(c.backoff(4), Duration::from_millis(800));
    }
}
