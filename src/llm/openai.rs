//! OpenAI-compatible Completions Endpoint
//!
//! Client for the legacy `/completions` API. This is the endpoint shape that
//! supports `echo` together with per-token `logprobs`, which the choice
//! scorer needs. Self-hosted servers exposing the same route work through
//! [`EndpointConfig::with_base_url`].
//!
//! # Example
//!
//! ```rust,ignore
//! let config = EndpointConfig::from_env().unwrap();
//! let endpoint = OpenAiCompletions::new(&config, "text-davinci-003")?;
//! let out = endpoint.complete(&CompletionRequest::generation("Q: 2+2?\nA:", 8)).await?;
//! ```

use crate::llm::config::EndpointConfig;
use crate::llm::{Completion, CompletionEndpoint, CompletionRequest, EndpointError, EndpointFuture};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Completions API client bound to one model
#[derive(Debug, Clone)]
pub struct OpenAiCompletions {
    base_url: String,
    model: String,
    timeout: Duration,
    client: Client,
}

impl OpenAiCompletions {
    /// Build a client from shared connection settings
    pub fn new(config: &EndpointConfig, model: &str) -> Result<Self, EndpointError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key)).map_err(|e| {
                EndpointError::InvalidResponse(format!("Invalid API key format: {}", e))
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| EndpointError::NetworkError(format!("Failed to create client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout: config.timeout,
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct CompletionsBody<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    logprobs: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    echo: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionsResponse {
    choices: Vec<CompletionsChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionsChoice {
    #[serde(default)]
    text: String,
    #[serde(default)]
    logprobs: Option<ChoiceLogprobs>,
}

#[derive(Debug, Deserialize)]
struct ChoiceLogprobs {
    #[serde(default)]
    token_logprobs: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl CompletionEndpoint for OpenAiCompletions {
    fn complete(&self, request: &CompletionRequest) -> EndpointFuture<'_, Completion> {
        let request = request.clone();

        Box::pin(async move {
            let body = CompletionsBody {
                model: &self.model,
                prompt: &request.prompt,
                max_tokens: request.max_tokens,
                logprobs: request.logprobs,
                echo: request.echo,
            };

            let url = format!("{}/completions", self.base_url);

            let response = self
                .client
                .post(&url)
                .json(&body)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        EndpointError::Timeout
                    } else if e.is_connect() {
                        EndpointError::NetworkError(format!("Connection failed: {}", e))
                    } else {
                        EndpointError::NetworkError(e.to_string())
                    }
                })?;

            let status = response.status();

            if status.as_u16() == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);

                return Err(EndpointError::RateLimited { retry_after });
            }

            if !status.is_success() {
                let error_body: Result<ErrorResponse, _> = response.json().await;
                let message = error_body
                    .map(|e| e.error.message)
                    .unwrap_or_else(|_| "Unknown error".to_string());

                return Err(EndpointError::ApiError {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: CompletionsResponse = response.json().await.map_err(|e| {
                EndpointError::InvalidResponse(format!("Failed to parse response: {}", e))
            })?;

            let choice = parsed.choices.into_iter().next().ok_or_else(|| {
                EndpointError::InvalidResponse("Response contained no choices".to_string())
            })?;

            let token_logprobs = match choice.logprobs {
                Some(lp) => lp.token_logprobs,
                None if request.logprobs.is_some() => {
                    return Err(EndpointError::InvalidResponse(
                        "Log-probabilities requested but not returned".to_string(),
                    ))
                }
                None => Vec::new(),
            };

            Ok(Completion {
                text: choice.text,
                token_logprobs,
            })
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
