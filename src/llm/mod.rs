//! Completion Endpoint Abstraction
//!
//! The only boundary to the hosted model. An endpoint answers a single wire
//! request shape that covers both free-form generation and "echo and score"
//! log-probability requests. Everything above it (retries, skipping) lives in
//! [`client::CompletionClient`].
//!
//! # Architecture
//!
//! ```text
//! Orchestrator → CompletionClient (retry, fail-soft) → CompletionEndpoint trait → [OpenAiCompletions, test doubles]
//! ```

pub mod client;
pub mod config;
pub mod openai;
pub mod retry;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future returned by endpoint calls
pub type EndpointFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EndpointError>> + Send + 'a>>;

/// A single request against the completion endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Full prompt text
    pub prompt: String,
    /// Maximum number of new tokens to generate (0 = score only)
    pub max_tokens: usize,
    /// Number of per-token log-probabilities to return (None = not requested)
    pub logprobs: Option<u32>,
    /// Echo the prompt tokens back in the output
    pub echo: bool,
}

impl CompletionRequest {
    /// Free-form generation request
    pub fn generation(prompt: &str, max_tokens: usize) -> Self {
        Self {
            prompt: prompt.to_string(),
            max_tokens,
            logprobs: None,
            echo: false,
        }
    }

    /// Echo-and-score request: no new tokens, log-probabilities for every prompt token
    pub fn scoring(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            max_tokens: 0,
            logprobs: Some(1),
            echo: true,
        }
    }
}

/// Response from the completion endpoint
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Completion {
    /// Generated (or echoed) text
    pub text: String,
    /// Per-token log-probabilities of the echoed output, when requested.
    /// The first echoed token has no log-probability.
    pub token_logprobs: Vec<Option<f64>>,
}

impl Completion {
    /// Sum the log-probabilities of the trailing `count` tokens
    ///
    /// Fails if the response has fewer tokens than requested or if any of the
    /// trailing tokens carries no log-probability.
    pub fn trailing_logprob_sum(&self, count: usize) -> Result<f64, EndpointError> {
        if count == 0 {
            return Err(EndpointError::InvalidResponse(
                "suffix must span at least one token".to_string(),
            ));
        }
        if self.token_logprobs.len() < count {
            return Err(EndpointError::InvalidResponse(format!(
                "expected at least {} token log-probabilities, got {}",
                count,
                self.token_logprobs.len()
            )));
        }
        let start = self.token_logprobs.len() - count;
        self.token_logprobs[start..]
            .iter()
            .try_fold(0.0, |acc, lp| match lp {
                Some(v) => Ok(acc + v),
                None => Err(EndpointError::InvalidResponse(
                    "missing log-probability inside scored suffix".to_string(),
                )),
            })
    }
}

/// Errors that can occur during endpoint calls
///
/// The retry policy treats every variant the same way; the variants exist for
/// logging.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointError {
    /// Rate limited by the API (429)
    RateLimited {
        /// Suggested retry delay from Retry-After header
        retry_after: Option<Duration>,
    },
    /// Request timed out
    Timeout,
    /// Network connectivity issue
    NetworkError(String),
    /// API returned an error response
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from API
        message: String,
    },
    /// Response could not be parsed or is missing data
    InvalidResponse(String),
}

impl std::fmt::Display for EndpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointError::RateLimited { retry_after } => {
                if let Some(d) = retry_after {
                    write!(f, "Rate limited, retry after {:?}", d)
                } else {
                    write!(f, "Rate limited")
                }
            }
            EndpointError::Timeout => write!(f, "Request timed out"),
            EndpointError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            EndpointError::ApiError { status, message } => {
                write!(f, "API error {}: {}", status, message)
            }
            EndpointError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl std::error::Error for EndpointError {}

/// Unified trait for completion endpoints
///
/// Object-safe through explicit boxing of the async return type, so the
/// client can hold an `Arc<dyn CompletionEndpoint>` and tests can swap in
/// scripted doubles.
pub trait CompletionEndpoint: Send + Sync {
    /// Issue one request; no retries happen at this layer
    fn complete(&self, request: &CompletionRequest) -> EndpointFuture<'_, Completion>;

    /// Model identifier this endpoint targets
    fn model_name(&self) -> &str;
}
