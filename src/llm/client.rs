//! Fail-soft completion client
//!
//! Wraps a [`CompletionEndpoint`] with the retry policy and turns exhausted
//! retries into `None`. Callers treat `None` as "skip this instance"; a bad
//! call never aborts a dataset pass.

use crate::llm::retry::{call_with_retry, RetryPolicy};
use crate::llm::{CompletionEndpoint, CompletionRequest};
use std::sync::Arc;
use tracing::{debug, warn};

/// Stateless client over one endpoint; holds nothing per record
#[derive(Clone)]
pub struct CompletionClient {
    endpoint: Arc<dyn CompletionEndpoint>,
    retry: RetryPolicy,
}

impl CompletionClient {
    /// Create a client with an explicit retry policy
    pub fn new(endpoint: Arc<dyn CompletionEndpoint>, retry: RetryPolicy) -> Self {
        Self { endpoint, retry }
    }

    /// Model identifier of the wrapped endpoint
    pub fn model_name(&self) -> &str {
        self.endpoint.model_name()
    }

    /// Generate a continuation of `prompt`
    ///
    /// Returns `None` once every attempt has failed.
    pub async fn complete(&self, prompt: &str, max_completion_tokens: usize) -> Option<String> {
        let request = CompletionRequest::generation(prompt, max_completion_tokens);
        match call_with_retry(|| self.endpoint.complete(&request), &self.retry).await {
            Ok(completion) => Some(completion.text),
            Err(exhausted) => {
                warn!(
                    model = %self.endpoint.model_name(),
                    attempts = exhausted.attempts,
                    "Retried too many times, skipping this instance"
                );
                None
            }
        }
    }

    /// Score the trailing `suffix_tokens` tokens of `prompt`
    ///
    /// The prompt is echoed back with per-token log-probabilities and the last
    /// `suffix_tokens` of them are summed. The result is an unnormalized
    /// log-probability for the appended candidate choice. A response that
    /// cannot supply the suffix counts as a failed attempt.
    pub async fn score_choice(&self, prompt: &str, suffix_tokens: usize) -> Option<f64> {
        let request = CompletionRequest::scoring(prompt);
        let result = call_with_retry(
            || async {
                let completion = self.endpoint.complete(&request).await?;
                completion.trailing_logprob_sum(suffix_tokens)
            },
            &self.retry,
        )
        .await;

        match result {
            Ok(score) => {
                debug!(suffix_tokens, score, "Scored choice");
                Some(score)
            }
            Err(exhausted) => {
                warn!(
                    model = %self.endpoint.model_name(),
                    attempts = exhausted.attempts,
                    "Retried too many times, skipping this instance"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, EndpointError, EndpointFuture};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Endpoint that replays a script of results and records requests
    struct ScriptedEndpoint {
        script: Mutex<Vec<Result<Completion, EndpointError>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedEndpoint {
        fn new(mut script: Vec<Result<Completion, EndpointError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl CompletionEndpoint for ScriptedEndpoint {
        fn complete(&self, request: &CompletionRequest) -> EndpointFuture<'_, Completion> {
            self.seen.lock().unwrap().push(request.clone());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(EndpointError::NetworkError("script empty".to_string())));
            Box::pin(async move { next })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn text(s: &str) -> Result<Completion, EndpointError> {
        Ok(Completion {
            text: s.to_string(),
            ..Default::default()
        })
    }

    fn logprobs(lps: &[Option<f64>]) -> Result<Completion, EndpointError> {
        Ok(Completion {
            text: String::new(),
            token_logprobs: lps.to_vec(),
        })
    }

    fn client(endpoint: Arc<ScriptedEndpoint>) -> CompletionClient {
        CompletionClient::new(endpoint, RetryPolicy::fixed(5, Duration::from_secs(2)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_returns_text() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![text(" Paris")]));
        let out = client(endpoint.clone()).complete("Q: ?\nA:", 64).await;
        assert_eq!(out.as_deref(), Some(" Paris"));
        assert_eq!(endpoint.calls(), 1);
        let seen = endpoint.seen.lock().unwrap();
        assert_eq!(seen[0].max_tokens, 64);
        assert!(!seen[0].echo);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_absent_after_five_failures() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![
            Err(EndpointError::Timeout),
            Err(EndpointError::Timeout),
            Err(EndpointError::Timeout),
            Err(EndpointError::Timeout),
            Err(EndpointError::Timeout),
            text("never reached"),
        ]));
        let start = tokio::time::Instant::now();
        let out = client(endpoint.clone()).complete("p", 8).await;
        assert_eq!(out, None);
        assert_eq!(endpoint.calls(), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_score_choice_sums_suffix() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![logprobs(&[
            None,
            Some(-3.0),
            Some(-0.5),
            Some(-0.25),
        ])]));
        let score = client(endpoint.clone()).score_choice("A: yes.", 2).await;
        assert_eq!(score, Some(-0.75));
        let seen = endpoint.seen.lock().unwrap();
        assert_eq!(seen[0].max_tokens, 0);
        assert!(seen[0].echo);
        assert_eq!(seen[0].logprobs, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_score_choice_absent_after_exactly_five_attempts() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![]));
        let start = tokio::time::Instant::now();
        let score = client(endpoint.clone()).score_choice("p", 1).await;
        assert_eq!(score, None);
        assert_eq!(endpoint.calls(), 5);
        // one 2 s sleep between each pair of attempts
        assert_eq!(start.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_score_response_is_retried() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![
            logprobs(&[None]),
            logprobs(&[None, Some(-1.0), Some(-2.0)]),
        ]));
        let score = client(endpoint.clone()).score_choice("p", 2).await;
        assert_eq!(score, Some(-3.0));
        assert_eq!(endpoint.calls(), 2);
    }
}
