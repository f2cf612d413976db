//! Model selection with ordered fallback.
//!
//! The [`ModelSelector`] walks an immutable, rank-ordered chain of
//! [`ModelCandidate`]s. Transient failures are retried on the same candidate
//! with exponential backoff; quota, availability and schema failures move on
//! to the next candidate immediately.

mod schema;

pub use schema::{extract_json_from_completion, FieldKind, ResponseSchema, SchemaField};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RequestConfig;
use crate::error::{
    CandidateFailure, FailureKind, ModelError, ModelResult, SelectorError, SelectorResult,
};

/// Billing class of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    /// Free quota
    Free,
    /// Billed usage
    Paid,
}

impl CostTier {
    /// Get the tier name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            CostTier::Free => "free",
            CostTier::Paid => "paid",
        }
    }
}

impl std::fmt::Display for CostTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CostTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(CostTier::Free),
            "paid" => Ok(CostTier::Paid),
            _ => Err(format!("Unknown cost tier: {}", s)),
        }
    }
}

/// One entry in the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCandidate {
    /// Model identifier sent to the backend (e.g. "gemini-2.5-flash").
    pub identifier: String,
    /// Billing class.
    pub cost_tier: CostTier,
    /// Lower ranks are tried first.
    pub priority_rank: u32,
}

impl ModelCandidate {
    /// Create a new candidate
    pub fn new(identifier: impl Into<String>, cost_tier: CostTier, priority_rank: u32) -> Self {
        Self {
            identifier: identifier.into(),
            cost_tier,
            priority_rank,
        }
    }
}

/// A single request to a model backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// Candidate identifier to call.
    pub model: String,
    /// Full prompt text.
    pub prompt: String,
    /// Expected answer shape; JSON schemas switch the backend to JSON output.
    pub schema: ResponseSchema,
}

impl ModelRequest {
    /// Create a new request for one model
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, schema: ResponseSchema) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            schema,
        }
    }
}

/// The accepted answer of a selector call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    /// Identifier of the candidate that answered.
    pub model: String,
    /// Raw completion text, already checked against the schema.
    pub raw: String,
}

/// Opaque text-generation service. One call is one attempt; retry policy
/// lives in the selector.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Generate a completion for `request.prompt` using `request.model`.
    async fn generate(&self, request: &ModelRequest) -> ModelResult<String>;
}

enum CandidateOutcome {
    Failed(CandidateFailure),
    Cancelled,
}

/// Tries candidates in rank order until one returns a schema-valid answer.
#[derive(Clone)]
pub struct ModelSelector {
    candidates: Arc<[ModelCandidate]>,
    backend: Arc<dyn ModelBackend>,
    request_config: RequestConfig,
}

impl std::fmt::Debug for ModelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSelector")
            .field("candidates", &self.candidates)
            .field("request_config", &self.request_config)
            .finish_non_exhaustive()
    }
}

impl ModelSelector {
    /// Create a selector over a non-empty chain sorted by strictly ascending rank.
    pub fn new(
        candidates: Vec<ModelCandidate>,
        backend: Arc<dyn ModelBackend>,
        request_config: RequestConfig,
    ) -> SelectorResult<Self> {
        if candidates.is_empty() {
            return Err(SelectorError::InvalidConfiguration {
                message: "model candidate list is empty".to_string(),
            });
        }

        if let Some(pair) = candidates
            .windows(2)
            .find(|w| w[0].priority_rank >= w[1].priority_rank)
        {
            return Err(SelectorError::InvalidConfiguration {
                message: format!(
                    "candidates must be sorted by strictly ascending priority_rank: '{}' ({}) precedes '{}' ({})",
                    pair[0].identifier, pair[0].priority_rank, pair[1].identifier, pair[1].priority_rank
                ),
            });
        }

        Ok(Self {
            candidates: candidates.into(),
            backend,
            request_config,
        })
    }

    /// The fallback chain, in trial order.
    pub fn candidates(&self) -> &[ModelCandidate] {
        &self.candidates
    }

    /// Send `prompt` down the fallback chain and return the first answer that
    /// satisfies `schema`.
    pub async fn invoke(
        &self,
        prompt: &str,
        schema: &ResponseSchema,
        cancel: &CancellationToken,
    ) -> SelectorResult<ModelResponse> {
        let mut failures = Vec::with_capacity(self.candidates.len());

        for candidate in self.candidates.iter() {
            if cancel.is_cancelled() {
                return Err(SelectorError::Cancelled);
            }

            match self.try_candidate(candidate, prompt, schema, cancel).await {
                Ok(raw) => {
                    return Ok(ModelResponse {
                        model: candidate.identifier.clone(),
                        raw,
                    })
                }
                Err(CandidateOutcome::Cancelled) => {
                    info!(model = %candidate.identifier, "Model call cancelled");
                    return Err(SelectorError::Cancelled);
                }
                Err(CandidateOutcome::Failed(failure)) => {
                    warn!(
                        model = %failure.model,
                        kind = %failure.kind,
                        attempts = failure.attempts,
                        error = %failure.message,
                        "Model candidate failed, falling back"
                    );
                    failures.push(failure);
                }
            }
        }

        error!(
            candidates = failures.len(),
            "All model candidates exhausted"
        );
        Err(SelectorError::AllCandidatesExhausted { failures })
    }

    async fn try_candidate(
        &self,
        candidate: &ModelCandidate,
        prompt: &str,
        schema: &ResponseSchema,
        cancel: &CancellationToken,
    ) -> Result<String, CandidateOutcome> {
        let request = ModelRequest::new(&candidate.identifier, prompt, schema.clone());
        let timeout = Duration::from_millis(self.request_config.timeout_ms);
        let mut retries = 0u32;

        loop {
            if retries > 0 {
                let delay = self.backoff_delay(retries);
                warn!(
                    model = %candidate.identifier,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying model request"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(CandidateOutcome::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            debug!(
                model = %candidate.identifier,
                tier = %candidate.cost_tier,
                prompt_chars = prompt.len(),
                "Calling model"
            );
            let start = Instant::now();

            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CandidateOutcome::Cancelled),
                res = tokio::time::timeout(timeout, self.backend.generate(&request)) => res,
            };

            let err = match attempt {
                Ok(Ok(raw)) => match schema.validate(&raw) {
                    Ok(()) => {
                        info!(
                            model = %candidate.identifier,
                            latency_ms = start.elapsed().as_millis(),
                            "Model call succeeded"
                        );
                        return Ok(raw);
                    }
                    Err(reason) => ModelError::InvalidResponse { message: reason },
                },
                Ok(Err(e)) => e,
                Err(_) => ModelError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                },
            };

            let kind = err.kind();
            error!(
                model = %candidate.identifier,
                error = %err,
                kind = %kind,
                latency_ms = start.elapsed().as_millis(),
                retry = retries,
                "Model call failed"
            );

            if kind == FailureKind::Transient && retries < self.request_config.max_retries {
                retries += 1;
                continue;
            }

            return Err(CandidateOutcome::Failed(CandidateFailure {
                model: candidate.identifier.clone(),
                kind,
                message: err.to_string(),
                attempts: retries + 1,
            }));
        }
    }

    fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2_u64.checked_pow(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let delay_ms = self
            .request_config
            .retry_delay_ms
            .saturating_mul(factor)
            .min(self.request_config.max_retry_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    fn chain(ids: &[&str]) -> Vec<ModelCandidate> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| ModelCandidate::new(*id, CostTier::Free, i as u32))
            .collect()
    }

    fn fast_config(max_retries: u32) -> RequestConfig {
        RequestConfig {
            timeout_ms: 1000,
            max_retries,
            retry_delay_ms: 1,
            max_retry_delay_ms: 10,
        }
    }

    fn quota() -> ModelError {
        ModelError::QuotaExceeded {
            message: "quota".to_string(),
        }
    }

    #[test]
    fn test_cost_tier_from_str() {
        assert_eq!("free".parse::<CostTier>().unwrap(), CostTier::Free);
        assert_eq!("PAID".parse::<CostTier>().unwrap(), CostTier::Paid);
        assert!("gold".parse::<CostTier>().is_err());
    }

    #[test]
    fn test_empty_chain_is_invalid() {
        let err = ModelSelector::new(
            vec![],
            Arc::new(MockModelBackend::new()),
            RequestConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SelectorError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_unsorted_chain_is_invalid() {
        let candidates = vec![
            ModelCandidate::new("b", CostTier::Free, 2),
            ModelCandidate::new("a", CostTier::Free, 1),
        ];
        let err = ModelSelector::new(
            candidates,
            Arc::new(MockModelBackend::new()),
            RequestConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("strictly ascending"));
    }

    #[test]
    fn test_backoff_doubles() {
        let selector = ModelSelector::new(
            chain(&["a"]),
            Arc::new(MockModelBackend::new()),
            RequestConfig {
                timeout_ms: 10,
                max_retries: 3,
                retry_delay_ms: 100,
                max_retry_delay_ms: 30000,
            },
        )
        .unwrap();
        assert_eq!(selector.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(selector.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(selector.backoff_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_is_capped() {
        let selector = ModelSelector::new(
            chain(&["a"]),
            Arc::new(MockModelBackend::new()),
            RequestConfig {
                timeout_ms: 10,
                max_retries: 20,
                retry_delay_ms: 1000,
                max_retry_delay_ms: 5000,
            },
        )
        .unwrap();
        assert_eq!(selector.backoff_delay(3), Duration::from_millis(4000));
        assert_eq!(selector.backoff_delay(4), Duration::from_millis(5000));
        assert_eq!(selector.backoff_delay(20), Duration::from_millis(5000));
        assert_eq!(selector.backoff_delay(80), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let mut backend = MockModelBackend::new();
        backend
            .expect_generate()
            .withf(|r| r.model == "a")
            .times(1)
            .returning(|_| Ok("hello".to_string()));
        backend.expect_generate().withf(|r| r.model == "b").never();

        let selector =
            ModelSelector::new(chain(&["a", "b"]), Arc::new(backend), fast_config(2)).unwrap();
        let response = selector
            .invoke("p", &ResponseSchema::Text, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.model, "a");
        assert_eq!(response.raw, "hello");
    }

    #[tokio::test]
    async fn test_quota_advances_without_retry() {
        let mut seq = Sequence::new();
        let mut backend = MockModelBackend::new();
        backend
            .expect_generate()
            .withf(|r| r.model == "a")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(quota()));
        backend
            .expect_generate()
            .withf(|r| r.model == "b")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("from b".to_string()));

        let selector =
            ModelSelector::new(chain(&["a", "b"]), Arc::new(backend), fast_config(3)).unwrap();
        let response = selector
            .invoke("p", &ResponseSchema::Text, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.model, "b");
    }

    #[tokio::test]
    async fn test_transient_errors_retry_same_candidate() {
        let mut calls = 0;
        let mut backend = MockModelBackend::new();
        backend
            .expect_generate()
            .withf(|r| r.model == "a")
            .times(3)
            .returning(move |_| {
                calls += 1;
                if calls < 3 {
                    Err(ModelError::Network {
                        message: "reset".to_string(),
                    })
                } else {
                    Ok("third time".to_string())
                }
            });
        backend.expect_generate().withf(|r| r.model == "b").never();

        let selector =
            ModelSelector::new(chain(&["a", "b"]), Arc::new(backend), fast_config(2)).unwrap();
        let response = selector
            .invoke("p", &ResponseSchema::Text, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.model, "a");
        assert_eq!(response.raw, "third time");
    }

    #[tokio::test]
    async fn test_malformed_response_advances() {
        let mut backend = MockModelBackend::new();
        backend
            .expect_generate()
            .withf(|r| r.model == "a")
            .times(1)
            .returning(|_| Ok("not json at all".to_string()));
        backend
            .expect_generate()
            .withf(|r| r.model == "b")
            .times(1)
            .returning(|_| Ok(r#"{"summary": "ok"}"#.to_string()));

        let schema = ResponseSchema::json("test").field("summary", FieldKind::String);
        let selector =
            ModelSelector::new(chain(&["a", "b"]), Arc::new(backend), fast_config(3)).unwrap();
        let response = selector
            .invoke("p", &schema, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.model, "b");
    }

    #[tokio::test]
    async fn test_exhaustion_reports_each_candidate() {
        let mut backend = MockModelBackend::new();
        backend
            .expect_generate()
            .withf(|r| r.model == "a")
            .times(1)
            .returning(|_| Err(quota()));
        backend
            .expect_generate()
            .withf(|r| r.model == "b")
            .times(2)
            .returning(|_| Err(ModelError::Timeout { timeout_ms: 5 }));

        let selector =
            ModelSelector::new(chain(&["a", "b"]), Arc::new(backend), fast_config(1)).unwrap();
        let err = selector
            .invoke("p", &ResponseSchema::Text, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            SelectorError::AllCandidatesExhausted { failures } => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].model, "a");
                assert_eq!(failures[0].kind, FailureKind::QuotaExceeded);
                assert_eq!(failures[0].attempts, 1);
                assert_eq!(failures[1].model, "b");
                assert_eq!(failures[1].kind, FailureKind::Transient);
                assert_eq!(failures[1].attempts, 2);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mut backend = MockModelBackend::new();
        backend.expect_generate().never();

        let selector =
            ModelSelector::new(chain(&["a"]), Arc::new(backend), fast_config(0)).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = selector
            .invoke("p", &ResponseSchema::Text, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, SelectorError::Cancelled));
    }
}
