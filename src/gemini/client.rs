use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::types::{
    ApiErrorEnvelope, GenerateContentRequest, GenerateContentResponse, ListModelsResponse,
};
use crate::config::{GeminiConfig, RequestConfig};
use crate::error::{ModelError, ModelResult};
use crate::selector::{ModelBackend, ModelRequest};

const API_VERSION: &str = "v1beta";
const ANALYSIS_TEMPERATURE: f64 = 0.2;

/// Client for the Gemini `generateContent` API.
///
/// Every call is a single attempt. Retries and fallback are the
/// [`ModelSelector`](crate::selector::ModelSelector)'s job.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: &GeminiConfig, request_config: &RequestConfig) -> ModelResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(ModelError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_ms: request_config.timeout_ms,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Names of the models this key can call `generateContent` on.
    ///
    /// Follows `nextPageToken` until the listing is exhausted.
    pub async fn list_models(&self) -> ModelResult<Vec<String>> {
        let url = format!("{}/{}/models", self.base_url, API_VERSION);
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut request = self.client.get(&url).header("x-goog-api-key", &self.api_key);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = request.send().await.map_err(|e| self.map_send_error(e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(status, &body));
            }

            let listing: ListModelsResponse =
                response
                    .json()
                    .await
                    .map_err(|e| ModelError::InvalidResponse {
                        message: format!("Failed to parse model listing: {}", e),
                    })?;
            pages += 1;

            names.extend(
                listing
                    .models
                    .into_iter()
                    .filter(|m| {
                        m.supported_generation_methods
                            .iter()
                            .any(|method| method == "generateContent")
                    })
                    .map(|m| m.name),
            );

            match listing.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) if page_token.as_deref() != Some(next.as_str()) => {
                    page_token = Some(next)
                }
                _ => break,
            }
        }

        debug!(pages, models = names.len(), "Listed Gemini models");
        Ok(names)
    }

    fn map_send_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout {
                timeout_ms: self.timeout_ms,
            }
        } else if e.is_connect() {
            ModelError::Network {
                message: e.to_string(),
            }
        } else {
            ModelError::Http(e)
        }
    }
}

#[async_trait]
impl ModelBackend for GeminiClient {
    async fn generate(&self, request: &ModelRequest) -> ModelResult<String> {
        let model = request.model.trim_start_matches("models/");
        let url = format!(
            "{}/{}/models/{}:generateContent",
            self.base_url, API_VERSION, model
        );

        let mut body =
            GenerateContentRequest::new(&request.prompt).with_temperature(ANALYSIS_TEMPERATURE);
        if request.schema.expects_json() {
            body = body.with_json_output();
        }

        debug!(
            model = %model,
            prompt_chars = request.prompt.len(),
            "Calling Gemini generateContent"
        );
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &error_body));
        }

        let parsed: GenerateContentResponse =
            response
                .json()
                .await
                .map_err(|e| ModelError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        if let Some(reason) = parsed.block_reason() {
            return Err(ModelError::InvalidResponse {
                message: format!("Prompt blocked: {}", reason),
            });
        }

        let text = parsed.text().ok_or_else(|| ModelError::InvalidResponse {
            message: "Response contained no candidate text".to_string(),
        })?;

        info!(
            model = %model,
            latency_ms = start.elapsed().as_millis(),
            total_tokens = ?parsed
                .usage_metadata
                .as_ref()
                .and_then(|u| u.total_token_count),
            "Gemini call completed"
        );

        Ok(text)
    }
}

/// Map a non-success status and its body to a [`ModelError`].
fn classify_status(status: StatusCode, body: &str) -> ModelError {
    let (message, api_status) = match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status),
        Err(_) => (body.to_string(), None),
    };

    let lowered = message.to_lowercase();
    let quota = status == StatusCode::TOO_MANY_REQUESTS
        || api_status.as_deref() == Some("RESOURCE_EXHAUSTED")
        || lowered.contains("quota");

    if quota {
        return ModelError::QuotaExceeded { message };
    }

    match status {
        StatusCode::NOT_FOUND | StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
            ModelError::Unavailable { message }
        }
        _ => ModelError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn test_client_creation() {
        let config = GeminiConfig {
            api_key: "test_key".to_string(),
            base_url: "https://generativelanguage.googleapis.com/".to_string(),
        };

        let client = GeminiClient::new(&config, &RequestConfig::default()).unwrap();
        assert_eq!(client.base_url(), "https://generativelanguage.googleapis.com");
    }

    #[test]
    fn test_classify_quota_by_status() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(err.kind(), FailureKind::QuotaExceeded);
    }

    #[test]
    fn test_classify_quota_by_api_status() {
        let body = r#"{"error": {"code": 400, "message": "limit", "status": "RESOURCE_EXHAUSTED"}}"#;
        let err = classify_status(StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, ModelError::QuotaExceeded { ref message } if message == "limit"));
    }

    #[test]
    fn test_classify_missing_model() {
        let body = r#"{"error": {"code": 404, "message": "models/x is not found", "status": "NOT_FOUND"}}"#;
        let err = classify_status(StatusCode::NOT_FOUND, body);
        assert_eq!(err.kind(), FailureKind::Unavailable);
    }

    #[test]
    fn test_classify_server_error_is_transient() {
        let err = classify_status(StatusCode::SERVICE_UNAVAILABLE, "overloaded");
        assert_eq!(err.kind(), FailureKind::Transient);
    }
}
