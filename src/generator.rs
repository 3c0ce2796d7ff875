use std::time::Duration;

use async_trait::async_trait;

use crate::config::ServiceConfig;
use crate::openai;

/// One call to the generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("generation service is not configured: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("completion text is empty")]
    EmptyOutput,

    #[error("decode response: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Failures worth retrying: the request may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Transport(_) | ServiceError::Timeout => true,
            ServiceError::Api { status, .. } => *status == 429 || *status >= 500,
            ServiceError::Config(_) | ServiceError::EmptyOutput | ServiceError::Decode(_) => false,
        }
    }
}

/// The opaque text-generation capability every pipeline stage calls.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError>;
}

/// OpenAI-compatible chat-completions client.
///
/// Owns a single `reqwest::Client` for the life of the process. Transient
/// failures are retried with exponential backoff.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    retries: usize,
    initial_backoff: Duration,
}

impl OpenAiGenerator {
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ServiceError::Config("OPENAI_API_KEY is not set".to_owned()))?
            .to_owned();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|err| ServiceError::Config(format!("build http client: {err}")))?;

        Ok(Self {
            client,
            endpoint: openai::chat_completions_endpoint(&config.base_url),
            api_key,
            model: config.model.clone(),
            retries: config.retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError> {
        let attempts = self.retries.saturating_add(1);
        let mut backoff = self.initial_backoff;

        let mut attempt = 1;
        loop {
            tracing::debug!(
                model = %self.model,
                attempt,
                max_tokens = request.max_tokens,
                "chat completion"
            );
            match openai::chat_completion(
                &self.client,
                &self.endpoint,
                &self.api_key,
                &self.model,
                request,
            )
            .await
            {
                Ok(text) => return Ok(text),
                Err(err) if err.is_transient() && attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "generation call failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        let api = |status| ServiceError::Api {
            status,
            message: String::new(),
        };
        assert!(api(429).is_transient());
        assert!(api(503).is_transient());
        assert!(!api(401).is_transient());
        assert!(ServiceError::Timeout.is_transient());
        assert!(!ServiceError::EmptyOutput.is_transient());
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = ServiceConfig {
            api_key: Some("  ".to_owned()),
            ..ServiceConfig::default()
        };
        let err = OpenAiGenerator::new(&config).unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }
}
