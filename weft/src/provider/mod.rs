//! Model provider seam
//!
//! The language-model backend is an external collaborator; the pipeline
//! programs against the `ModelProvider` trait. Error classification matters:
//! rate-limit and server errors are transient and retried with backoff,
//! client errors fail immediately.

pub mod command;
pub mod retry;
pub mod scripted;

use async_trait::async_trait;
use thiserror::Error;

pub use command::CommandProvider;
pub use retry::{RetryDecision, RetryPolicy};
pub use scripted::ScriptedProvider;

/// Provider failure, classified for retry purposes
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Provider-reported rate limiting; transient
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Provider-side failure; transient
    #[error("server error: {0}")]
    Server(String),

    /// The call itself timed out; transient
    #[error("timed out: {0}")]
    Timeout(String),

    /// Bad request, auth failure, misconfiguration; never retried
    #[error("client error: {0}")]
    Client(String),
}

impl ProviderError {
    /// Whether a retry can help
    pub fn is_transient(&self) -> bool {
        !matches!(self, ProviderError::Client(_))
    }
}

/// One completion request. Providers are stateless; all context travels
/// in the prompt.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub content: String,
}

/// Single request/response completion seam
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<ModelResponse, ProviderError>;
}
