//! Scripted provider replaying canned responses
//!
//! Used by tests and dry runs: replies are popped in order, and every
//! received request is recorded for later inspection.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CompletionRequest, ModelProvider, ModelResponse, ProviderError};

#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply
    pub fn push(&self, content: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(content.into()));
    }

    /// Queue a failure
    pub fn push_error(&self, error: ProviderError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    /// Prompts received so far, in order
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<ModelResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(content)) => Ok(ModelResponse { content }),
            Some(Err(error)) => Err(error),
            None => Err(ProviderError::Client("script exhausted".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_then_exhausted() {
        let provider = ScriptedProvider::new();
        provider.push("first");
        provider.push("second");

        let a = provider.complete(CompletionRequest::new("p1")).await.unwrap();
        let b = provider.complete(CompletionRequest::new("p2")).await.unwrap();
        assert_eq!(a.content, "first");
        assert_eq!(b.content, "second");

        let err = provider
            .complete(CompletionRequest::new("p3"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Client(_)));
        assert_eq!(provider.prompts(), vec!["p1", "p2", "p3"]);
    }
}
