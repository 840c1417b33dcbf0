//! Model provider backed by an external CLI
//!
//! Shells out to a completion command (e.g. the `claude` CLI), passing the
//! prompt as the final positional argument and reading the completion from
//! stdout. Exit status and stderr drive the error classification.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{CompletionRequest, ModelProvider, ModelResponse, ProviderError};

pub struct CommandProvider {
    command: PathBuf,
    args: Vec<String>,
}

impl CommandProvider {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: vec![],
        }
    }

    /// Extra arguments placed before the prompt
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    fn classify(stderr: &str) -> ProviderError {
        let lowered = stderr.to_lowercase();
        if lowered.contains("rate limit") || lowered.contains("429") {
            ProviderError::RateLimited(stderr.trim().to_string())
        } else if lowered.contains("timed out") || lowered.contains("timeout") {
            ProviderError::Timeout(stderr.trim().to_string())
        } else if lowered.contains("bad request")
            || lowered.contains("unauthorized")
            || lowered.contains("invalid")
        {
            ProviderError::Client(stderr.trim().to_string())
        } else {
            ProviderError::Server(stderr.trim().to_string())
        }
    }
}

#[async_trait]
impl ModelProvider for CommandProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<ModelResponse, ProviderError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        if let Some(ref system) = request.system {
            cmd.arg("--system-prompt").arg(system);
        }
        // Prompt as positional argument (must be last)
        cmd.arg(&request.prompt);

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running completion command: {:?}", self.command);

        let output = cmd
            .output()
            .await
            .map_err(|e| ProviderError::Client(format!("failed to spawn {:?}: {}", self.command, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::warn!("Completion command exited with {:?}", output.status.code());
            return Err(Self::classify(&stderr));
        }
        if !stderr.is_empty() {
            tracing::warn!("Completion command stderr: {}", stderr);
        }

        Ok(ModelResponse { content: stdout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_classification() {
        assert!(matches!(
            CommandProvider::classify("429 rate limit exceeded"),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            CommandProvider::classify("Unauthorized: check your key"),
            ProviderError::Client(_)
        ));
        assert!(matches!(
            CommandProvider::classify("internal failure"),
            ProviderError::Server(_)
        ));
    }

    #[tokio::test]
    async fn test_echo_roundtrip() {
        let provider = CommandProvider::new("echo");
        let response = provider
            .complete(CompletionRequest::new("hello there"))
            .await
            .unwrap();
        assert!(response.content.contains("hello there"));
    }
}
