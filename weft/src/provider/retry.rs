//! Retry policy for model calls
//!
//! A pure function of (attempt count, error classification) → (wait, retry
//! or fail), shared by every caller instead of inline loops per client.

use std::future::Future;
use std::time::Duration;

use super::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    Fail,
}

/// Exponential backoff with a fixed retry ceiling
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Decide what to do after the given (zero-based) attempt failed
    pub fn decide(&self, attempt: u32, error: &ProviderError) -> RetryDecision {
        if !error.is_transient() || attempt >= self.max_retries {
            return RetryDecision::Fail;
        }
        let delay = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        RetryDecision::Retry(Duration::from_millis(delay as u64))
    }

    /// Drive an operation through the policy, sleeping between attempts
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => match self.decide(attempt, &error) {
                    RetryDecision::Retry(delay) => {
                        tracing::warn!(
                            "Model call failed (attempt #{}): {}; retrying in {:?}",
                            attempt + 1,
                            error,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::Fail => return Err(error),
                },
            }
        }
    }
}
