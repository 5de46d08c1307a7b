use crate::error::ServiceError;
use crate::models::IngestionOptions;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded retries with capped exponential backoff; every attempt runs under `call_timeout`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&IngestionOptions::default())
    }
}

impl From<&IngestionOptions> for RetryPolicy {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_attempts: value.max_attempts.max(1),
            initial_backoff: value.initial_backoff,
            max_backoff: value.max_backoff,
            call_timeout: value.call_timeout,
        }
    }
}

impl RetryPolicy {
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ServiceError::Timeout {
                    operation: operation.to_string(),
                    timeout_ms: self.call_timeout.as_millis(),
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying upstream call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}
