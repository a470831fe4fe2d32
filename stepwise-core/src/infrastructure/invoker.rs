//! Rate-limited, retrying wrapper around a [`ModelProvider`].

use crate::infrastructure::limiter::RateLimiter;
use crate::model::{ErrorClass, ModelError, ModelProvider, ModelRequest, ModelResponse};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// A service retry hint may stretch the wait to this many times `max_delay`.
const HINT_CEILING_FACTOR: u32 = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based). A service hint
    /// wins over the exponential schedule, up to the hint ceiling.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint.min(self.hint_ceiling());
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    fn hint_ceiling(&self) -> Duration {
        self.max_delay.saturating_mul(HINT_CEILING_FACTOR)
    }
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("model call failed: {0}")]
    Fatal(#[source] ModelError),
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: ModelError,
    },
}

impl InvokeError {
    pub fn user_message(&self) -> String {
        match self {
            InvokeError::Fatal(err) => err.user_message(),
            InvokeError::RetriesExhausted { attempts, last } => format!(
                "Gave up after {attempts} attempts. {}",
                last.user_message()
            ),
        }
    }
}

pub struct RetryingInvoker<P: ModelProvider> {
    provider: P,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    attempts: AtomicUsize,
}

impl<P: ModelProvider> RetryingInvoker<P> {
    pub fn new(provider: P, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            limiter,
            policy,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Requests handed to the provider so far, across all invocations.
    pub fn attempts_made(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    pub async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse, InvokeError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let permit = self.limiter.acquire().await;
            self.attempts.fetch_add(1, Ordering::Relaxed);
            debug!(attempt, model = request.model.as_str(), "Invoking model");

            let result = match timeout(self.policy.attempt_timeout, self.provider.chat(request.clone()))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ModelError::timeout(&request.provider)),
            };

            let error = match result {
                Ok(response) => {
                    permit.record_send();
                    return Ok(response);
                }
                Err(error) => error,
            };
            drop(permit);

            let hint = match error.classify() {
                ErrorClass::Fatal => return Err(InvokeError::Fatal(error)),
                ErrorClass::RateLimited { retry_after } => retry_after,
                ErrorClass::Transient => None,
            };

            if attempt >= self.policy.max_attempts {
                warn!(attempts = attempt, %error, "Model call retries exhausted");
                return Err(InvokeError::RetriesExhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.policy.delay_for(attempt, hint);
            warn!(
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                %error,
                "Retryable model error, backing off"
            );
            sleep(delay).await;
        }
    }
}
