//! Retry with exponential backoff for remote calls
//!
//! Every call to an external collaborator (embedding service, vector index,
//! generative model) goes through [`RetryPolicy::run`]. Each attempt is
//! bounded by the call timeout; timeouts and other transient failures are
//! retried until the attempt ceiling, permanent failures return at once.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{Error, Result, ServiceFailure, Stage};

/// Retry policy shared by all remote collaborators
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    call_timeout: Duration,
}

impl RetryPolicy {
    /// Build from configuration
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier.max(1.0),
            call_timeout: config.call_timeout(),
        }
    }

    /// A policy that tries once with the given timeout
    pub fn no_retry(call_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            call_timeout,
        }
    }

    /// Total attempts per call
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_backoff.mul_f64(factor);
        delay.min(self.max_backoff)
    }

    /// Run `operation` under the policy
    ///
    /// `stage` labels cancellation and timeout errors. `on_timeout` builds the
    /// stage-specific error for an attempt that exceeded the call timeout.
    pub async fn run<F, Fut, T>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        on_timeout: fn(ServiceFailure, String) -> Error,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(stage));
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled(stage)),
                res = timeout(self.call_timeout, operation()) => res,
            };

            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => on_timeout(
                    ServiceFailure::Timeout,
                    format!("call timed out after {:?}", self.call_timeout),
                ),
            };

            if !err.is_transient() || attempt >= self.max_attempts {
                if err.is_transient() {
                    tracing::warn!(
                        %stage,
                        attempts = attempt,
                        "Giving up after {} attempts: {}",
                        attempt,
                        err
                    );
                }
                return Err(err);
            }

            let delay = self.backoff(attempt);
            tracing::warn!(
                %stage,
                "Request failed (attempt {}/{}), retrying in {:?}: {}",
                attempt,
                self.max_attempts,
                delay,
                err
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled(stage)),
                _ = sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}
