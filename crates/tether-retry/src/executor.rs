//! Deadline-bounded retry driver

use crate::backoff::BackoffPolicy;
use crate::context::{CallContext, DoneReason};
use crate::error::RetryError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tether_config::ProviderSettings;

/// Decides whether an operation error is worth another attempt
pub type Classifier<'a, E> = &'a (dyn Fn(&E) -> bool + Send + Sync);

/// Runs an idempotent remote operation until it succeeds, fails with a
/// non-retryable error, or its deadline passes.
///
/// The executor keeps no state between calls; one instance can serve any
/// number of concurrent operations.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    settings: Arc<ProviderSettings>,
    backoff: BackoffPolicy,
}

impl RetryExecutor {
    pub fn new(settings: Arc<ProviderSettings>) -> Self {
        Self {
            settings,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Run `operation` under the configured default retry timeout
    pub async fn execute<T, E, F, Fut>(
        &self,
        ctx: &CallContext,
        is_retryable: Option<Classifier<'_, E>>,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_timeout(ctx, self.settings.retry_timeout, is_retryable, operation)
            .await
    }

    /// Run `operation` under an explicit timeout.
    ///
    /// The timeout becomes a deadline derived from `ctx`; an earlier deadline
    /// already on `ctx` still applies. `operation` receives the derived
    /// context and should pass it on to the remote call.
    pub async fn execute_with_timeout<T, E, F, Fut>(
        &self,
        ctx: &CallContext,
        timeout: Duration,
        is_retryable: Option<Classifier<'_, E>>,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let ctx = ctx.with_timeout(timeout);
        let mut attempt: u32 = 0;

        loop {
            if let Some(reason) = ctx.done_reason() {
                return Err(timed_out(reason, attempt));
            }
            attempt += 1;

            // an attempt that completes at the deadline keeps its own result
            let outcome = tokio::select! {
                biased;
                result = operation(ctx.clone()) => result,
                reason = ctx.done() => return Err(timed_out(reason, attempt)),
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!("Operation succeeded after {} attempts", attempt);
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let retryable = is_retryable.is_some_and(|classify| classify(&err));
            if !retryable {
                return Err(RetryError::Operation(err));
            }

            let delay = self.backoff.delay_for(attempt);
            tracing::debug!("Attempt {} failed, retrying in {:?}", attempt, delay);

            tokio::select! {
                biased;
                reason = ctx.done() => return Err(timed_out(reason, attempt)),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn timed_out<E>(reason: DoneReason, attempts: u32) -> RetryError<E> {
    tracing::warn!("Giving up after {} attempts: {}", attempts, reason);
    RetryError::Timeout
}
