//! Retry with exponential backoff for record store calls.
//!
//! Attempt `n` (1-indexed) that fails with a retryable kind is followed by a
//! sleep of `min(base_delay * multiplier^(n-1), max_delay)` plus up to 10%
//! jitter. The final failure is always returned as an [`AppError`].

use rand_core::{OsRng, RngCore};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, ErrorKind};

pub type RetryCallback = Arc<dyn Fn(&AppError, u32) + Send + Sync>;
pub type FinalErrorCallback = Arc<dyn Fn(&AppError) + Send + Sync>;

#[derive(Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt; `0` means a single attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub retryable_kinds: HashSet<ErrorKind>,
    /// Called with the error and the number of the attempt that just failed.
    pub on_retry: Option<RetryCallback>,
    pub on_final_error: Option<FinalErrorCallback>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            retryable_kinds: ErrorKind::TRANSIENT.into_iter().collect(),
            on_retry: None,
            on_final_error: None,
        }
    }
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("retryable_kinds", &self.retryable_kinds)
            .field("on_retry", &self.on_retry.is_some())
            .field("on_final_error", &self.on_final_error.is_some())
            .finish()
    }
}

impl RetryConfig {
    pub fn with_on_retry(
        mut self,
        callback: impl Fn(&AppError, u32) + Send + Sync + 'static,
    ) -> Self {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    pub fn with_on_final_error(
        mut self,
        callback: impl Fn(&AppError) + Send + Sync + 'static,
    ) -> Self {
        self.on_final_error = Some(Arc::new(callback));
        self
    }

    /// Backoff before the retry that follows failed attempt `attempt`,
    /// without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.base_delay.as_secs_f64() * 1000.0;
        let max_ms = self.max_delay.as_secs_f64() * 1000.0;
        let delay_ms =
            (base_ms * self.backoff_multiplier.powi(exponent)).min(max_ms);

        if delay_ms.is_finite() && delay_ms >= 0.0 {
            Duration::from_millis(delay_ms.round() as u64)
        } else {
            self.max_delay
        }
    }

    /// `delay_for_attempt` plus a random 0-10% on top.
    fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        let jitter_ceiling = (delay.as_millis() / 10) as u64;
        if jitter_ceiling == 0 {
            return delay;
        }
        delay + Duration::from_millis(OsRng.next_u64() % (jitter_ceiling + 1))
    }

    pub fn is_retryable(&self, e: &AppError) -> bool {
        e.kind.is_structurally_retryable()
            && self.retryable_kinds.contains(&e.kind)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable kind, or
/// runs out of attempts.
///
/// Dropping the returned future cancels any pending backoff sleep.
pub async fn with_retry<T, E, F, Fut>(
    mut operation: F,
    config: &RetryConfig,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<AppError>,
{
    let max_attempts = config.max_retries.saturating_add(1);
    let mut attempt = 1;

    loop {
        let e: AppError = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e.into(),
        };

        if attempt >= max_attempts || !config.is_retryable(&e) {
            tracing::error!(
                kind = %e.kind,
                attempt,
                "Giving up: {}",
                e.message
            );
            if let Some(on_final_error) = &config.on_final_error {
                on_final_error(&e);
            }
            return Err(e);
        }

        let delay = config.jittered_delay(attempt);
        tracing::warn!(
            kind = %e.kind,
            attempt,
            "Attempt failed, retrying in {}ms",
            delay.as_millis()
        );
        if let Some(on_retry) = &config.on_retry {
            on_retry(&e, attempt);
        }

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
