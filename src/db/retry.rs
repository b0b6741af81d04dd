//! Resilience policy applied around each participant commit and rollback.
//!
//! The coordinator does not decide whether a failure is worth another attempt.
//! It asks a [`ResiliencePolicy`] after every failed provider call and either
//! waits the returned delay and tries again, or gives up with that error.

use crate::db::connection::Connection;
use crate::error::{DbError, DbResult};
use futures_util::future::BoxFuture;
use std::time::Duration;
use tracing::warn;

/// Default number of retries for [`ExponentialBackoff`].
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default first backoff in milliseconds.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 50;

/// Default backoff ceiling in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 2_000;

/// Retry strategy consulted after a participant operation fails.
pub trait ResiliencePolicy: Send + Sync + std::fmt::Debug {
    /// Delay before retry number `attempt` (starting at 1), or `None` to give up.
    fn next_delay(&self, attempt: u32, error: &DbError) -> Option<Duration>;
}

/// Pass-through policy: every failure is final.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl ResiliencePolicy for NoRetry {
    fn next_delay(&self, _attempt: u32, _error: &DbError) -> Option<Duration> {
        None
    }
}

/// Retries transient failures ([`DbError::is_retryable`]) with doubling delays.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl ExponentialBackoff {
    /// Calculates the backoff duration for a retry attempt.
    fn backoff_ms(&self, attempt: u32) -> u64 {
        let base = self.initial_backoff_ms.max(1);
        let max = self.max_backoff_ms.max(base);
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        base.saturating_mul(factor).min(max)
    }
}

impl ResiliencePolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32, error: &DbError) -> Option<Duration> {
        if attempt > self.max_retries || !error.is_retryable() {
            return None;
        }
        Some(Duration::from_millis(self.backoff_ms(attempt)))
    }
}

/// Run one provider operation on a participant connection under `policy`.
pub(crate) async fn execute_with_policy<F>(
    policy: &dyn ResiliencePolicy,
    connection: &mut (dyn Connection + 'static),
    operation: &str,
    participant: &str,
    mut op: F,
) -> DbResult<()>
where
    F: for<'a> FnMut(&'a mut (dyn Connection + 'static)) -> BoxFuture<'a, DbResult<()>> + Send,
{
    let mut attempt = 0u32;
    loop {
        let error = match op(&mut *connection).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        attempt += 1;
        match policy.next_delay(attempt, &error) {
            Some(delay) => {
                warn!(
                    participant = %participant,
                    operation = %operation,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying participant operation"
                );
                tokio::time::sleep(delay).await;
            }
            None => return Err(error),
        }
    }
}
