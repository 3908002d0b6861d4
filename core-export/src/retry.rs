//! # Retry Policy
//!
//! Classification-driven retry for remote service calls.
//!
//! ## Overview
//!
//! Every call to the remote service goes through one of two wrappers:
//!
//! - [`RetryPolicy::execute_read`] retries transient failures (network
//!   errors, HTTP 5xx, 429) with capped exponential backoff. Reads and
//!   script operations converge to the same outcome when repeated, so they
//!   retry freely.
//! - [`RetryPolicy::execute_create`] retries only when the caller supplied an
//!   idempotency key the service can deduplicate on. Without one, a blind
//!   retry of "create export" could spawn a duplicate job, so the first
//!   transient failure is surfaced as [`ExportError::RemoteUnavailable`].
//!
//! Permanent failures (4xx) are never retried: auth failures (401/403) and
//! bad requests surface immediately as distinct error variants.

use crate::{ExportError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry behavior for remote service calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt for transient failures
    pub max_retry_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for the backoff sequence
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (zero-based): `base * 2^retry`,
    /// capped at `max_delay`
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run an idempotent call, retrying transient failures with backoff
    ///
    /// # Errors
    ///
    /// Permanent failures are classified immediately; transient failures that
    /// outlive the retry budget become [`ExportError::RemoteUnavailable`]
    /// carrying the total attempt count.
    pub async fn execute_read<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = service_traits::Result<T>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Call succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) if error.is_transient() && attempt <= self.max_retry_attempts => {
                    let delay = self.backoff_delay(attempt - 1);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(ExportError::from_service(error, attempt)),
            }
        }
    }

    /// Run a creation call, retrying only when an idempotency key is present
    ///
    /// # Errors
    ///
    /// Without a key, the first transient failure already surfaces as
    /// [`ExportError::RemoteUnavailable`] with an attempt count of 1.
    pub async fn execute_create<T, F, Fut>(
        &self,
        operation: &str,
        idempotency_key: Option<&str>,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = service_traits::Result<T>>,
    {
        if idempotency_key.is_some() {
            return self.execute_read(operation, call).await;
        }

        match call().await {
            Ok(value) => Ok(value),
            Err(error) => {
                if error.is_transient() {
                    warn!(
                        operation,
                        error = %error,
                        "Transient failure on a creation without an idempotency key, not retrying"
                    );
                }
                Err(ExportError::from_service(error, 1))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
