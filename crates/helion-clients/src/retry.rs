// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// Exponential-backoff retry harness shared by all three external clients (§4.3). Rate
// limited responses back off without counting against the attempt budget's "failure"
// semantics in the caller's metering, but they DO consume an attempt here — the provider
// asked us to slow down, not to give up.

use std::time::Duration;

use tracing::warn;

use crate::error::{ClientError, ClientResult};

/// A named backoff preset. `initial_delay` doubles (`multiplier` 2) each retry, capped at
/// `max_delay`, for up to `max_attempts` total tries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Default provider-call policy: 3 attempts, 500ms-1500ms initial backoff, capped
    /// at 30s (§4.3).
    pub const fn default_preset() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(800),
            multiplier: 2,
            max_delay: Duration::from_secs(30),
        }
    }

    /// "critical" preset used by the apply protocol: up to 5 attempts, 2s-30s (§4.6.8.2).
    pub const fn critical_preset() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            multiplier: 2,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Clear-active preset: 3 attempts, fixed 1.2s backoff (§4.6.9.1).
    pub const fn clear_preset() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1200),
            multiplier: 1,
            max_delay: Duration::from_millis(1200),
        }
    }

    /// Verification-read preset: up to 3 attempts (§4.6.8.5).
    pub const fn verify_preset() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2,
            max_delay: Duration::from_secs(5),
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.saturating_mul(self.multiplier.saturating_pow(attempt));
        scaled.min(self.max_delay)
    }
}

/// Run `op` under `policy`, retrying on [`ClientError::is_retryable`] errors (which
/// includes rate-limiting) and giving up immediately on anything else.
pub async fn retry<F, Fut, T>(policy: RetryPolicy, label: &str, mut op: F) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ClientResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 >= policy.max_attempts || !err.is_retryable() => {
                return Err(ClientError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: Box::new(err),
                });
            }
            Err(err) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    call = label,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying external call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
