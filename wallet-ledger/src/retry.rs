//! Bounded retry for units of work that lose a lock or commit race

use crate::{config::RetryConfig, metrics::Metrics, Error, Result};
use std::time::Duration;

/// Run `attempt` until it succeeds, fails with a non-conflict error, or the
/// attempt budget is spent.
///
/// Each attempt must open its own unit of work; nothing from a failed
/// attempt is carried over. Backoff doubles after every conflict. When the
/// budget runs out the error is [`Error::TransientConflict`], which callers
/// may resubmit with the same reference.
pub fn with_retry<T>(
    policy: &RetryConfig,
    metrics: &Metrics,
    operation: &str,
    mut attempt: impl FnMut(u32) -> Result<T>,
) -> Result<T> {
    let max_attempts = policy.max_attempts.max(1);

    for n in 1..=max_attempts {
        match attempt(n) {
            Err(Error::Conflict(reason)) => {
                if n == max_attempts {
                    tracing::warn!(
                        operation,
                        attempts = n,
                        %reason,
                        "Retry budget exhausted"
                    );
                    break;
                }

                let delay = backoff(policy.initial_backoff_ms, n);
                tracing::warn!(
                    operation,
                    attempt = n,
                    delay_ms = delay.as_millis() as u64,
                    %reason,
                    "Unit of work conflicted, retrying"
                );
                metrics.record_conflict_retry();
                std::thread::sleep(delay);
            }
            other => return other,
        }
    }

    Err(Error::TransientConflict {
        attempts: max_attempts,
    })
}

/// Delay after the `attempt`-th failure: initial, 2x, 4x, ...
fn backoff(initial_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64 << (attempt - 1).min(10);
    Duration::from_millis(initial_ms.saturating_mul(factor))
}
