//! Deadline and retry discipline for one-shot backend calls.

use std::future::Future;
use std::time::Duration;

use pipeline_logging::{pipeline_debug, pipeline_warn};

use crate::RequestError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Wait before the second attempt; doubles for every further attempt.
    pub initial_delay: Duration,
    /// Deadline for each individual attempt.
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            deadline: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt `attempt` (0-indexed): `initial_delay * 2^attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(multiplier)
            .unwrap_or(Duration::MAX)
    }

    /// Same policy with a different per-attempt deadline.
    pub fn with_deadline(&self, deadline: Duration) -> Self {
        Self {
            deadline,
            ..self.clone()
        }
    }
}

/// Runs `call` with a deadline. On expiry the future is dropped, which aborts
/// the in-flight HTTP request, and `Timeout` is returned.
pub async fn send_timed<F, T>(deadline: Duration, call: F) -> Result<T, RequestError>
where
    F: Future<Output = Result<T, RequestError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(RequestError::Timeout(deadline)),
    }
}

/// Runs `op` through [`send_timed`] up to `policy.max_attempts` times.
///
/// `op` receives the 0-indexed attempt number and must build a fresh request
/// each time. Only transient failures are retried; a received response is
/// returned to the caller as-is, error or not.
pub async fn send_with_retry<F, Fut, T>(
    label: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, RequestError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        pipeline_debug!("{} attempt {}/{}", label, attempt + 1, attempts);
        let err = match send_timed(policy.deadline, op(attempt)).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => err,
        };

        if attempt + 1 >= attempts {
            pipeline_warn!("{} failed after {} attempts: {}", label, attempts, err);
            return Err(RequestError::RetriesExhausted {
                attempts,
                last: Box::new(err),
            });
        }

        let delay = policy.delay_for_attempt(attempt);
        pipeline_warn!(
            "{} attempt {}/{} failed: {}; retrying in {}ms",
            label,
            attempt + 1,
            attempts,
            err,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4000));
    }

    #[test]
    fn delay_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(u64::MAX / 2),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(40), Duration::MAX);
    }
}
