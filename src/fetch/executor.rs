// =============================================================================
// Resilient Fetch Executor: bounded retry with backoff
// =============================================================================
//
// Wraps any async request in an attempt loop:
//
//   attempt 1          -> no delay
//   attempt n (n > 1)  -> delay = base * (n - 1)        (Linear, default)
//                         delay = base * 2^(n - 2)      (Exponential)
//
// Every kind of failure (transport, non-success status, unusable payload)
// consumes one attempt. Once the budget is spent the executor returns a
// `FetchFailure` carrying the last error; it never panics and never lets an
// error escape in any other form.
//
// The executor holds no mutable state and may be cloned freely and used from
// many tasks at once.
// =============================================================================

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::error::{FetchError, FetchFailure};

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Linear,
    Exponential,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Linear
    }
}

/// Attempt budget and delay schedule for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    /// Attempt budget, never below one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait before `attempt` (1-based).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(attempt - 1),
            Backoff::Exponential => {
                let shift = (attempt - 2).min(16);
                self.base_delay.saturating_mul(1u32 << shift)
            }
        }
    }

    /// Sum of all inter-attempt delays for a request that fails every time.
    /// Network round trips come on top of this.
    pub fn worst_case_delay(&self) -> Duration {
        (1..=self.attempts())
            .map(|n| self.delay_before(n))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

enum AttemptOutcome {
    Succeeded,
    Failed(String),
}

/// Bookkeeping for one attempt; dropped once the request resolves.
struct FetchAttempt {
    attempt_number: u32,
    started_at: Instant,
    outcome: AttemptOutcome,
}

/// One-line account of an attempt history, offsets relative to the first
/// attempt: `#1 +0ms failed: .. ; #2 +1000ms ok`.
fn describe_attempts(history: &[FetchAttempt]) -> String {
    let Some(first) = history.first() else {
        return String::new();
    };
    history
        .iter()
        .map(|a| {
            let offset_ms = a.started_at.duration_since(first.started_at).as_millis();
            match &a.outcome {
                AttemptOutcome::Succeeded => format!("#{} +{offset_ms}ms ok", a.attempt_number),
                AttemptOutcome::Failed(err) => {
                    format!("#{} +{offset_ms}ms failed: {err}", a.attempt_number)
                }
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Runs requests under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct FetchExecutor {
    policy: RetryPolicy,
}

impl FetchExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `op` under the executor's default policy.
    pub async fn execute<T, F, Fut>(&self, label: &str, op: F) -> Result<T, FetchFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        self.execute_with(label, &self.policy, op).await
    }

    /// Run `op` under an explicit policy.
    pub async fn execute_with<T, F, Fut>(
        &self,
        label: &str,
        policy: &RetryPolicy,
        mut op: F,
    ) -> Result<T, FetchFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = policy.attempts();
        let mut history: Vec<FetchAttempt> = Vec::with_capacity(max_attempts as usize);
        let mut attempt = 1;

        loop {
            let delay = policy.delay_before(attempt);
            if !delay.is_zero() {
                debug!(label, attempt, delay_ms = delay.as_millis() as u64, "backing off before retry");
                tokio::time::sleep(delay).await;
            }

            let started_at = Instant::now();
            debug!(label, attempt, max_attempts, "request attempt");

            match op().await {
                Ok(value) => {
                    history.push(FetchAttempt {
                        attempt_number: attempt,
                        started_at,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    if attempt > 1 {
                        debug!(label, history = %describe_attempts(&history), "request recovered after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        label,
                        attempt,
                        max_attempts,
                        transient = e.is_transient(),
                        elapsed_ms = started_at.elapsed().as_millis() as u64,
                        error = %e,
                        "request attempt failed"
                    );
                    history.push(FetchAttempt {
                        attempt_number: attempt,
                        started_at,
                        outcome: AttemptOutcome::Failed(e.to_string()),
                    });

                    if attempt >= max_attempts {
                        let total_ms = history
                            .first()
                            .map(|first| first.started_at.elapsed().as_millis() as u64)
                            .unwrap_or(0);
                        error!(
                            label,
                            attempts = max_attempts,
                            total_ms,
                            history = %describe_attempts(&history),
                            "all request attempts failed"
                        );
                        return Err(FetchFailure {
                            label: label.to_string(),
                            attempts: attempt,
                            last_error: e,
                        });
                    }
                }
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_attempts: u32, backoff: Backoff) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1000),
            backoff,
        }
    }

    #[test]
    fn linear_delays() {
        let p = policy(3, Backoff::Linear);
        assert_eq!(p.delay_before(1), Duration::ZERO);
        assert_eq!(p.delay_before(2), Duration::from_millis(1000));
        assert_eq!(p.delay_before(3), Duration::from_millis(2000));
        assert_eq!(p.worst_case_delay(), Duration::from_millis(3000));
        assert!(p.worst_case_delay() <= p.base_delay * p.max_attempts);
    }

    #[test]
    fn exponential_delays() {
        let p = policy(5, Backoff::Exponential);
        let delays: Vec<u128> = (1..=5).map(|n| p.delay_before(n).as_millis()).collect();
        assert_eq!(delays, vec![0, 1000, 2000, 4000, 8000]);
    }

    #[test]
    fn attempt_history_reads_as_offsets() {
        let start = Instant::now();
        let history = vec![
            FetchAttempt {
                attempt_number: 1,
                started_at: start,
                outcome: AttemptOutcome::Failed("HTTP 503".into()),
            },
            FetchAttempt {
                attempt_number: 2,
                started_at: start + Duration::from_millis(1000),
                outcome: AttemptOutcome::Succeeded,
            },
        ];
        assert_eq!(describe_attempts(&history), "#1 +0ms failed: HTTP 503; #2 +1000ms ok");
        assert_eq!(describe_attempts(&[]), "");
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_source_uses_exact_attempt_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = FetchExecutor::new(policy(3, Backoff::Linear));
        let started = Instant::now();

        let counter = calls.clone();
        let result: Result<(), FetchFailure> = executor
            .execute("always-fails", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::Transport("connection refused".into()))
                }
            })
            .await;

        let failure = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(failure.attempts, 3);
        assert!(matches!(failure.last_error, FetchError::Transport(_)));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3000));
        assert!(elapsed < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_on_second_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = FetchExecutor::default();

        let counter = calls.clone();
        let value = executor
            .execute("flaky", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(FetchError::invalid("empty array"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempt_budget_still_tries_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = FetchExecutor::default();
        let counter = calls.clone();

        let result: Result<(), FetchFailure> = executor
            .execute_with("zero-budget", &policy(0, Backoff::Linear), || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::invalid("missing field"))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
