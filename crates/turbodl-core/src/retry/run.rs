//! Retry loop: run a closure until success, a non-retryable error, or cancellation.

use crate::control::{sleep_unless_cancelled, CancelToken};

use super::classify;
use super::error::{ChunkError, ChunkFailure};
use super::policy::{RetryDecision, RetryPolicy};

/// Runs `f` until it succeeds or the retry policy says to stop.
/// `f` receives the 1-based attempt number. On a retryable failure the loop
/// sleeps for the backoff delay; a cancelled `token` ends the loop with
/// `ChunkError::Cancelled`.
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    token: &CancelToken,
    mut f: F,
) -> Result<T, ChunkFailure>
where
    F: FnMut(u32) -> Result<T, ChunkError>,
{
    let mut attempt = 1u32;
    loop {
        if token.is_cancelled() {
            return Err(ChunkFailure {
                error: ChunkError::Cancelled,
                attempts: attempt - 1,
            });
        }
        match f(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => {
                        return Err(ChunkFailure {
                            error: e,
                            attempts: attempt,
                        })
                    }
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(attempt, error = %e, delay_ms = d.as_millis() as u64, "retrying");
                        if !sleep_unless_cancelled(d, token) {
                            return Err(ChunkFailure {
                                error: ChunkError::Cancelled,
                                attempts: attempt,
                            });
                        }
                        attempt += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let token = CancelToken::new();
        let mut calls = 0;
        let res = run_with_retry(&fast_policy(3), &token, |attempt| {
            calls += 1;
            if attempt < 3 {
                Err(ChunkError::PartialWrite {
                    expected: 10,
                    received: 1,
                })
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(res.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn stops_at_max_attempts() {
        let token = CancelToken::new();
        let res: Result<(), _> = run_with_retry(&fast_policy(3), &token, |_| Err(ChunkError::Http(503)));
        let failure = res.unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert!(matches!(failure.error, ChunkError::Http(503)));
    }

    #[test]
    fn range_rejection_is_not_retried() {
        let token = CancelToken::new();
        let mut calls = 0;
        let res: Result<(), _> = run_with_retry(&fast_policy(3), &token, |_| {
            calls += 1;
            Err(ChunkError::RangeRejected {
                status: 200,
                detail: "full content".into(),
            })
        });
        assert_eq!(res.unwrap_err().attempts, 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn cancelled_token_skips_work() {
        let token = CancelToken::new();
        token.cancel();
        let res: Result<(), _> = run_with_retry(&fast_policy(3), &token, |_| Ok(()));
        let failure = res.unwrap_err();
        assert!(matches!(failure.error, ChunkError::Cancelled));
        assert_eq!(failure.attempts, 0);
    }
}
