//! Retry and backoff policy for chunk fetches.
//!
//! This module encapsulates error classification (timeouts, throttling,
//! connection failures, short bodies) and exponential backoff decisions so the
//! fetcher and the coordinator share one consistent policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::{ChunkError, ChunkFailure};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
