//! Chunk fetch error type for retry classification.

use thiserror::Error;

/// Error returned by a single chunk fetch attempt. Classified before it is
/// converted into a session-level `TransferError`.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Curl reported an error (timeout, stall, connection, DNS, ...).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// HTTP response had an error status.
    #[error("HTTP {0}")]
    Http(u32),
    /// The server ignored the Range header or answered for a different span.
    /// Nothing from that response is written to the staging artifact.
    #[error("range rejected: HTTP {status}, {detail}")]
    RangeRejected { status: u32, detail: String },
    /// The body ended before the range length was reached, or ran past it.
    #[error("partial write: expected {expected} bytes, got {received}")]
    PartialWrite { expected: u64, received: u64 },
    /// Writing the staging artifact failed (disk full, permission denied). Not retried.
    #[error("storage: {0}")]
    Disk(#[source] std::io::Error),
    /// The session's cancel token fired mid-transfer.
    #[error("cancelled")]
    Cancelled,
}

/// The last error of a chunk together with how many attempts were made.
#[derive(Debug)]
pub struct ChunkFailure {
    pub error: ChunkError,
    pub attempts: u32,
}
