//! Session-level error taxonomy.
//!
//! Every failure that reaches a caller of [`crate::downloader::download`] is a
//! [`TransferError`]. Per-chunk failures start life as
//! [`crate::retry::ChunkError`] so they can be classified and retried locally;
//! once retries are exhausted they are folded in here with the chunk index.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::retry::{ChunkError, ChunkFailure};

#[derive(Debug, Error)]
pub enum TransferError {
    /// The link could not be turned into a direct URL.
    #[error("unsupported source: {0}")]
    SourceUnsupported(String),

    /// The metadata probe could not reach the resource.
    #[error("{url} unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    /// The server does not advertise `Accept-Ranges: bytes`.
    #[error("server does not accept byte ranges")]
    NoRangeSupport,

    /// No usable (non-zero) content length was reported.
    #[error("server did not report a usable content length")]
    UnknownSize,

    /// A chunk request was answered with full content or the wrong span.
    #[error("chunk {index}: range rejected ({reason})")]
    RangeRejected { index: usize, reason: String },

    /// Transient network failure that survived every retry.
    #[error("chunk {index}: network error after {attempts} attempt(s): {reason}")]
    NetworkError {
        index: usize,
        attempts: u32,
        reason: String,
    },

    /// A chunk stream ended before (or ran past) its range length on every attempt.
    #[error("chunk {index}: partial write after {attempts} attempt(s): expected {expected} bytes, got {received}")]
    PartialWrite {
        index: usize,
        attempts: u32,
        expected: u64,
        received: u64,
    },

    /// Local filesystem failure; `stage` names where it happened.
    #[error("{stage}: {source}")]
    DiskError {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    /// A staging part or the merged output does not have the expected length.
    #[error("{stage}: size mismatch, expected {expected} bytes, found {actual}")]
    SizeMismatch {
        stage: String,
        expected: u64,
        actual: u64,
    },

    /// The destination name is taken and the collision policy is `Fail`.
    #[error("{} already exists", path.display())]
    AlreadyExists { path: PathBuf },

    /// The session-level deadline elapsed before every chunk finished.
    #[error("session timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the session.
    #[error("download cancelled")]
    Cancelled,

    /// A worker thread died without reporting a result.
    #[error("worker crashed: {0}")]
    WorkerCrashed(String),

    /// Merge was requested for a session that is not `Completed`.
    #[error("session is not completed; refusing to merge")]
    SessionIncomplete,

    /// Merged output does not match the caller-supplied SHA-256.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

impl TransferError {
    /// Wrap an I/O error with the stage it happened in.
    pub fn disk(stage: impl Into<String>, source: std::io::Error) -> Self {
        TransferError::DiskError {
            stage: stage.into(),
            source,
        }
    }

    /// Fold a chunk's final failure into a session error.
    pub fn from_chunk(index: usize, failure: ChunkFailure) -> Self {
        let attempts = failure.attempts;
        match failure.error {
            ChunkError::RangeRejected { status, detail } => TransferError::RangeRejected {
                index,
                reason: format!("HTTP {status}, {detail}"),
            },
            ChunkError::PartialWrite { expected, received } => TransferError::PartialWrite {
                index,
                attempts,
                expected,
                received,
            },
            ChunkError::Disk(source) => {
                TransferError::disk(format!("chunk {index} staging write"), source)
            }
            ChunkError::Cancelled => TransferError::Cancelled,
            e @ (ChunkError::Curl(_) | ChunkError::Http(_)) => TransferError::NetworkError {
                index,
                attempts,
                reason: e.to_string(),
            },
        }
    }

    /// True for failures that are never worth re-running unchanged.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            TransferError::NoRangeSupport
                | TransferError::RangeRejected { .. }
                | TransferError::SizeMismatch { .. }
                | TransferError::DiskError { .. }
        )
    }
}
