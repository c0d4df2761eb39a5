//! Parallel range-partitioned HTTP downloads.
//!
//! A direct URL is probed for size and range support, split into contiguous
//! byte ranges, fetched by one worker per range into session-scoped staging
//! files, merged in range order, verified and atomically moved into place.
//! [`downloader::download`] runs the whole pipeline; the stages are public for
//! callers that need to drive them separately.

pub mod config;
pub mod logging;

pub mod checksum;
pub mod control;
pub mod coordinator;
pub mod downloader;
pub mod error;
pub mod fetch;
pub mod finalize;
pub mod http;
pub mod merge;
pub mod partition;
pub mod probe;
pub mod progress;
pub mod retry;
pub mod session;
pub mod source;
pub mod staging;
pub mod url_model;

pub use control::CancelToken;
pub use downloader::{download, download_async, DownloadOptions, DownloadReport, DownloadRequest};
pub use error::TransferError;
pub use finalize::CollisionPolicy;
pub use progress::{Progress, ProgressStats};
