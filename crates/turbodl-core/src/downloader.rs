//! End-to-end download of one direct URL:
//! probe → partition → fan-out fetch → merge → (checksum) → finalize.
//!
//! Everything mutable lives in the [`DownloadSession`] and [`StagingArea`]
//! created here and dropped before returning, so an error at any step leaves
//! neither staging artifacts nor a file under the final name.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::checksum::verify_sha256;
use crate::config::TurboConfig;
use crate::control::CancelToken;
use crate::coordinator::Coordinator;
use crate::error::TransferError;
use crate::finalize::{finalize, CollisionPolicy};
use crate::http::{HttpOptions, DEFAULT_USER_AGENT};
use crate::merge::merge;
use crate::partition::{partition, MAX_CHUNK_COUNT};
use crate::probe::{probe_head, TransferSpec};
use crate::progress::Progress;
use crate::retry::RetryPolicy;
use crate::session::DownloadSession;
use crate::staging::StagingArea;
use crate::url_model::sanitize_filename;

/// What to download and where to put it.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Direct URL (already resolved).
    pub url: String,
    pub destination_dir: PathBuf,
    /// Parent for the session's staging directory; defaults to `destination_dir`.
    pub staging_root: Option<PathBuf>,
    /// Requested parallel ranges, clamped to `1..=MAX_CHUNK_COUNT`.
    pub chunk_count: usize,
    pub collision: CollisionPolicy,
    /// Overrides the name derived from headers or URL.
    pub filename: Option<String>,
    /// Hex SHA-256 the merged file must match.
    pub expected_sha256: Option<String>,
    /// Fall back to one whole-file request when the server does not accept ranges.
    pub allow_single_stream: bool,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination_dir: destination_dir.into(),
            staging_root: None,
            chunk_count: 8,
            collision: CollisionPolicy::Fail,
            filename: None,
            expected_sha256: None,
            allow_single_stream: true,
        }
    }
}

/// Transport and policy knobs shared by every request of a session.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub http: HttpOptions,
    pub retry: RetryPolicy,
    pub session_timeout: Option<Duration>,
    pub fsync: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            http: HttpOptions::default(),
            retry: RetryPolicy::default(),
            session_timeout: Some(crate::config::DEFAULT_SESSION_TIMEOUT),
            fsync: true,
        }
    }
}

impl DownloadOptions {
    pub fn from_config(cfg: &TurboConfig) -> Self {
        Self {
            http: HttpOptions {
                headers: Vec::new(),
                user_agent: cfg
                    .user_agent
                    .clone()
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
                connect_timeout: Duration::from_secs(cfg.connect_timeout_secs.max(1)),
                stall_timeout: Duration::from_secs(cfg.stall_timeout_secs.max(1)),
                buffer_size: cfg.buffer_bytes.max(1),
                ..HttpOptions::default()
            },
            retry: cfg.retry.to_policy(),
            session_timeout: cfg.session_timeout(),
            fsync: cfg.fsync,
        }
    }
}

/// Outcome of a finished download.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub spec: TransferSpec,
    /// True when ranges were unavailable and one whole-file request was used.
    pub single_stream: bool,
    pub elapsed: Duration,
}

/// Downloads `req.url` into `req.destination_dir`.
///
/// Blocks the calling thread; use [`download_async`] from async code.
pub fn download(
    req: &DownloadRequest,
    opts: &DownloadOptions,
    cancel: &CancelToken,
    progress: Option<&Progress>,
) -> Result<DownloadReport, TransferError> {
    let started = Instant::now();

    let chunk_count = req.chunk_count.clamp(1, MAX_CHUNK_COUNT);
    if chunk_count != req.chunk_count {
        tracing::warn!(
            requested = req.chunk_count,
            chunks = chunk_count,
            "chunk count out of range, clamped"
        );
    }

    let head = probe_head(&req.url, &opts.http, cancel)?;
    let mut spec = TransferSpec::from_head(&req.url, &head, chunk_count)?;
    if let Some(name) = req.filename.as_deref().map(sanitize_filename) {
        if !name.is_empty() {
            spec = spec.with_filename(name);
        }
    }

    let single_stream = !spec.accept_ranges;
    if single_stream {
        if !req.allow_single_stream {
            return Err(TransferError::NoRangeSupport);
        }
        tracing::warn!(url = %req.url, "server does not accept ranges, using a single stream");
        spec = spec.with_chunk_count(1);
    }
    tracing::info!(
        url = %req.url,
        filename = %spec.filename,
        total_size = spec.total_size,
        chunks = spec.chunk_count,
        "probed"
    );

    // Cheap early exit; the finalizer still decides atomically.
    let target = req.destination_dir.join(&spec.filename);
    if req.collision == CollisionPolicy::Fail && target.exists() {
        return Err(TransferError::AlreadyExists { path: target });
    }

    let root = req.staging_root.as_ref().unwrap_or(&req.destination_dir);
    let staging = StagingArea::create(root, &spec.filename)
        .map_err(|e| TransferError::disk(format!("create staging under {}", root.display()), e))?;

    let ranges = partition(spec.total_size, spec.chunk_count);
    let mut session = DownloadSession::new(spec.clone(), &ranges, |i| staging.part_path(i));

    Coordinator {
        http: &opts.http,
        retry: &opts.retry,
        session_timeout: opts.session_timeout,
        progress,
    }
    .run(&mut session, &staging, cancel)?;

    let output = merge(&session, &staging.output_path(), opts.fsync)?;
    if let Some(expected) = req.expected_sha256.as_deref() {
        verify_sha256(&output, expected)?;
        tracing::debug!("checksum verified");
    }
    let path = finalize(&output, &req.destination_dir, &spec.filename, req.collision)?;

    let staging_dir = staging.dir().to_path_buf();
    if let Err(e) = staging.close() {
        tracing::warn!(dir = %staging_dir.display(), error = %e, "could not remove staging area");
    }

    Ok(DownloadReport {
        path,
        spec,
        single_stream,
        elapsed: started.elapsed(),
    })
}

/// Runs [`download`] on tokio's blocking pool.
pub async fn download_async(
    req: DownloadRequest,
    opts: DownloadOptions,
    cancel: CancelToken,
    progress: Option<Arc<Progress>>,
) -> Result<DownloadReport, TransferError> {
    tokio::task::spawn_blocking(move || download(&req, &opts, &cancel, progress.as_deref()))
        .await
        .map_err(|e| TransferError::WorkerCrashed(e.to_string()))?
}
