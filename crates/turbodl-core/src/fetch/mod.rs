//! Chunk fetcher: one ranged GET into one staging artifact.
//!
//! A fetch attempt truncates the artifact, streams the response through a
//! buffered writer and succeeds only when exactly `range.len()` bytes landed.
//! A failed attempt deletes whatever it wrote and gives its bytes back to the
//! progress counter, so a retry always starts from an empty artifact.

mod handler;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use curl::easy::Easy2;

use crate::control::CancelToken;
use crate::http::{self, HttpOptions};
use crate::partition::ByteRange;
use crate::retry::{run_with_retry, ChunkError, ChunkFailure, RetryPolicy};
use crate::staging::remove_if_exists;

use handler::ChunkHandler;

/// Everything needed to fetch one range.
#[derive(Debug, Clone, Copy)]
pub struct ChunkRequest<'a> {
    pub url: &'a str,
    pub range: ByteRange,
    /// Size of the whole resource, checked against `Content-Range`.
    pub total_size: u64,
    pub staging_path: &'a Path,
    /// Version validator; a server whose copy changed answers with the full
    /// body, which is then rejected instead of mixed into the output.
    pub if_range: Option<&'a str>,
}

/// One attempt. Returns the number of bytes written (always `range.len()`).
pub fn fetch_chunk(
    req: &ChunkRequest<'_>,
    opts: &HttpOptions,
    cancel: &CancelToken,
    counter: Option<&AtomicU64>,
) -> Result<u64, ChunkError> {
    let file = File::create(req.staging_path).map_err(ChunkError::Disk)?;
    let handler = ChunkHandler::new(
        req.range,
        req.total_size,
        BufWriter::with_capacity(opts.buffer_size.max(1), file),
        counter,
        cancel.clone(),
    );
    let mut easy = Easy2::new(handler);

    let result = perform(&mut easy, req, opts, cancel);
    let written = easy.get_ref().bytes_written;
    drop(easy);

    if result.is_err() {
        if let Some(c) = counter {
            c.fetch_sub(written, Ordering::Relaxed);
        }
        if let Err(e) = remove_if_exists(req.staging_path) {
            tracing::warn!(path = %req.staging_path.display(), error = %e, "could not remove failed chunk artifact");
        }
    }
    result
}

fn perform(
    easy: &mut Easy2<ChunkHandler<'_>>,
    req: &ChunkRequest<'_>,
    opts: &HttpOptions,
    cancel: &CancelToken,
) -> Result<u64, ChunkError> {
    let extra: Vec<String> = req
        .if_range
        .map(|v| format!("If-Range: {v}"))
        .into_iter()
        .collect();
    http::configure(easy, req.url, opts, &extra)?;
    easy.range(&req.range.curl_range())?;

    let performed = easy.perform();
    let expected = req.range.len();

    if let Some(e) = easy.get_mut().failure.take() {
        return Err(e);
    }
    if let Err(e) = performed {
        if e.is_aborted_by_callback() || cancel.is_cancelled() {
            return Err(ChunkError::Cancelled);
        }
        if e.is_partial_file() {
            return Err(ChunkError::PartialWrite {
                expected,
                received: easy.get_ref().bytes_written,
            });
        }
        return Err(ChunkError::Curl(e));
    }

    // No body at all means write() never ran the response check.
    easy.get_ref().check_response()?;
    easy.get_mut().flush()?;

    let received = easy.get_ref().bytes_written;
    if received != expected {
        return Err(ChunkError::PartialWrite { expected, received });
    }
    Ok(received)
}

/// Fetches a chunk, retrying transient failures per `policy`.
pub fn fetch_with_retry(
    req: &ChunkRequest<'_>,
    opts: &HttpOptions,
    policy: &RetryPolicy,
    cancel: &CancelToken,
    counter: Option<&AtomicU64>,
) -> Result<u64, ChunkFailure> {
    run_with_retry(policy, cancel, |attempt| {
        tracing::debug!(
            chunk = req.range.index,
            attempt,
            range = %req.range.range_header_value(),
            "fetching chunk"
        );
        fetch_chunk(req, opts, cancel, counter)
    })
}
