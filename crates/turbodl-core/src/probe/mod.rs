//! Metadata probing: total size, filename and range support of a direct URL.
//!
//! Uses a libcurl HEAD request. Servers that refuse HEAD (405/501) or omit
//! `Content-Length` are probed again with a one-byte range GET, reading the
//! total from `Content-Range`. A `206` answer there also proves range support.

pub(crate) mod parse;

use std::time::Duration;

use curl::easy::{Easy2, Handler, WriteError};

use crate::control::CancelToken;
use crate::error::TransferError;
use crate::http::{self, HttpOptions};
use crate::partition::effective_chunk_count;
use crate::url_model::derive_filename;

pub(crate) use parse::ContentRange;

/// Hard cap on one probe request.
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Key headers of a probe response.
#[derive(Debug, Clone, Default)]
pub struct HeadResult {
    /// Status of the final response (after redirects).
    pub status: Option<u32>,
    /// Total size in bytes, if `Content-Length` is present.
    pub content_length: Option<u64>,
    /// True if the server sent `Accept-Ranges: bytes` (or answered a range probe with 206).
    pub accept_ranges: bool,
    /// `Content-Range` of the response, if any.
    pub(crate) content_range: Option<ContentRange>,
    /// `ETag` value as sent (quotes and weak prefix kept).
    pub etag: Option<String>,
    /// `Last-Modified` value if present.
    pub last_modified: Option<String>,
    /// `Content-Disposition` value if present (filename hint).
    pub content_disposition: Option<String>,
}

/// What a download is about to fetch. Built once by the prober, then read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSpec {
    pub source_url: String,
    /// Resource length in bytes; always > 0.
    pub total_size: u64,
    /// Sanitized filename used for staging and the final file.
    pub filename: String,
    /// Number of byte ranges the transfer is split into.
    pub chunk_count: usize,
    /// Whether the server accepts byte-range requests.
    pub accept_ranges: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl TransferSpec {
    /// Builds a spec from probe results. `chunk_count` is the requested worker
    /// count; the stored value is what partitioning will actually produce.
    pub fn from_head(
        url: &str,
        head: &HeadResult,
        chunk_count: usize,
    ) -> Result<Self, TransferError> {
        let total_size = head
            .content_length
            .filter(|n| *n > 0)
            .ok_or(TransferError::UnknownSize)?;
        Ok(Self {
            source_url: url.to_string(),
            total_size,
            filename: derive_filename(url, head.content_disposition.as_deref()),
            chunk_count: effective_chunk_count(total_size, chunk_count),
            accept_ranges: head.accept_ranges,
            etag: head.etag.clone(),
            last_modified: head.last_modified.clone(),
        })
    }

    /// Same transfer with a different worker count.
    pub fn with_chunk_count(mut self, chunk_count: usize) -> Self {
        self.chunk_count = effective_chunk_count(self.total_size, chunk_count);
        self
    }

    /// Same transfer saved under a different name.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Validator for `If-Range`: a strong ETag, else `Last-Modified`.
    /// Weak ETags are not allowed in `If-Range`.
    pub fn if_range(&self) -> Option<&str> {
        self.etag
            .as_deref()
            .filter(|e| !e.starts_with("W/"))
            .or(self.last_modified.as_deref())
    }
}

/// Collects header lines of the final response and stops range-probe bodies.
struct HeaderCollector {
    lines: Vec<String>,
    status: Option<u32>,
    range_probe: bool,
    cancel: CancelToken,
}

impl Handler for HeaderCollector {
    fn header(&mut self, data: &[u8]) -> bool {
        if let Ok(s) = std::str::from_utf8(data) {
            let line = s.trim_end();
            if let Some(code) = parse::parse_status_line(line) {
                // New response (redirect hop or 100-continue): start over.
                self.lines.clear();
                self.status = Some(code);
            }
            if !line.is_empty() {
                self.lines.push(line.to_string());
            }
        }
        true
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        // A range probe needs one byte; anything else means the body is the
        // whole resource, so stop right away.
        if self.range_probe && self.status == Some(206) && data.len() <= 1 {
            Ok(data.len())
        } else {
            Ok(0)
        }
    }

    fn progress(&mut self, _dltotal: f64, _dlnow: f64, _ultotal: f64, _ulnow: f64) -> bool {
        !self.cancel.is_cancelled()
    }
}

fn request(
    url: &str,
    opts: &HttpOptions,
    cancel: &CancelToken,
    range_probe: bool,
) -> Result<HeadResult, TransferError> {
    let unreachable = |e: curl::Error| TransferError::Unreachable {
        url: url.to_string(),
        reason: e.to_string(),
    };

    let mut easy = Easy2::new(HeaderCollector {
        lines: Vec::new(),
        status: None,
        range_probe,
        cancel: cancel.clone(),
    });
    http::configure(&mut easy, url, opts, &[]).map_err(unreachable)?;
    if range_probe {
        easy.range("0-0").map_err(unreachable)?;
    } else {
        easy.nobody(true).map_err(unreachable)?;
    }
    easy.timeout(PROBE_TIMEOUT).map_err(unreachable)?;

    let performed = easy.perform();
    let collector = easy.get_ref();
    if let Err(e) = performed {
        if e.is_aborted_by_callback() || cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        // Write errors are us cutting a range-probe body short on purpose.
        if !(range_probe && e.is_write_error() && collector.status.is_some()) {
            return Err(unreachable(e));
        }
    }
    Ok(parse::parse_headers(&collector.lines))
}

/// One-byte range GET. A 206 carries the total in `Content-Range`; a 200 means
/// the server ignores ranges and `Content-Length` is the full size.
fn probe_with_range(
    url: &str,
    opts: &HttpOptions,
    cancel: &CancelToken,
) -> Result<HeadResult, TransferError> {
    let mut head = request(url, opts, cancel, true)?;
    match head.status {
        Some(206) => {
            head.accept_ranges = true;
            head.content_length = head.content_range.and_then(|cr| cr.total);
        }
        Some(200) => head.accept_ranges = false,
        // Not even byte 0 exists: the resource is empty.
        Some(416) => return Err(TransferError::UnknownSize),
        Some(code) => {
            return Err(TransferError::Unreachable {
                url: url.to_string(),
                reason: format!("range probe returned HTTP {code}"),
            })
        }
        None => {
            return Err(TransferError::Unreachable {
                url: url.to_string(),
                reason: "no HTTP status received".to_string(),
            })
        }
    }
    Ok(head)
}

/// Fetches metadata for `url` without downloading the body.
///
/// Follows redirects. Fails with `Unreachable` on connection failures and
/// error statuses; cancellation through `cancel` yields `Cancelled`.
pub fn probe_head(
    url: &str,
    opts: &HttpOptions,
    cancel: &CancelToken,
) -> Result<HeadResult, TransferError> {
    let head = request(url, opts, cancel, false)?;
    match head.status {
        Some(405) | Some(501) => {
            tracing::debug!(url, "HEAD refused, probing with a range request");
            probe_with_range(url, opts, cancel)
        }
        Some(code) if (200..300).contains(&code) => {
            if head.content_length.filter(|n| *n > 0).is_none() {
                tracing::debug!(url, "HEAD without length, probing with a range request");
                return probe_with_range(url, opts, cancel);
            }
            Ok(head)
        }
        Some(code) => Err(TransferError::Unreachable {
            url: url.to_string(),
            reason: format!("HEAD returned HTTP {code}"),
        }),
        None => Err(TransferError::Unreachable {
            url: url.to_string(),
            reason: "no HTTP status received".to_string(),
        }),
    }
}

/// Probes `url` and builds a `TransferSpec` for `chunk_count` workers.
///
/// Fails with `NoRangeSupport` when the server does not accept ranges; callers
/// that can live with a single stream use [`probe_head`] and
/// [`TransferSpec::from_head`] with `chunk_count = 1` instead.
pub fn probe(
    url: &str,
    opts: &HttpOptions,
    cancel: &CancelToken,
    chunk_count: usize,
) -> Result<TransferSpec, TransferError> {
    let head = probe_head(url, opts, cancel)?;
    let spec = TransferSpec::from_head(url, &head, chunk_count)?;
    if !spec.accept_ranges {
        return Err(TransferError::NoRangeSupport);
    }
    Ok(spec)
}
