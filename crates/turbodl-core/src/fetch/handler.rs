//! Easy2 handler for one chunk transfer.
//! Validates the response before the first body byte is written to staging.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::str;
use std::sync::atomic::{AtomicU64, Ordering};

use curl::easy::{Handler, WriteError};

use crate::control::CancelToken;
use crate::partition::ByteRange;
use crate::probe::parse::{header_value, parse_content_range, parse_status_line};
use crate::retry::ChunkError;

pub(super) struct ChunkHandler<'a> {
    range: ByteRange,
    total_size: u64,
    file: BufWriter<File>,
    headers: Vec<String>,
    status: Option<u32>,
    /// None until the response has been checked.
    accepted: Option<bool>,
    /// First error hit inside a callback; curl only sees a short write.
    pub(super) failure: Option<ChunkError>,
    pub(super) bytes_written: u64,
    counter: Option<&'a AtomicU64>,
    cancel: CancelToken,
}

impl<'a> ChunkHandler<'a> {
    pub(super) fn new(
        range: ByteRange,
        total_size: u64,
        file: BufWriter<File>,
        counter: Option<&'a AtomicU64>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            range,
            total_size,
            file,
            headers: Vec::new(),
            status: None,
            accepted: None,
            failure: None,
            bytes_written: 0,
            counter,
            cancel,
        }
    }

    /// Checks status and `Content-Range` of the final response.
    ///
    /// `206` must cover exactly this range. A plain `200` is only usable when
    /// the range is the whole resource; otherwise it is the full body and must
    /// not be written.
    pub(super) fn check_response(&self) -> Result<(), ChunkError> {
        let status = self.status.unwrap_or(0);
        match status {
            206 => {
                let cr = header_value(&self.headers, "content-range").and_then(parse_content_range);
                match cr {
                    Some(cr)
                        if cr.start == self.range.start
                            && cr.end == self.range.end
                            && cr.total.map_or(true, |t| t == self.total_size) =>
                    {
                        Ok(())
                    }
                    Some(cr) => Err(ChunkError::RangeRejected {
                        status,
                        detail: format!(
                            "asked for {}-{}/{}, got {}-{}/{}",
                            self.range.start,
                            self.range.end,
                            self.total_size,
                            cr.start,
                            cr.end,
                            cr.total.map_or_else(|| "*".to_string(), |t| t.to_string())
                        ),
                    }),
                    None => Err(ChunkError::RangeRejected {
                        status,
                        detail: "missing or malformed Content-Range".to_string(),
                    }),
                }
            }
            200 if self.range.covers_whole(self.total_size) => Ok(()),
            200 => Err(ChunkError::RangeRejected {
                status,
                detail: "server sent full content".to_string(),
            }),
            s if s >= 400 => Err(ChunkError::Http(s)),
            s => Err(ChunkError::RangeRejected {
                status: s,
                detail: "unexpected status".to_string(),
            }),
        }
    }

    /// Flushes buffered bytes to the staging file.
    pub(super) fn flush(&mut self) -> Result<(), ChunkError> {
        self.file.flush().map_err(ChunkError::Disk)
    }

    fn fail(&mut self, e: ChunkError) -> Result<usize, WriteError> {
        self.failure = Some(e);
        self.accepted = Some(false);
        Ok(0)
    }
}

impl Handler for ChunkHandler<'_> {
    fn header(&mut self, data: &[u8]) -> bool {
        if let Ok(s) = str::from_utf8(data) {
            let line = s.trim_end();
            if let Some(code) = parse_status_line(line) {
                self.headers.clear();
                self.status = Some(code);
            }
            if !line.is_empty() {
                self.headers.push(line.to_string());
            }
        }
        true
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        if self.accepted.is_none() {
            if let Err(e) = self.check_response() {
                return self.fail(e);
            }
            self.accepted = Some(true);
        }
        if self.accepted == Some(false) {
            return Ok(0);
        }

        let received = self.bytes_written + data.len() as u64;
        if received > self.range.len() {
            return self.fail(ChunkError::PartialWrite {
                expected: self.range.len(),
                received,
            });
        }
        if let Err(e) = self.file.write_all(data) {
            return self.fail(ChunkError::Disk(e));
        }
        self.bytes_written = received;
        if let Some(c) = self.counter {
            c.fetch_add(data.len() as u64, Ordering::Relaxed);
        }
        Ok(data.len())
    }

    fn progress(&mut self, _dltotal: f64, _dlnow: f64, _ultotal: f64, _ulnow: f64) -> bool {
        !self.cancel.is_cancelled()
    }
}
