//! Minimal HTTP/1.1 server that supports HEAD and Range GET for integration tests.
//!
//! Serves a single static body, one request per connection. Switches in
//! [`RangeServerOptions`] make it misbehave the way real file hosts do.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405 (simulates servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// If false, omit `Accept-Ranges: bytes` even if ranges work.
    pub advertise_ranges: bool,
    /// A range request starting at this offset gets `200` and the full body.
    pub full_content_at: Option<u64>,
    /// A range request starting at this offset always gets this status.
    pub fail_status_at: Option<(u64, u16)>,
    /// The first N range responses send half their body and hang up.
    pub truncate_first: usize,
    /// The first N range responses send a few bytes, then go silent for
    /// `stall_ms` with the connection open.
    pub stall_first: usize,
    pub stall_ms: u64,
    /// Delay before answering a GET.
    pub delay_ms: u64,
    pub content_disposition: Option<&'static str>,
    /// ETag sent with HEAD responses.
    pub etag: Option<&'static str>,
    /// ETag of the copy GETs are served from; defaults to `etag`. A GET whose
    /// `If-Range` differs from it gets `200` and the full body.
    pub current_etag: Option<&'static str>,
    /// Path component of the served URL.
    pub path: &'static str,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            advertise_ranges: true,
            full_content_at: None,
            fail_status_at: None,
            truncate_first: 0,
            stall_first: 0,
            stall_ms: 15_000,
            delay_ms: 0,
            content_disposition: None,
            etag: None,
            current_etag: None,
            path: "payload.bin",
        }
    }
}

pub struct RangeServer {
    pub url: String,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    gets: AtomicUsize,
    if_range: AtomicUsize,
    truncations: AtomicUsize,
    stalls: AtomicUsize,
}

impl RangeServer {
    /// GET requests served so far.
    pub fn get_count(&self) -> usize {
        self.counters.gets.load(Ordering::SeqCst)
    }

    /// GET requests that carried an `If-Range` header.
    pub fn if_range_count(&self) -> usize {
        self.counters.if_range.load(Ordering::SeqCst)
    }

    /// Range responses that were stalled.
    pub fn stall_count(&self) -> usize {
        self.counters.stalls.load(Ordering::SeqCst)
    }
}

/// Parsed bits of a request head.
struct Request<'a> {
    method: &'a str,
    /// `(start, end_inclusive)` from `Range: bytes=X-Y`.
    range: Option<(u64, u64)>,
    if_range: Option<&'a str>,
}

/// Starts a server in a background thread serving `body`. Runs until the process exits.
pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

/// Like `start` but with custom behavior (HEAD blocked, ranges ignored, etc.).
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let counters = Arc::new(Counters::default());
    {
        let counters = Arc::clone(&counters);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let body = Arc::clone(&body);
                let counters = Arc::clone(&counters);
                thread::spawn(move || handle(stream, &body, opts, &counters));
            }
        });
    }
    RangeServer {
        url: format!("http://127.0.0.1:{port}/{}", opts.path),
        counters,
    }
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    opts: RangeServerOptions,
    counters: &Counters,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let Request {
        method,
        range,
        if_range,
    } = parse_request(request);
    let total = body.len() as u64;
    let is_head = method.eq_ignore_ascii_case("HEAD");
    let current_etag = opts.current_etag.or(opts.etag);

    let mut extra = String::new();
    if opts.advertise_ranges && opts.support_ranges {
        extra.push_str("Accept-Ranges: bytes\r\n");
    }
    if let Some(cd) = opts.content_disposition {
        extra.push_str(&format!("Content-Disposition: {cd}\r\n"));
    }
    if let Some(etag) = if is_head { opts.etag } else { current_etag } {
        extra.push_str(&format!("ETag: {etag}\r\n"));
    }

    if is_head {
        if !opts.head_allowed {
            let _ = stream.write_all(
                b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
            return;
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {total}\r\n{extra}Connection: close\r\n\r\n"
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    counters.gets.fetch_add(1, Ordering::SeqCst);
    if if_range.is_some() {
        counters.if_range.fetch_add(1, Ordering::SeqCst);
    }
    if opts.delay_ms > 0 {
        thread::sleep(Duration::from_millis(opts.delay_ms));
    }

    let range = range.filter(|_| opts.support_ranges);
    let Some((start, end_incl)) = range else {
        write_full(&mut stream, body, &extra);
        return;
    };
    // The copy changed since the validator was taken: ignore the range.
    let stale = if_range.is_some_and(|v| Some(v) != current_etag);
    if stale || opts.full_content_at == Some(start) {
        write_full(&mut stream, body, &extra);
        return;
    }
    if let Some((at, status)) = opts.fail_status_at {
        if at == start {
            let response = format!(
                "HTTP/1.1 {status} Injected\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
            let _ = stream.write_all(response.as_bytes());
            return;
        }
    }

    let end_incl = end_incl.min(total.saturating_sub(1));
    if total == 0 || start > end_incl {
        let response = format!(
            "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{total}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    let slice = &body[start as usize..=end_incl as usize];
    let response = format!(
        "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {start}-{end_incl}/{total}\r\n{extra}Connection: close\r\n\r\n",
        slice.len()
    );
    let _ = stream.write_all(response.as_bytes());

    let stall = counters
        .stalls
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
            (t < opts.stall_first).then_some(t + 1)
        })
        .is_ok();
    if stall {
        let _ = stream.write_all(&slice[..slice.len().min(10)]);
        let _ = stream.flush();
        thread::sleep(Duration::from_millis(opts.stall_ms));
        return;
    }

    let truncate = counters
        .truncations
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
            (t < opts.truncate_first).then_some(t + 1)
        })
        .is_ok();
    if truncate {
        let _ = stream.write_all(&slice[..slice.len() / 2]);
        let _ = stream.flush();
        let _ = stream.shutdown(std::net::Shutdown::Both);
        return;
    }
    let _ = stream.write_all(slice);
}

fn write_full(stream: &mut TcpStream, body: &[u8], extra: &str) {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{extra}Connection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(body);
}

fn parse_request(request: &str) -> Request<'_> {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("");
    let mut parsed = Request {
        method,
        range: None,
        if_range: None,
    };
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("if-range") {
            parsed.if_range = Some(value);
            continue;
        }
        if !name.eq_ignore_ascii_case("range") {
            continue;
        }
        let Some(spec) = value.strip_prefix("bytes=") else {
            continue;
        };
        if let Some((a, b)) = spec.split_once('-') {
            let start = a.trim().parse::<u64>().unwrap_or(0);
            let end = b.trim().parse::<u64>().unwrap_or(u64::MAX);
            parsed.range = Some((start, end));
        }
    }
    parsed
}
