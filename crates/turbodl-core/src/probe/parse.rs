//! Parse HTTP response header lines.

use super::HeadResult;

/// Inclusive span and optional total from a `Content-Range: bytes a-b/total` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

/// Status code from a status line such as `HTTP/1.1 206 Partial Content`.
pub(crate) fn parse_status_line(line: &str) -> Option<u32> {
    let mut parts = line.split_whitespace();
    let proto = parts.next()?;
    if !proto.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// Parses `bytes start-end/total` (total may be `*`).
pub(crate) fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim();
    let rest = rest
        .strip_prefix("bytes ")
        .or_else(|| rest.strip_prefix("bytes="))?;
    let (span, total) = rest.trim().split_once('/')?;
    let (start, end) = span.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    if end < start {
        return None;
    }
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some(ContentRange { start, end, total })
}

/// Value of the first header called `name` (case-insensitive).
pub(crate) fn header_value<'a>(lines: &'a [String], name: &str) -> Option<&'a str> {
    lines.iter().find_map(|line| {
        let (n, v) = line.split_once(':')?;
        if n.trim().eq_ignore_ascii_case(name) {
            Some(v.trim())
        } else {
            None
        }
    })
}

/// Parse the header lines of one response into a `HeadResult`.
/// `lines` should start at that response's status line.
pub(crate) fn parse_headers(lines: &[String]) -> HeadResult {
    let mut head = HeadResult::default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(code) = parse_status_line(line) {
            head.status = Some(code);
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                if let Ok(n) = value.parse::<u64>() {
                    head.content_length = Some(n);
                }
            } else if name.eq_ignore_ascii_case("accept-ranges") {
                head.accept_ranges = value.eq_ignore_ascii_case("bytes");
            } else if name.eq_ignore_ascii_case("content-range") {
                head.content_range = parse_content_range(value);
            } else if name.eq_ignore_ascii_case("etag") {
                head.etag = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("last-modified") {
                head.last_modified = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("content-disposition") {
                head.content_disposition = Some(value.to_string());
            }
        }
    }

    head
}
