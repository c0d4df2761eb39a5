//! Shared libcurl setup for probe and chunk requests.

use std::time::Duration;

use curl::easy::{Easy2, Handler, List};

/// Agent sent when none is configured; some file hosts refuse curl's default.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// Default write buffer between the socket and a staging artifact.
pub const DEFAULT_BUFFER_BYTES: usize = 64 * 1024;

/// Connection and transfer settings applied to every request of a session.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Extra request headers, e.g. from a resolver (`Cookie`, `Referer`).
    pub headers: Vec<(String, String)>,
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// A transfer averaging under 1 byte/s over this window fails as a
    /// timeout. libcurl checks speed once per second, so detection can lag the
    /// window by several seconds.
    pub stall_timeout: Duration,
    /// Capacity of the buffered writer in front of each staging artifact.
    pub buffer_size: usize,
    pub max_redirects: u32,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(30),
            stall_timeout: Duration::from_secs(30),
            buffer_size: DEFAULT_BUFFER_BYTES,
            max_redirects: 10,
        }
    }
}

/// Applies URL, redirects, timeouts, user agent and headers to `easy`.
/// `extra` holds complete header lines (`Name: value`) for this request only.
/// Enables the progress callback so handlers can observe cancellation.
pub(crate) fn configure<H: Handler>(
    easy: &mut Easy2<H>,
    url: &str,
    opts: &HttpOptions,
    extra: &[String],
) -> Result<(), curl::Error> {
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(opts.max_redirects)?;
    easy.connect_timeout(opts.connect_timeout)?;
    easy.useragent(&opts.user_agent)?;
    // Below 1 byte/s for the whole stall window counts as stalled.
    easy.low_speed_limit(1)?;
    easy.low_speed_time(opts.stall_timeout)?;
    easy.progress(true)?;

    let mut list = List::new();
    for (k, v) in &opts.headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    for line in extra {
        list.append(line)?;
    }
    if !opts.headers.is_empty() || !extra.is_empty() {
        easy.http_headers(list)?;
    }
    Ok(())
}

/// Parses a `Name: value` header argument (as given on the command line).
pub fn parse_header_arg(raw: &str) -> Option<(String, String)> {
    let (name, value) = raw.split_once(':')?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
