//! Classify HTTP status, curl errors and chunk errors into retry kinds.

use super::error::ChunkError;
use super::policy::ErrorKind;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

/// Classify a curl error for retry decisions.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_partial_file() {
        return ErrorKind::Partial;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

/// Classify a chunk error. Range rejection, disk failures and cancellation are
/// never transient.
pub fn classify(e: &ChunkError) -> ErrorKind {
    match e {
        ChunkError::Curl(ce) => classify_curl_error(ce),
        ChunkError::Http(code) => classify_http_status(*code),
        ChunkError::PartialWrite { .. } => ErrorKind::Partial,
        ChunkError::RangeRejected { .. } | ChunkError::Disk(_) | ChunkError::Cancelled => {
            ErrorKind::Other
        }
    }
}
