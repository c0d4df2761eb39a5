//! Filename derivation for downloads.
//!
//! The local name comes from `Content-Disposition` when the server sends one,
//! otherwise from the last URL path segment, and is always sanitized so it
//! stays inside the destination directory.

mod content_disposition;
mod path;
mod sanitize;

pub use content_disposition::parse_content_disposition_filename;
pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename;

/// Used when neither the header nor the URL yields a usable name.
pub const DEFAULT_FILENAME: &str = "download.bin";

/// Derives a safe filename for saving a download.
///
/// - `derive_filename("https://example.com/archive.zip", None)` → `"archive.zip"`
/// - `derive_filename("https://example.com/", Some("attachment; filename=\"report.pdf\""))` → `"report.pdf"`
pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    let candidate = content_disposition
        .and_then(parse_content_disposition_filename)
        .or_else(|| filename_from_url_path(url));

    match candidate.map(|c| sanitize_filename(&c)) {
        Some(name) if !name.is_empty() => name,
        _ => DEFAULT_FILENAME.to_string(),
    }
}
