//! Filename hint from the last URL path segment.

use super::content_disposition::percent_decode;

/// Last non-empty path segment of `url`, percent-decoded.
///
/// Query and fragment are ignored. `None` when the URL does not parse or the
/// path has no usable segment.
pub fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = percent_decode(segment);
    match decoded.as_str() {
        "" | "." | ".." => None,
        _ => Some(decoded),
    }
}
