//! Make a name safe to create inside the destination directory.

/// Longest filename most Linux filesystems accept, in bytes.
const NAME_MAX: usize = 255;

/// Sanitizes a candidate filename.
///
/// Path separators, NUL and control characters become `_` so the name can
/// never escape the destination directory. Spaces are kept. Leading and
/// trailing whitespace and dots are trimmed, and the result is cut to
/// `NAME_MAX` bytes on a char boundary.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c.is_whitespace() || c == '.');

    let mut take = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}
