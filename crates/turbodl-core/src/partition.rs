//! Range math: splitting a resource into chunk byte ranges.
//!
//! Ranges use inclusive bounds, matching the HTTP `Range` header. For a given
//! total size the output is contiguous, non-overlapping, ordered by index and
//! covers `[0, total_size)` exactly.

/// Upper bound on parallel ranges per download; each range runs on its own thread.
pub const MAX_CHUNK_COUNT: usize = 64;

/// One chunk's byte span `[start, end]` (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Position of this range in the resource (0-based).
    pub index: usize,
    /// First byte offset (inclusive).
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes in this range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false for ranges built by [`partition`]; `end < start` is never produced.
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// HTTP Range header value: `bytes=start-end`.
    pub fn range_header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Value for curl's `range` option (no `bytes=` prefix).
    pub(crate) fn curl_range(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }

    /// True when this range is the entire resource. A server may answer such a
    /// request with plain `200 OK` without corrupting anything.
    pub fn covers_whole(&self, total_size: u64) -> bool {
        self.start == 0 && self.end + 1 == total_size
    }
}

/// Size of every range but (possibly) the last: `ceil(total_size / chunk_count)`.
fn chunk_size(total_size: u64, chunk_count: usize) -> u64 {
    let n = chunk_count.max(1) as u64;
    total_size.div_ceil(n)
}

/// Number of non-empty ranges `partition` yields for these inputs.
///
/// Never exceeds `min(chunk_count, total_size)`; zero only when `total_size` is 0.
pub fn effective_chunk_count(total_size: u64, chunk_count: usize) -> usize {
    if total_size == 0 {
        return 0;
    }
    total_size.div_ceil(chunk_size(total_size, chunk_count)) as usize
}

/// Splits `total_size` bytes into at most `chunk_count` ranges.
///
/// Every range but the last holds `ceil(total_size / chunk_count)` bytes; the
/// last one ends at `total_size - 1`. Ranges that would start past the end of
/// the resource (small files with many workers) are dropped. A `chunk_count`
/// of 0 is treated as 1.
pub fn partition(total_size: u64, chunk_count: usize) -> Vec<ByteRange> {
    if total_size == 0 {
        return Vec::new();
    }

    let size = chunk_size(total_size, chunk_count);
    let count = effective_chunk_count(total_size, chunk_count);
    let last = total_size - 1;

    (0..count)
        .map(|index| {
            let start = index as u64 * size;
            ByteRange {
                index,
                start,
                end: (start + size - 1).min(last),
            }
        })
        .collect()
}
