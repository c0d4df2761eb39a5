//! CLI command handlers, one per file.

mod checksum;
mod completions;
mod get;
mod man;
mod probe;

pub use checksum::run_checksum;
pub use completions::run_completions;
pub use get::run_get;
pub use man::run_man;
pub use probe::run_probe;

use anyhow::{Context, Result};
use turbodl_core::http::parse_header_arg;

/// Parses repeated `-H 'Name: value'` arguments.
pub(crate) fn parse_headers(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|h| {
            parse_header_arg(h).with_context(|| format!("invalid header {h:?}, expected 'Name: value'"))
        })
        .collect()
}

/// Human-readable byte count (binary units).
pub(crate) fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
