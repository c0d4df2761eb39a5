//! SHA-256 of a finished download.
//!
//! Computed after the merge, not inline with chunk writes; chunks arrive out of
//! order and hashing them on the fly would serialize the workers.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::TransferError;

const BUF_SIZE: usize = 64 * 1024;

/// SHA-256 of the file at `path` as lowercase hex.
pub fn sha256_path(path: &Path) -> io::Result<String> {
    let mut f = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Fails with `ChecksumMismatch` unless `path` hashes to `expected`
/// (hex, case-insensitive).
pub fn verify_sha256(path: &Path, expected: &str) -> Result<(), TransferError> {
    let actual = sha256_path(path).map_err(|e| TransferError::disk("checksum", e))?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(TransferError::ChecksumMismatch {
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        })
    }
}
