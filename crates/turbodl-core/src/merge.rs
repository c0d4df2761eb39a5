//! Concatenate staging artifacts into the output file.
//!
//! Parts are appended in range-index order taken from the session, never from
//! directory listing order. Each part's length is checked before it is copied
//! and the output's length after; artifacts are deleted only once the output
//! has been verified. On any error the partial output is removed and the
//! artifacts are left for the caller's cleanup.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use crate::error::TransferError;
use crate::partition::ByteRange;
use crate::session::{DownloadSession, SessionOutcome};
use crate::staging::remove_if_exists;

const COPY_BUF: usize = 256 * 1024;

/// One staging artifact and the range it should hold.
#[derive(Debug, Clone)]
pub struct PartRef {
    pub range: ByteRange,
    pub path: PathBuf,
}

/// Merges a `Completed` session into `output` and removes its artifacts.
pub fn merge(
    session: &DownloadSession,
    output: &Path,
    fsync: bool,
) -> Result<PathBuf, TransferError> {
    if session.outcome() != SessionOutcome::Completed {
        return Err(TransferError::SessionIncomplete);
    }
    let parts: Vec<PartRef> = session
        .results()
        .map(|r| PartRef {
            range: r.range,
            path: r.staging_path.clone(),
        })
        .collect();
    merge_parts(parts, output, session.spec().total_size, fsync)?;
    Ok(output.to_path_buf())
}

/// Writes `parts` to `output` sorted by range index, verifies the length and
/// then deletes the parts.
pub fn merge_parts(
    mut parts: Vec<PartRef>,
    output: &Path,
    total_size: u64,
    fsync: bool,
) -> Result<(), TransferError> {
    parts.sort_by_key(|p| p.range.index);

    match write_output(&parts, output, total_size, fsync) {
        Ok(()) => {}
        Err(e) => {
            if let Err(rm) = remove_if_exists(output) {
                tracing::warn!(path = %output.display(), error = %rm, "could not remove partial output");
            }
            return Err(e);
        }
    }

    for p in &parts {
        if let Err(e) = remove_if_exists(&p.path) {
            tracing::warn!(path = %p.path.display(), error = %e, "could not remove merged part");
        }
    }
    tracing::debug!(output = %output.display(), parts = parts.len(), total_size, "merged");
    Ok(())
}

fn write_output(
    parts: &[PartRef],
    output: &Path,
    total_size: u64,
    fsync: bool,
) -> Result<(), TransferError> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(output)
        .map_err(|e| TransferError::disk(format!("create {}", output.display()), e))?;
    preallocate(&file, total_size)
        .map_err(|e| TransferError::disk("preallocate output", e))?;

    let mut writer = BufWriter::with_capacity(COPY_BUF, file);
    let mut written = 0u64;
    for p in parts {
        let stage = || format!("merge chunk {}", p.range.index);
        let part = File::open(&p.path).map_err(|e| TransferError::disk(stage(), e))?;
        let len = part
            .metadata()
            .map_err(|e| TransferError::disk(stage(), e))?
            .len();
        if len != p.range.len() {
            return Err(TransferError::SizeMismatch {
                stage: stage(),
                expected: p.range.len(),
                actual: len,
            });
        }
        let copied = io::copy(&mut BufReader::with_capacity(COPY_BUF, part), &mut writer)
            .map_err(|e| TransferError::disk(stage(), e))?;
        if copied != len {
            return Err(TransferError::SizeMismatch {
                stage: stage(),
                expected: len,
                actual: copied,
            });
        }
        written += copied;
    }

    let file = writer
        .into_inner()
        .map_err(|e| TransferError::disk("flush output", e.into_error()))?;
    if fsync {
        file.sync_all()
            .map_err(|e| TransferError::disk("sync output", e))?;
    }
    let on_disk = file
        .metadata()
        .map_err(|e| TransferError::disk("stat output", e))?
        .len();
    if written != total_size || on_disk != total_size {
        return Err(TransferError::SizeMismatch {
            stage: "merged output".to_string(),
            expected: total_size,
            actual: if written != total_size { written } else { on_disk },
        });
    }
    Ok(())
}

/// Reserves `size` bytes. On Unix tries `posix_fallocate` for real block
/// allocation so a full disk fails here rather than halfway through the copy;
/// falls back to `set_len`.
fn preallocate(file: &File, size: u64) -> io::Result<()> {
    #[cfg(unix)]
    {
        let r = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, size as libc::off_t) };
        if r == 0 {
            return Ok(());
        }
        if r == libc::ENOSPC {
            return Err(io::Error::from_raw_os_error(r));
        }
        tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
    }
    file.set_len(size)
}
