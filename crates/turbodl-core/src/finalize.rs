//! Atomic relocation of the merged output into the destination directory.
//!
//! Staging lives under the destination directory by default, so this is a
//! same-filesystem rename. With [`CollisionPolicy::Fail`] the file is first
//! hard-linked to its final name (which fails atomically if the name is
//! taken, even against a concurrent session) and the working name is then
//! unlinked. Filesystems without hard links get an existence check followed
//! by a rename.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::TransferError;

/// What to do when `<destination>/<filename>` already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    #[default]
    Fail,
    Overwrite,
}

/// Moves `temp_output` to `<destination_dir>/<filename>` and returns that path.
pub fn finalize(
    temp_output: &Path,
    destination_dir: &Path,
    filename: &str,
    policy: CollisionPolicy,
) -> Result<PathBuf, TransferError> {
    fs::create_dir_all(destination_dir).map_err(|e| {
        TransferError::disk(format!("create {}", destination_dir.display()), e)
    })?;
    let final_path = destination_dir.join(filename);
    let stage = || format!("move to {}", final_path.display());

    match policy {
        CollisionPolicy::Overwrite => {
            fs::rename(temp_output, &final_path).map_err(|e| TransferError::disk(stage(), e))?;
        }
        CollisionPolicy::Fail => match fs::hard_link(temp_output, &final_path) {
            Ok(()) => {
                if let Err(e) = fs::remove_file(temp_output) {
                    tracing::warn!(path = %temp_output.display(), error = %e, "could not unlink working output");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(TransferError::AlreadyExists { path: final_path });
            }
            Err(e) => {
                tracing::debug!(error = %e, "hard link unavailable, renaming");
                if final_path.exists() {
                    return Err(TransferError::AlreadyExists { path: final_path });
                }
                fs::rename(temp_output, &final_path)
                    .map_err(|e| TransferError::disk(stage(), e))?;
            }
        },
    }

    tracing::info!(path = %final_path.display(), "download finalized");
    Ok(final_path)
}
