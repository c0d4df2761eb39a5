//! Session-scoped staging area for chunk artifacts.
//!
//! Each session gets its own temporary directory `<root>/.turbodl-XXXXXX/`.
//! Chunk `i` is staged at `<filename>.part<i>` inside it and the merged output
//! at `<filename>`, so every name is derived from `(filename, index)` alone and
//! two sessions downloading the same filename never touch each other's files.
//! The directory is removed on drop; `close` removes it explicitly and reports
//! failures.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Prefix of every session directory.
pub const SESSION_DIR_PREFIX: &str = ".turbodl-";

/// Suffix between the filename and the chunk index.
pub const PART_SUFFIX: &str = ".part";

#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
    filename: String,
}

impl StagingArea {
    /// Creates a fresh session directory under `root` (created if missing).
    pub fn create(root: &Path, filename: &str) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(SESSION_DIR_PREFIX)
            .tempdir_in(root)?;
        tracing::debug!(dir = %dir.path().display(), "created staging area");
        Ok(Self {
            dir,
            filename: filename.to_string(),
        })
    }

    /// Session directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Staging artifact for chunk `index`: `<dir>/<filename>.part<index>`.
    pub fn part_path(&self, index: usize) -> PathBuf {
        self.dir().join(part_file_name(&self.filename, index))
    }

    /// Working location of the merged output before it is finalized.
    pub fn output_path(&self) -> PathBuf {
        self.dir().join(&self.filename)
    }

    /// Removes one staging artifact; a missing file is not an error.
    pub fn remove_part(&self, index: usize) -> io::Result<()> {
        remove_if_exists(&self.part_path(index))
    }

    /// Files currently in the session directory (empty if it is gone).
    pub fn list(&self) -> Vec<PathBuf> {
        match fs::read_dir(self.dir()) {
            Ok(rd) => rd.flatten().map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Removes the session directory and everything in it. A directory that
    /// is already gone is not an error.
    pub fn close(self) -> io::Result<()> {
        match self.dir.close() {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// `<filename>.part<index>`
pub fn part_file_name(filename: &str, index: usize) -> String {
    format!("{filename}{PART_SUFFIX}{index}")
}

pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
