//! Aggregate state of one download: the transfer, a result slot per chunk and
//! the overall outcome.
//!
//! The coordinator is the only writer. Each chunk index owns exactly one slot,
//! and a slot leaves `Pending` exactly once. `Completed` is reachable only when
//! every slot is `Succeeded`; the first failure moves the session to `Aborted`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::partition::ByteRange;
use crate::probe::TransferSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    Succeeded,
    Failed(String),
}

/// One chunk's slot in the session.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub range: ByteRange,
    pub staging_path: PathBuf,
    /// Equals `range.len()` once `Succeeded`.
    pub bytes_written: u64,
    pub status: ChunkStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    InProgress,
    Completed,
    Aborted,
}

#[derive(Debug)]
pub struct DownloadSession {
    spec: TransferSpec,
    results: BTreeMap<usize, ChunkResult>,
    outcome: SessionOutcome,
}

impl DownloadSession {
    /// New session with a `Pending` slot per range.
    /// `staging_path` maps a chunk index to its artifact.
    pub fn new(
        spec: TransferSpec,
        ranges: &[ByteRange],
        staging_path: impl Fn(usize) -> PathBuf,
    ) -> Self {
        let results = ranges
            .iter()
            .map(|r| {
                (
                    r.index,
                    ChunkResult {
                        range: *r,
                        staging_path: staging_path(r.index),
                        bytes_written: 0,
                        status: ChunkStatus::Pending,
                    },
                )
            })
            .collect();
        Self {
            spec,
            results,
            outcome: SessionOutcome::InProgress,
        }
    }

    pub fn spec(&self) -> &TransferSpec {
        &self.spec
    }

    pub fn outcome(&self) -> SessionOutcome {
        self.outcome
    }

    /// Slots in index order.
    pub fn results(&self) -> impl Iterator<Item = &ChunkResult> {
        self.results.values()
    }

    pub fn result(&self, index: usize) -> Option<&ChunkResult> {
        self.results.get(&index)
    }

    /// Records a successful chunk. Returns `false` (and changes nothing) when
    /// the slot is unknown, already reported, the session is no longer
    /// running, or `bytes_written` does not match the range length.
    pub fn record_success(&mut self, index: usize, bytes_written: u64) -> bool {
        if self.outcome != SessionOutcome::InProgress {
            return false;
        }
        match self.results.get_mut(&index) {
            Some(slot) if slot.status == ChunkStatus::Pending && bytes_written == slot.range.len() => {
                slot.bytes_written = bytes_written;
                slot.status = ChunkStatus::Succeeded;
                true
            }
            _ => false,
        }
    }

    /// Records a failed chunk and aborts the session.
    pub fn record_failure(&mut self, index: usize, reason: impl Into<String>) {
        if let Some(slot) = self.results.get_mut(&index) {
            if slot.status == ChunkStatus::Pending {
                slot.status = ChunkStatus::Failed(reason.into());
            }
        }
        self.abort();
    }

    /// Moves a running session to `Aborted`. No-op once finished.
    pub fn abort(&mut self) {
        if self.outcome == SessionOutcome::InProgress {
            self.outcome = SessionOutcome::Aborted;
        }
    }

    /// Moves to `Completed` if every slot has succeeded. Returns the new state.
    pub fn complete(&mut self) -> SessionOutcome {
        if self.outcome == SessionOutcome::InProgress
            && self
                .results
                .values()
                .all(|r| r.status == ChunkStatus::Succeeded)
        {
            self.outcome = SessionOutcome::Completed;
        }
        self.outcome
    }

    /// True while some slot is still `Pending`.
    pub fn has_pending(&self) -> bool {
        self.results
            .values()
            .any(|r| r.status == ChunkStatus::Pending)
    }

    pub fn is_pending(&self, index: usize) -> bool {
        self.results
            .get(&index)
            .is_some_and(|r| r.status == ChunkStatus::Pending)
    }

    /// Sum of bytes written by succeeded chunks.
    pub fn bytes_written(&self) -> u64 {
        self.results.values().map(|r| r.bytes_written).sum()
    }
}
