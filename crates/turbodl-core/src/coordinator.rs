//! Fan-out/fan-in over chunk fetchers.
//!
//! One scoped thread per range, each reporting exactly once over an mpsc
//! channel. The coordinator owns the session's cancel token: the first failed
//! chunk, the session deadline or the caller's token cancels every other
//! worker, all workers are joined, and every staging artifact is removed before
//! the error is returned. Merge only ever sees a `Completed` session.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

use crate::control::CancelToken;
use crate::error::TransferError;
use crate::fetch::{fetch_with_retry, ChunkRequest};
use crate::http::HttpOptions;
use crate::partition::ByteRange;
use crate::progress::Progress;
use crate::retry::{ChunkFailure, RetryPolicy};
use crate::session::{DownloadSession, SessionOutcome};
use crate::staging::StagingArea;

/// How often the coordinator wakes up to check deadline, cancellation and
/// worker liveness while waiting for reports.
const TICK: Duration = Duration::from_millis(100);

/// A worker's single report.
struct Report {
    index: usize,
    result: Result<u64, ChunkFailure>,
}

pub struct Coordinator<'a> {
    pub http: &'a HttpOptions,
    pub retry: &'a RetryPolicy,
    /// Whole-session deadline; `None` waits indefinitely.
    pub session_timeout: Option<Duration>,
    pub progress: Option<&'a Progress>,
}

impl Coordinator<'_> {
    /// Runs every chunk of `session` to completion or first failure.
    ///
    /// On `Ok` the session is `Completed` and each artifact holds exactly its
    /// range. On `Err` the session is `Aborted` and no artifacts remain.
    pub fn run(
        &self,
        session: &mut DownloadSession,
        staging: &StagingArea,
        cancel: &CancelToken,
    ) -> Result<(), TransferError> {
        let ranges: Vec<ByteRange> = session.results().map(|r| r.range).collect();
        let url = session.spec().source_url.clone();
        let total_size = session.spec().total_size;
        let if_range = session.spec().if_range().map(str::to_string);
        let token = CancelToken::new();
        let deadline = self.session_timeout.map(|t| Instant::now() + t);

        if let Some(p) = self.progress {
            p.begin(total_size, ranges.len());
        }
        tracing::info!(
            url = %url,
            total_size,
            chunks = ranges.len(),
            "starting chunk fetchers"
        );

        let outcome = thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<Report>();
            let mut handles: Vec<(usize, ScopedJoinHandle<'_, ()>)> =
                Vec::with_capacity(ranges.len());

            for range in &ranges {
                let tx = tx.clone();
                let (url, if_range, token) = (&url, &if_range, &token);
                let staging_path = staging.part_path(range.index);
                let range = *range;
                let handle = thread::Builder::new()
                    .name(format!("chunk-{}", range.index))
                    .spawn_scoped(scope, move || {
                        let req = ChunkRequest {
                            url,
                            range,
                            total_size,
                            staging_path: &staging_path,
                            if_range: if_range.as_deref(),
                        };
                        let counter = self.progress.map(Progress::bytes);
                        let result = fetch_with_retry(&req, self.http, self.retry, token, counter);
                        let _ = tx.send(Report {
                            index: range.index,
                            result,
                        });
                    });
                match handle {
                    Ok(h) => handles.push((range.index, h)),
                    Err(e) => {
                        token.cancel();
                        join_all(handles);
                        session.record_failure(range.index, e.to_string());
                        return Err(TransferError::WorkerCrashed(format!(
                            "could not spawn worker for chunk {}: {e}",
                            range.index
                        )));
                    }
                }
            }
            drop(tx);

            let result = self.wait(session, &rx, &handles, cancel, deadline);
            if result.is_err() {
                token.cancel();
            }
            join_all(handles);
            result
        });

        let outcome = outcome.and_then(|()| match session.complete() {
            SessionOutcome::Completed => Ok(()),
            _ => Err(TransferError::SessionIncomplete),
        });
        match outcome {
            Ok(()) => {
                tracing::info!(bytes = session.bytes_written(), "all chunks fetched");
                Ok(())
            }
            Err(e) => {
                session.abort();
                remove_artifacts(staging, &ranges);
                tracing::warn!(error = %e, "download session aborted");
                Err(e)
            }
        }
    }

    /// Collects reports until every slot is filled or something goes wrong.
    fn wait(
        &self,
        session: &mut DownloadSession,
        rx: &mpsc::Receiver<Report>,
        handles: &[(usize, ScopedJoinHandle<'_, ()>)],
        cancel: &CancelToken,
        deadline: Option<Instant>,
    ) -> Result<(), TransferError> {
        while session.has_pending() {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(TransferError::Timeout(
                    self.session_timeout.unwrap_or_default(),
                ));
            }
            match rx.recv_timeout(TICK) {
                Ok(report) => self.apply(session, report)?,
                Err(RecvTimeoutError::Timeout) => {
                    let finished = handles
                        .iter()
                        .any(|(i, h)| h.is_finished() && session.is_pending(*i));
                    if finished {
                        // A finished worker has already sent its report, if any.
                        while let Ok(report) = rx.try_recv() {
                            self.apply(session, report)?;
                        }
                        if let Some((i, _)) = handles
                            .iter()
                            .find(|(i, h)| h.is_finished() && session.is_pending(*i))
                        {
                            session.record_failure(*i, "worker exited without reporting");
                            return Err(TransferError::WorkerCrashed(format!(
                                "chunk {i} worker exited without reporting"
                            )));
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let missing: Vec<usize> = session
                        .results()
                        .filter(|r| session.is_pending(r.range.index))
                        .map(|r| r.range.index)
                        .collect();
                    if let Some(i) = missing.first() {
                        session.record_failure(*i, "worker exited without reporting");
                    }
                    return Err(TransferError::WorkerCrashed(format!(
                        "chunks {missing:?} never reported"
                    )));
                }
            }
        }
        Ok(())
    }

    fn apply(&self, session: &mut DownloadSession, report: Report) -> Result<(), TransferError> {
        match report.result {
            Ok(bytes) => {
                if !session.record_success(report.index, bytes) {
                    let expected = session
                        .result(report.index)
                        .map(|r| r.range.len())
                        .unwrap_or_default();
                    session.record_failure(report.index, "length mismatch");
                    return Err(TransferError::SizeMismatch {
                        stage: format!("chunk {}", report.index),
                        expected,
                        actual: bytes,
                    });
                }
                if let Some(p) = self.progress {
                    p.chunk_finished();
                }
                tracing::debug!(chunk = report.index, bytes, "chunk fetched");
                Ok(())
            }
            Err(failure) => {
                let err = TransferError::from_chunk(report.index, failure);
                session.record_failure(report.index, err.to_string());
                Err(err)
            }
        }
    }
}

fn join_all(handles: Vec<(usize, ScopedJoinHandle<'_, ()>)>) {
    for (index, h) in handles {
        if h.join().is_err() {
            tracing::error!(chunk = index, "chunk worker panicked");
        }
    }
}

fn remove_artifacts(staging: &StagingArea, ranges: &[ByteRange]) {
    for r in ranges {
        if let Err(e) = staging.remove_part(r.index) {
            tracing::warn!(chunk = r.index, error = %e, "could not remove chunk artifact");
        }
    }
}
