//! Integration tests: full download pipeline against a local range server.
//!
//! Each test serves a known body, runs `download` into a temp directory and
//! checks both the result and that nothing else is left in that directory.

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::range_server::{self, RangeServerOptions};
use tempfile::tempdir;
use turbodl_core::checksum::sha256_path;
use turbodl_core::partition::MAX_CHUNK_COUNT;
use turbodl_core::probe::probe;
use turbodl_core::retry::RetryPolicy;
use turbodl_core::{
    download, download_async, CancelToken, CollisionPolicy, DownloadOptions, DownloadRequest,
    Progress, TransferError,
};

fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn fast_opts() -> DownloadOptions {
    DownloadOptions {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        },
        fsync: false,
        ..DownloadOptions::default()
    }
}

fn request(url: &str, dest: &Path, chunks: usize) -> DownloadRequest {
    DownloadRequest {
        chunk_count: chunks,
        ..DownloadRequest::new(url, dest)
    }
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn eight_chunks_reassemble_byte_identical() {
    let data = body(64 * 1024 + 7);
    let server = range_server::start(data.clone());
    let dest = tempdir().unwrap();
    let progress = Progress::new();

    let report = download(
        &request(&server.url, dest.path(), 8),
        &fast_opts(),
        &CancelToken::new(),
        Some(&progress),
    )
    .unwrap();

    assert_eq!(report.path, dest.path().join("payload.bin"));
    assert_eq!(fs::read(&report.path).unwrap(), data);
    assert_eq!(report.spec.chunk_count, 8);
    assert!(!report.single_stream);
    assert_eq!(server.get_count(), 8);
    assert_eq!(entries(dest.path()), vec!["payload.bin"]);

    let stats = progress.stats();
    assert_eq!(stats.bytes_done, data.len() as u64);
    assert_eq!((stats.chunks_done, stats.chunk_count), (8, 8));
}

#[test]
fn thousand_bytes_eight_chunks() {
    let data = body(1000);
    let server = range_server::start(data.clone());
    let dest = tempdir().unwrap();
    let report = download(
        &request(&server.url, dest.path(), 8),
        &fast_opts(),
        &CancelToken::new(),
        None,
    )
    .unwrap();
    assert_eq!(fs::metadata(&report.path).unwrap().len(), 1000);
    assert_eq!(fs::read(&report.path).unwrap(), data);
}

#[test]
fn small_file_with_many_workers() {
    let data = body(10);
    let server = range_server::start(data.clone());
    let dest = tempdir().unwrap();
    let report = download(
        &request(&server.url, dest.path(), 8),
        &fast_opts(),
        &CancelToken::new(),
        None,
    )
    .unwrap();
    assert_eq!(report.spec.chunk_count, 5);
    assert_eq!(server.get_count(), 5);
    assert_eq!(fs::read(&report.path).unwrap(), data);
}

#[test]
fn full_content_for_partial_range_aborts_and_cleans_up() {
    let server = range_server::start_with_options(
        body(1000),
        RangeServerOptions {
            full_content_at: Some(500),
            ..RangeServerOptions::default()
        },
    );
    let dest = tempdir().unwrap();
    let err = download(
        &request(&server.url, dest.path(), 2),
        &fast_opts(),
        &CancelToken::new(),
        None,
    )
    .unwrap_err();

    assert!(
        matches!(err, TransferError::RangeRejected { index: 1, .. }),
        "unexpected {err:?}"
    );
    assert!(err.is_structural());
    // Not retried: at most one GET per chunk.
    assert!(server.get_count() <= 2);
    assert!(entries(dest.path()).is_empty());
}

#[test]
fn no_range_support_falls_back_to_single_stream() {
    let data = body(5000);
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            support_ranges: false,
            ..RangeServerOptions::default()
        },
    );
    let dest = tempdir().unwrap();
    let report = download(
        &request(&server.url, dest.path(), 8),
        &fast_opts(),
        &CancelToken::new(),
        None,
    )
    .unwrap();
    assert!(report.single_stream);
    assert_eq!(report.spec.chunk_count, 1);
    assert_eq!(server.get_count(), 1);
    assert_eq!(fs::read(&report.path).unwrap(), data);
}

#[test]
fn no_range_support_is_an_error_when_fallback_is_off() {
    let server = range_server::start_with_options(
        body(5000),
        RangeServerOptions {
            support_ranges: false,
            ..RangeServerOptions::default()
        },
    );
    let dest = tempdir().unwrap();
    let req = DownloadRequest {
        allow_single_stream: false,
        ..request(&server.url, dest.path(), 8)
    };
    let err = download(&req, &fast_opts(), &CancelToken::new(), None).unwrap_err();
    assert!(matches!(err, TransferError::NoRangeSupport));
    assert_eq!(server.get_count(), 0);
    assert!(entries(dest.path()).is_empty());
}

#[test]
fn refused_head_is_probed_with_a_range_request() {
    let data = body(4096);
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            head_allowed: false,
            advertise_ranges: false,
            ..RangeServerOptions::default()
        },
    );
    let dest = tempdir().unwrap();
    let report = download(
        &request(&server.url, dest.path(), 4),
        &fast_opts(),
        &CancelToken::new(),
        None,
    )
    .unwrap();
    assert_eq!(report.spec.total_size, 4096);
    assert!(report.spec.accept_ranges);
    assert_eq!(report.spec.chunk_count, 4);
    assert_eq!(fs::read(&report.path).unwrap(), data);
}

#[test]
fn truncated_responses_are_retried() {
    let data = body(8000);
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            truncate_first: 2,
            ..RangeServerOptions::default()
        },
    );
    let dest = tempdir().unwrap();
    let progress = Progress::new();
    let report = download(
        &request(&server.url, dest.path(), 4),
        &fast_opts(),
        &CancelToken::new(),
        Some(&progress),
    )
    .unwrap();
    assert_eq!(fs::read(&report.path).unwrap(), data);
    assert_eq!(server.get_count(), 6);
    // Bytes from discarded attempts are not counted.
    assert_eq!(progress.stats().bytes_done, 8000);
}

#[test]
fn persistent_server_error_exhausts_retries() {
    let server = range_server::start_with_options(
        body(1000),
        RangeServerOptions {
            fail_status_at: Some((250, 500)),
            ..RangeServerOptions::default()
        },
    );
    let dest = tempdir().unwrap();
    let err = download(
        &request(&server.url, dest.path(), 4),
        &fast_opts(),
        &CancelToken::new(),
        None,
    )
    .unwrap_err();
    match err {
        TransferError::NetworkError {
            index, attempts, ..
        } => assert_eq!((index, attempts), (1, 3)),
        other => panic!("unexpected {other:?}"),
    }
    assert!(entries(dest.path()).is_empty());
}

#[test]
fn session_timeout_aborts_and_cleans_up() {
    let server = range_server::start_with_options(
        body(1000),
        RangeServerOptions {
            delay_ms: 3000,
            ..RangeServerOptions::default()
        },
    );
    let dest = tempdir().unwrap();
    let opts = DownloadOptions {
        session_timeout: Some(Duration::from_millis(300)),
        ..fast_opts()
    };
    let err = download(
        &request(&server.url, dest.path(), 4),
        &opts,
        &CancelToken::new(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, TransferError::Timeout(_)), "unexpected {err:?}");
    assert!(entries(dest.path()).is_empty());
}

#[test]
fn cancelled_before_start() {
    let server = range_server::start(body(1000));
    let dest = tempdir().unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = download(&request(&server.url, dest.path(), 4), &fast_opts(), &cancel, None)
        .unwrap_err();
    assert!(matches!(err, TransferError::Cancelled), "unexpected {err:?}");
    assert!(entries(dest.path()).is_empty());
}

#[test]
fn existing_destination_fails_by_default_and_can_be_overwritten() {
    let data = body(2000);
    let server = range_server::start(data.clone());
    let dest = tempdir().unwrap();
    fs::write(dest.path().join("payload.bin"), b"keep me").unwrap();

    let err = download(
        &request(&server.url, dest.path(), 4),
        &fast_opts(),
        &CancelToken::new(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, TransferError::AlreadyExists { .. }));
    assert_eq!(server.get_count(), 0);
    assert_eq!(fs::read(dest.path().join("payload.bin")).unwrap(), b"keep me");

    let req = DownloadRequest {
        collision: CollisionPolicy::Overwrite,
        ..request(&server.url, dest.path(), 4)
    };
    let report = download(&req, &fast_opts(), &CancelToken::new(), None).unwrap();
    assert_eq!(fs::read(report.path).unwrap(), data);
    assert_eq!(entries(dest.path()), vec!["payload.bin"]);
}

#[test]
fn server_filename_and_staging_root() {
    let data = body(3000);
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            content_disposition: Some("attachment; filename=\"report 2024.pdf\""),
            etag: Some("\"v1\""),
            ..RangeServerOptions::default()
        },
    );
    let dest = tempdir().unwrap();
    let staging = tempdir().unwrap();
    let req = DownloadRequest {
        staging_root: Some(staging.path().to_path_buf()),
        ..request(&server.url, dest.path(), 3)
    };
    let report = download(&req, &fast_opts(), &CancelToken::new(), None).unwrap();
    assert_eq!(report.path, dest.path().join("report 2024.pdf"));
    assert_eq!(report.spec.etag.as_deref(), Some("\"v1\""));
    assert_eq!(fs::read(&report.path).unwrap(), data);
    assert!(entries(staging.path()).is_empty());
}

#[test]
fn checksum_is_verified_before_publishing() {
    let data = body(2500);
    let server = range_server::start(data.clone());

    let reference = tempdir().unwrap();
    let ref_path = reference.path().join("expected");
    fs::write(&ref_path, &data).unwrap();
    let good = sha256_path(&ref_path).unwrap();

    let dest = tempdir().unwrap();
    let bad = DownloadRequest {
        expected_sha256: Some("00".repeat(32)),
        ..request(&server.url, dest.path(), 4)
    };
    let err = download(&bad, &fast_opts(), &CancelToken::new(), None).unwrap_err();
    assert!(matches!(err, TransferError::ChecksumMismatch { .. }));
    assert!(entries(dest.path()).is_empty());

    let ok = DownloadRequest {
        expected_sha256: Some(good.to_uppercase()),
        ..request(&server.url, dest.path(), 4)
    };
    let report = download(&ok, &fast_opts(), &CancelToken::new(), None).unwrap();
    assert_eq!(fs::read(report.path).unwrap(), data);
}

#[tokio::test]
async fn async_wrapper_downloads_on_blocking_pool() {
    let data = body(32 * 1024);
    let server = range_server::start(data.clone());
    let dest = tempdir().unwrap();
    let progress = Arc::new(Progress::new());
    let report = download_async(
        request(&server.url, dest.path(), 6),
        fast_opts(),
        CancelToken::new(),
        Some(Arc::clone(&progress)),
    )
    .await
    .unwrap();
    assert_eq!(fs::read(&report.path).unwrap(), data);
    assert_eq!(progress.stats().chunks_done, 6);
}

#[test]
fn abort_cleanup_holds_for_every_failing_chunk() {
    let total = 1200;
    for (index, start) in [(0usize, 0u64), (2, 400), (5, 1000)] {
        let server = range_server::start_with_options(
            body(total),
            RangeServerOptions {
                fail_status_at: Some((start, 404)),
                ..RangeServerOptions::default()
            },
        );
        let dest = tempdir().unwrap();
        let err = download(
            &request(&server.url, dest.path(), 6),
            &fast_opts(),
            &CancelToken::new(),
            None,
        )
        .unwrap_err();
        match err {
            TransferError::NetworkError {
                index: failed,
                attempts,
                ..
            } => assert_eq!((failed, attempts), (index, 1)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(entries(dest.path()).is_empty(), "leftovers after chunk {index} failed");
    }
}

#[test]
fn metadata_spec_requires_range_support() {
    let server = range_server::start(body(1000));
    let opts = fast_opts();
    let spec = probe(&server.url, &opts.http, &CancelToken::new(), 8).unwrap();
    assert_eq!(spec.total_size, 1000);
    assert_eq!(spec.filename, "payload.bin");
    assert_eq!(spec.chunk_count, 8);
    assert!(spec.accept_ranges);

    let plain = range_server::start_with_options(
        body(1000),
        RangeServerOptions {
            support_ranges: false,
            ..RangeServerOptions::default()
        },
    );
    let err = probe(&plain.url, &opts.http, &CancelToken::new(), 8).unwrap_err();
    assert!(matches!(err, TransferError::NoRangeSupport), "unexpected {err:?}");
    assert_eq!(plain.get_count(), 0);
}

#[test]
fn stalled_chunk_is_retried() {
    let data = body(1000);
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            stall_first: 1,
            ..RangeServerOptions::default()
        },
    );
    let dest = tempdir().unwrap();
    let mut opts = fast_opts();
    opts.http.stall_timeout = Duration::from_secs(1);
    let progress = Progress::new();

    let report = download(
        &request(&server.url, dest.path(), 2),
        &opts,
        &CancelToken::new(),
        Some(&progress),
    )
    .unwrap();

    assert_eq!(fs::read(&report.path).unwrap(), data);
    assert_eq!(server.stall_count(), 1);
    assert_eq!(server.get_count(), 3);
    // Bytes from the stalled attempt are not counted twice.
    assert_eq!(progress.stats().bytes_done, 1000);
    assert_eq!(entries(dest.path()), vec!["payload.bin"]);
    assert!(report.elapsed < Duration::from_secs(14));
}

#[test]
fn chunk_requests_carry_if_range() {
    let data = body(2000);
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            etag: Some("\"v1\""),
            ..RangeServerOptions::default()
        },
    );
    let dest = tempdir().unwrap();
    let report = download(
        &request(&server.url, dest.path(), 4),
        &fast_opts(),
        &CancelToken::new(),
        None,
    )
    .unwrap();
    assert_eq!(fs::read(&report.path).unwrap(), data);
    assert_eq!(server.if_range_count(), 4);
}

#[test]
fn resource_changed_mid_download_is_rejected() {
    let server = range_server::start_with_options(
        body(2000),
        RangeServerOptions {
            etag: Some("\"v1\""),
            current_etag: Some("\"v2\""),
            ..RangeServerOptions::default()
        },
    );
    let dest = tempdir().unwrap();
    let err = download(
        &request(&server.url, dest.path(), 4),
        &fast_opts(),
        &CancelToken::new(),
        None,
    )
    .unwrap_err();
    assert!(
        matches!(err, TransferError::RangeRejected { .. }),
        "unexpected {err:?}"
    );
    assert!(server.if_range_count() >= 1);
    // Range rejections are not retried.
    assert!(server.get_count() <= 4);
    assert!(entries(dest.path()).is_empty());
}

#[test]
fn empty_resource_is_unknown_size() {
    let server = range_server::start(Vec::new());
    let dest = tempdir().unwrap();
    let err = download(
        &request(&server.url, dest.path(), 8),
        &fast_opts(),
        &CancelToken::new(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, TransferError::UnknownSize), "unexpected {err:?}");
    assert!(entries(dest.path()).is_empty());
}

#[test]
fn oversized_chunk_count_is_clamped() {
    let data = body(10_000);
    let server = range_server::start(data.clone());
    let dest = tempdir().unwrap();
    let report = download(
        &request(&server.url, dest.path(), 10_000),
        &fast_opts(),
        &CancelToken::new(),
        None,
    )
    .unwrap();
    assert_eq!(report.spec.chunk_count, MAX_CHUNK_COUNT);
    assert_eq!(server.get_count(), MAX_CHUNK_COUNT);
    assert_eq!(fs::read(&report.path).unwrap(), data);
}
