//! `turbodl get` – resolve a link and download it with parallel ranges.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use turbodl_core::config::TurboConfig;
use turbodl_core::source::{resolve_link, BuiltinResolver};
use turbodl_core::{
    download_async, CancelToken, CollisionPolicy, DownloadOptions, DownloadRequest, Progress,
};

use super::{human_bytes, parse_headers};
use crate::cli::GetArgs;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run_get(cfg: &TurboConfig, args: GetArgs) -> Result<()> {
    let resolved = resolve_link(&args.link, &BuiltinResolver)?;
    tracing::info!(kind = resolved.kind.as_str(), url = %resolved.url, "resolved link");

    let mut opts = DownloadOptions::from_config(cfg);
    opts.http.headers.extend(resolved.headers);
    opts.http.headers.extend(parse_headers(&args.headers)?);
    if let Some(secs) = args.timeout {
        opts.session_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }

    let dest = match args.dest.or_else(|| cfg.download_dir.clone()) {
        Some(d) => d,
        None => std::env::current_dir()?,
    };
    let mut req = DownloadRequest::new(resolved.url, dest);
    req.chunk_count = args.chunks.map_or(cfg.chunk_count, |n| n as usize);
    req.staging_root = cfg.staging_dir.clone();
    req.collision = if args.overwrite || cfg.overwrite {
        CollisionPolicy::Overwrite
    } else {
        CollisionPolicy::Fail
    };
    req.filename = args.output;
    req.expected_sha256 = args.sha256;
    req.allow_single_stream = !args.no_fallback;

    let cancel = CancelToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ncancelling, removing partial files...");
                cancel.cancel();
            }
        })
    };

    let progress = Arc::new(Progress::new());
    let printer = {
        let progress = Arc::clone(&progress);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(PROGRESS_INTERVAL);
            loop {
                tick.tick().await;
                print_progress(&progress);
            }
        })
    };

    let result = download_async(req, opts, cancel, Some(Arc::clone(&progress))).await;
    printer.abort();
    ctrl_c.abort();

    let report = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!();
            return Err(e.into());
        }
    };
    print_progress(&progress);
    eprintln!();
    if report.single_stream {
        eprintln!("note: server does not accept ranges; downloaded with a single connection");
    }
    eprintln!(
        "{} in {:.1}s ({} chunks)",
        human_bytes(report.spec.total_size),
        report.elapsed.as_secs_f64(),
        report.spec.chunk_count
    );
    println!("{}", report.path.display());
    Ok(())
}

fn print_progress(progress: &Progress) {
    let stats = progress.stats();
    if stats.total_bytes == 0 {
        return;
    }
    let eta = stats
        .eta_secs()
        .map(|s| format!("{:.0}s", s))
        .unwrap_or_else(|| "?".to_string());
    eprint!(
        "\r  {} / {} ({:.1}%)  {}/s  chunks {}/{}  ETA {}   ",
        human_bytes(stats.bytes_done),
        human_bytes(stats.total_bytes),
        stats.fraction() * 100.0,
        human_bytes(stats.bytes_per_sec() as u64),
        stats.chunks_done,
        stats.chunk_count,
        eta
    );
}
