//! `turbodl probe` – print what a download would fetch.

use anyhow::Result;
use turbodl_core::config::TurboConfig;
use turbodl_core::partition::MAX_CHUNK_COUNT;
use turbodl_core::probe::{probe_head, TransferSpec};
use turbodl_core::source::{resolve_link, BuiltinResolver};
use turbodl_core::{CancelToken, DownloadOptions};

use super::{human_bytes, parse_headers};

pub async fn run_probe(cfg: &TurboConfig, link: &str, headers: &[String]) -> Result<()> {
    let resolved = resolve_link(link, &BuiltinResolver)?;
    let mut http = DownloadOptions::from_config(cfg).http;
    http.headers.extend(resolved.headers.clone());
    http.headers.extend(parse_headers(headers)?);
    let chunk_count = cfg.chunk_count.clamp(1, MAX_CHUNK_COUNT);

    let url = resolved.url.clone();
    let (head, spec) = tokio::task::spawn_blocking(move || {
        let head = probe_head(&url, &http, &CancelToken::new())?;
        let spec = TransferSpec::from_head(&url, &head, chunk_count)?;
        Ok::<_, turbodl_core::TransferError>((head, spec))
    })
    .await??;

    println!("source:        {}", resolved.kind.as_str());
    println!("url:           {}", spec.source_url);
    println!("filename:      {}", spec.filename);
    println!(
        "size:          {} ({} bytes)",
        human_bytes(spec.total_size),
        spec.total_size
    );
    println!("ranges:        {}", if spec.accept_ranges { "yes" } else { "no" });
    if spec.accept_ranges {
        println!("chunks:        {}", spec.chunk_count);
    }
    if let Some(etag) = &head.etag {
        println!("etag:          {etag}");
    }
    if let Some(lm) = &head.last_modified {
        println!("last-modified: {lm}");
    }
    Ok(())
}
