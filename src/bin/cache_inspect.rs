use std::env;
use std::ffi::OsString;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use blockcast_rx::transfer::{CacheFile, CompletionBitmap};

/// Missing serial numbers beyond this are summarised by count only.
const MAX_LISTED_MISSING: usize = 64;

#[derive(Serialize)]
struct CacheReport {
    cache_file: String,
    manifest_source: String,
    cache_bytes: u64,
    expected_cache_bytes: u64,
    total_blocks: u64,
    confirmed_blocks: u64,
    progress_percent: u8,
    first_missing: Option<u64>,
    missing_cycles: Vec<u32>,
    missing_sns: Vec<u64>,
    missing_truncated: bool,
}

async fn report_for_cache(path: &Path) -> Result<CacheReport> {
    let cache = CacheFile::new(path);
    let (manifest, source) = cache
        .load_manifest_with_fallback()
        .await
        .with_context(|| format!("no readable manifest for {}", path.display()))?;
    let params = manifest.params;
    params
        .validate()
        .with_context(|| format!("manifest for {} has invalid parameters", path.display()))?;

    let cache_bytes = tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);

    let mut bitmap = CompletionBitmap::new(params.total_blocks);
    for sn in &manifest.confirmed {
        bitmap.mark(*sn);
    }

    let missing: Vec<u64> = (0..params.total_blocks)
        .filter(|sn| !bitmap.contains(*sn))
        .collect();
    let mut missing_cycles: Vec<u32> = missing.iter().map(|sn| params.owner_cycle(*sn)).collect();
    missing_cycles.dedup();

    Ok(CacheReport {
        cache_file: path.display().to_string(),
        manifest_source: format!("{source:?}").to_lowercase(),
        cache_bytes,
        expected_cache_bytes: params.cache_offset(params.total_blocks),
        total_blocks: params.total_blocks,
        confirmed_blocks: bitmap.confirmed(),
        progress_percent: bitmap.progress_percent(),
        first_missing: bitmap.first_missing(),
        missing_cycles,
        missing_truncated: missing.len() > MAX_LISTED_MISSING,
        missing_sns: missing.into_iter().take(MAX_LISTED_MISSING).collect(),
    })
}

async fn run(args: Vec<OsString>) -> Result<()> {
    if args.is_empty() {
        anyhow::bail!("usage: cargo run --quiet --bin cache_inspect -- <cache file> [<cache file>...]");
    }

    let mut reports = Vec::with_capacity(args.len());
    for arg in args {
        reports.push(report_for_cache(Path::new(&arg)).await?);
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    run(env::args_os().skip(1).collect()).await
}
