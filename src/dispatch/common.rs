//! Shared plumbing for the three ingestion dispatchers: each one first
//! fetches a single object (the manifest, or an archive) with the
//! retrying fetcher before doing its own thing with the bytes.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::FetcherConfig;
use crate::dirs::CreatedDirs;
use crate::error::FetchError;
use crate::fs::Filesystem;
use crate::model::{Job, JobReport};
use crate::retry::fetch_with_retry;
use crate::storage::StorageReader;

/// Fetches `cfg`'s configured bucket/object to `local_name` inside
/// `cfg.dest_dir`, using the full retry policy. A fatal permission
/// error is the only failure mode the caller needs to special-case;
/// everything else is already captured in the returned report.
pub async fn fetch_single(
    storage: &Arc<dyn StorageReader>,
    fs: &Arc<dyn Filesystem>,
    clock: &Arc<dyn Clock>,
    cfg: &FetcherConfig,
    local_name: &str,
) -> JobReport {
    let job = Job {
        bucket: cfg.bucket.clone(),
        object: cfg.object.clone(),
        generation: cfg.generation,
        filename: Some(local_name.to_string()),
        expected_sha1: None,
    };

    let created_dirs = CreatedDirs::new();
    let outer = CancellationToken::new();
    fetch_with_retry(
        storage.as_ref(),
        fs.as_ref(),
        clock,
        &created_dirs,
        cfg,
        job,
        &outer,
    )
    .await
}

/// Extracts the terminal error from an unsuccessful report, synthesizing
/// one if none was recorded (shouldn't happen, but `JobReport::err` is
/// an `Option`).
pub fn report_error(report: &JobReport) -> FetchError {
    report
        .err
        .clone()
        .unwrap_or_else(|| FetchError::Transport("fetch failed with no recorded error".into()))
}
