//! Manifest dispatcher: fetches the manifest object, parses it, builds
//! one job per entry, runs the worker pool, aggregates stats.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::common::{fetch_single, report_error};
use crate::clock::Clock;
use crate::config::FetcherConfig;
use crate::error::DispatchError;
use crate::fs::{self, Filesystem};
use crate::gcs_url::GcsUrl;
use crate::model::{Job, JobStats};
use crate::pool::WorkerPool;
use crate::stats::aggregate;
use crate::storage::StorageReader;

const MANIFEST_LOCAL_NAME: &str = ".bucket-fetch-manifest.json";

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(rename = "SourceURL")]
    source_url: String,
    #[serde(rename = "Sha1Sum", default)]
    #[allow(dead_code)]
    sha1_sum: Option<String>,
}

type Manifest = HashMap<String, ManifestEntry>;

pub async fn run_manifest(
    storage: Arc<dyn StorageReader>,
    fs: Arc<dyn Filesystem>,
    clock: Arc<dyn Clock>,
    cfg: Arc<FetcherConfig>,
) -> Result<JobStats, DispatchError> {
    fs.create_dir_all(&cfg.dest_dir).await.map_err(|e| DispatchError::Fetch(e.into()))?;
    fs.create_dir_all(&cfg.staging_dir).await.map_err(|e| DispatchError::Fetch(e.into()))?;

    let report = fetch_single(&storage, &fs, &clock, &cfg, MANIFEST_LOCAL_NAME).await;
    if !report.success {
        return Err(DispatchError::Fetch(report_error(&report)));
    }
    let manifest_path = report
        .final_path
        .clone()
        .expect("successful report carries a final path");

    let bytes = fs
        .read_file(&manifest_path)
        .await
        .map_err(|source| DispatchError::ManifestOpen {
            path: manifest_path.clone(),
            source,
        })?;

    let manifest: Manifest =
        serde_json::from_slice(&bytes).map_err(|source| DispatchError::ManifestDecode {
            path: manifest_path.clone(),
            source,
        })?;

    let _ = fs::remove_if_present(fs.as_ref(), &manifest_path).await;

    info!(entries = manifest.len(), "parsed manifest");

    let mut jobs = Vec::with_capacity(manifest.len());
    for (filename, entry) in manifest {
        let url = GcsUrl::parse(&entry.source_url).map_err(|reason| {
            DispatchError::InvalidSourceUrl {
                url: entry.source_url.clone(),
                reason,
            }
        })?;
        jobs.push(Job {
            bucket: url.bucket,
            object: url.object,
            generation: url.generation,
            filename: Some(filename),
            expected_sha1: entry.sha1_sum,
        });
    }

    let pool = WorkerPool::new(storage, fs, clock, cfg);
    let outer = CancellationToken::new();
    let reports = pool.run(jobs, &outer).await;

    let stats = aggregate(&reports);
    if !stats.success {
        warn!(failures = stats.errors.len(), "manifest run had per-file failures");
    }
    Ok(stats)
}
