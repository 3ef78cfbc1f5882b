use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bucket_fetch::clock::{Clock, RealClock};
use bucket_fetch::dispatch::{run_manifest, run_targz, run_zip};
use bucket_fetch::fs::{Filesystem, RealFilesystem};
use bucket_fetch::storage::{GcsStorageReader, StorageReader};
use bucket_fetch::{Cli, DispatchError, FetchError, FetcherConfig, IngestionKind, JobStats};

/// Distinguished exit status for a fatal permission error on the
/// initial manifest/archive fetch, surfaced even for archive
/// dispatchers.
const PERMISSION_DENIED_EXIT_STATUS: i32 = 13;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(stats) => {
            info!(
                files = stats.files,
                bytes = stats.bytes,
                retries = stats.retries,
                "ingestion complete"
            );
            if !stats.success {
                error!(failures = stats.errors.len(), "some files failed to fetch");
                std::process::exit(1);
            }
        }
        Err(err) => {
            error!("{err:?}");
            if is_permission_denied(&err) {
                std::process::exit(PERMISSION_DENIED_EXIT_STATUS);
            }
            std::process::exit(1);
        }
    }
}

fn is_permission_denied(err: &anyhow::Error) -> bool {
    if let Some(DispatchError::Fetch(fetch_err)) = err.downcast_ref::<DispatchError>() {
        return fetch_err.is_fatal();
    }
    if let Some(fetch_err) = err.downcast_ref::<FetchError>() {
        return fetch_err.is_fatal();
    }
    false
}

async fn run(cli: Cli) -> Result<JobStats> {
    let cfg = Arc::new(FetcherConfig::from_cli(&cli));

    let client = reqwest::Client::builder()
        .build()
        .context("building HTTP client")?;

    let storage: Arc<dyn StorageReader> = Arc::new(GcsStorageReader::new(client));
    let fs: Arc<dyn Filesystem> = Arc::new(RealFilesystem);
    let clock: Arc<dyn Clock> = Arc::new(RealClock);

    let stats = match cli.ingestion {
        IngestionKind::Manifest => run_manifest(storage, fs, clock, cfg).await?,
        IngestionKind::Zip => run_zip(storage, fs, clock, cfg).await?,
        IngestionKind::TarGz => run_targz(storage, fs, clock, cfg).await?,
    };

    Ok(stats)
}
