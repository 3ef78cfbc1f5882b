//! Process-wide configuration, assembled once at startup and held
//! immutable for the duration of a run.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::timeout_policy::TimeoutConfig;

/// Default number of concurrent fetch workers.
pub const DEFAULT_WORKERS: usize = 8;

/// Default number of retries beyond the first attempt.
pub const DEFAULT_RETRIES: u32 = 3;

/// Mode bits applied to a staging file before it is promoted to its
/// final path.
pub const FINAL_FILE_MODE: u32 = 0o644;

#[derive(Parser, Debug)]
#[command(
    name = "bucket-fetch",
    version,
    about = "Fetches a build's source tree from an object-storage bucket"
)]
pub struct Cli {
    /// Source bucket.
    #[arg(long)]
    pub bucket: String,

    /// Source object name (the manifest, zip, or tar.gz object).
    #[arg(long)]
    pub object: String,

    /// Generation of the source object to honor, if pinned.
    #[arg(long)]
    pub generation: Option<i64>,

    /// Destination directory for the materialized working tree.
    #[arg(long)]
    pub dest_dir: PathBuf,

    /// Maximum concurrent fetch workers.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Retry attempts per file beyond the first.
    #[arg(long, default_value_t = DEFAULT_RETRIES)]
    pub retries: u32,

    /// Enable the per-attempt stall watchdog.
    #[arg(long, default_value_t = true)]
    pub stall_timeout: bool,

    #[command(subcommand)]
    pub ingestion: IngestionKind,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum IngestionKind {
    /// `--object` is a manifest mapping filenames to source URLs.
    Manifest,
    /// `--object` is a zip archive to expand into `--dest-dir`.
    Zip,
    /// `--object` is a tar.gz archive to expand into `--dest-dir`.
    TarGz,
}

/// Process-wide configuration bundle assembled once at startup.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub bucket: String,
    pub object: String,
    pub generation: Option<i64>,
    pub dest_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub workers: usize,
    pub retries: u32,
    pub stall_timeout: bool,
    pub timeouts: TimeoutConfig,
}

impl FetcherConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        let staging_dir = staging_dir_for(&cli.dest_dir);
        FetcherConfig {
            bucket: cli.bucket.clone(),
            object: cli.object.clone(),
            generation: cli.generation,
            dest_dir: cli.dest_dir.clone(),
            staging_dir,
            workers: cli.workers.max(1),
            retries: cli.retries,
            stall_timeout: cli.stall_timeout,
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Derives a private staging directory alongside (not inside) the
/// destination directory, so it is never surfaced to downstream build
/// steps that walk `dest_dir`.
fn staging_dir_for(dest_dir: &std::path::Path) -> PathBuf {
    let name = dest_dir
        .file_name()
        .map(|n| format!(".{}.bucket-fetch-staging", n.to_string_lossy()))
        .unwrap_or_else(|| ".bucket-fetch-staging".to_string());
    dest_dir
        .parent()
        .map(|parent| parent.join(&name))
        .unwrap_or_else(|| PathBuf::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_dir_sits_alongside_dest_dir() {
        let dest = PathBuf::from("/work/checkout");
        let staging = staging_dir_for(&dest);
        assert_eq!(staging.parent(), Some(std::path::Path::new("/work")));
        assert!(staging.file_name().unwrap().to_string_lossy().contains("checkout"));
    }
}
