//! Zip archive dispatcher: fetches the archive object with the
//! retrying fetcher, then expands it into the destination directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use super::common::{fetch_single, report_error};
use crate::clock::Clock;
use crate::config::FetcherConfig;
use crate::error::{ArchiveError, DispatchError};
use crate::fs::Filesystem;
use crate::model::JobStats;
use crate::stats::aggregate;
use crate::storage::StorageReader;

const ARCHIVE_LOCAL_NAME: &str = ".bucket-fetch-archive.zip";

pub async fn run_zip(
    storage: Arc<dyn StorageReader>,
    fs: Arc<dyn Filesystem>,
    clock: Arc<dyn Clock>,
    cfg: Arc<FetcherConfig>,
) -> Result<JobStats, DispatchError> {
    fs.create_dir_all(&cfg.dest_dir)
        .await
        .map_err(|e| DispatchError::Fetch(e.into()))?;
    fs.create_dir_all(&cfg.staging_dir)
        .await
        .map_err(|e| DispatchError::Fetch(e.into()))?;

    let report = fetch_single(&storage, &fs, &clock, &cfg, ARCHIVE_LOCAL_NAME).await;
    if !report.success {
        return Err(DispatchError::Fetch(report_error(&report)));
    }
    let archive_path = report
        .final_path
        .clone()
        .expect("successful report carries a final path");

    let created = zip_extract(&archive_path, &cfg.dest_dir).await?;
    info!(entries = created.len(), "extracted zip archive");

    let _ = tokio::fs::remove_file(&archive_path).await;

    Ok(aggregate(&[report]))
}

/// Extracts every entry of `archive` into `dest_dir`, returning the
/// ordered list of created paths. Directory entries (names ending in
/// `/`) are created with `mkdir -p` plus the entry's mode bits;
/// everything else is written with its stored mode.
pub async fn zip_extract(archive: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let archive = archive.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    tokio::task::spawn_blocking(move || zip_extract_blocking(&archive, &dest_dir))
        .await
        .expect("zip extraction task panicked")
}

fn zip_extract_blocking(archive: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let file = std::fs::File::open(archive).map_err(|source| ArchiveError::Read {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = zip::ZipArchive::new(file).map_err(|source| ArchiveError::ZipEntry {
        path: archive.to_path_buf(),
        index: 0,
        source,
    })?;

    let mut created = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|source| ArchiveError::ZipEntry {
            path: archive.to_path_buf(),
            index,
            source,
        })?;
        let name = entry.name().to_string();
        let out_path = dest_dir.join(&name);
        let mode = entry.unix_mode();

        if name.ends_with('/') {
            std::fs::create_dir_all(&out_path).map_err(|source| ArchiveError::ExtractEntry {
                path: archive.to_path_buf(),
                entry: name.clone(),
                source,
            })?;
            set_mode(&out_path, mode.unwrap_or(0o755));
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| ArchiveError::ExtractEntry {
                    path: archive.to_path_buf(),
                    entry: name.clone(),
                    source,
                })?;
            }
            let mut out_file =
                std::fs::File::create(&out_path).map_err(|source| ArchiveError::ExtractEntry {
                    path: archive.to_path_buf(),
                    entry: name.clone(),
                    source,
                })?;
            std::io::copy(&mut entry, &mut out_file).map_err(|source| {
                ArchiveError::ExtractEntry {
                    path: archive.to_path_buf(),
                    entry: name.clone(),
                    source,
                }
            })?;
            set_mode(&out_path, mode.unwrap_or(0o644));
        }
        created.push(out_path);
    }
    Ok(created)
}

fn set_mode(path: &Path, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode));
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
}
