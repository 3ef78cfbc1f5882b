//! Tar.gz archive dispatcher: fetches the archive object with the
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

const ARCHIVE_LOCAL_NAME: &str = ".bucket-fetch-archive.tar.gz";

pub async fn run_targz(
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

    let created = targz_extract(&archive_path, &cfg.dest_dir).await?;
    info!(entries = created.len(), "extracted tar.gz archive");

    let _ = tokio::fs::remove_file(&archive_path).await;

    Ok(aggregate(&[report]))
}

/// Extracts every entry of a gzip-compressed tarball into `dest_dir`,
/// returning the ordered list of created paths.
pub async fn targz_extract(archive: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let archive = archive.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    tokio::task::spawn_blocking(move || targz_extract_blocking(&archive, &dest_dir))
        .await
        .expect("tar.gz extraction task panicked")
}

fn targz_extract_blocking(archive: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let file = std::fs::File::open(archive).map_err(|source| ArchiveError::Read {
        path: archive.to_path_buf(),
        source,
    })?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut tar = tar::Archive::new(decoder);

    let entries = tar.entries().map_err(|source| ArchiveError::Read {
        path: archive.to_path_buf(),
        source,
    })?;

    let mut created = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|source| ArchiveError::Read {
            path: archive.to_path_buf(),
            source,
        })?;
        let entry_path = entry
            .path()
            .map_err(|source| ArchiveError::Read {
                path: archive.to_path_buf(),
                source,
            })?
            .to_path_buf();
        let out_path = dest_dir.join(&entry_path);

        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|source| ArchiveError::ExtractEntry {
                path: archive.to_path_buf(),
                entry: entry_path.display().to_string(),
                source,
            })?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| ArchiveError::ExtractEntry {
                    path: archive.to_path_buf(),
                    entry: entry_path.display().to_string(),
                    source,
                })?;
            }
            entry
                .unpack(&out_path)
                .map_err(|source| ArchiveError::ExtractEntry {
                    path: archive.to_path_buf(),
                    entry: entry_path.display().to_string(),
                    source,
                })?;
        }
        created.push(out_path);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_targz(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let data = b"hello from tar";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "sub/hello.txt", &data[..]).unwrap();

        let encoder = builder.into_inner().unwrap();
        encoder.finish().unwrap();
    }

    #[tokio::test]
    async fn extracts_nested_file() {
        let tmp = tempfile::tempdir().unwrap();
        let archive_path = tmp.path().join("archive.tar.gz");
        write_test_targz(&archive_path);

        let dest = tmp.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();

        let created = targz_extract(&archive_path, &dest).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(
            std::fs::read(dest.join("sub/hello.txt")).unwrap(),
            b"hello from tar"
        );
    }
}
