//! Data model shared across the fetch engine: jobs, their telemetry,
//! and the derived staging/final paths that make materialization
//! atomic.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::FetchError;

/// An immutable request to materialize one object. Created by a
/// dispatcher, consumed exactly once by a worker.
#[derive(Debug, Clone)]
pub struct Job {
    pub bucket: String,
    pub object: String,
    pub generation: Option<i64>,
    /// Target relative filename; defaults to the object name when
    /// absent.
    pub filename: Option<String>,
    /// Carried but never verified, per the manifest's unused checksum
    /// field.
    pub expected_sha1: Option<String>,
}

impl Job {
    pub fn target_filename(&self) -> &str {
        self.filename.as_deref().unwrap_or(&self.object)
    }
}

/// Per-try telemetry. Appended in order; never mutated after append.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub started_at: Instant,
    pub elapsed: Duration,
    pub outcome: Result<(), FetchError>,
}

impl AttemptRecord {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Per-job outcome, published to the report queue once retries
/// conclude.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: Job,
    pub success: bool,
    pub err: Option<FetchError>,
    pub started_at: Instant,
    pub completed_at: Instant,
    pub bytes: u64,
    pub final_path: Option<PathBuf>,
    pub attempts: Vec<AttemptRecord>,
}

/// Aggregated across one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct JobStats {
    pub files: usize,
    pub bytes: u64,
    pub retries: usize,
    pub success: bool,
    pub errors: Vec<(String, FetchError)>,
}

/// A pathname inside the private staging directory. Bytes are written
/// here first; the final path appears only after a successful rename.
#[derive(Debug, Clone)]
pub struct StagingPath(pub PathBuf);

/// A pathname inside the destination directory.
#[derive(Debug, Clone)]
pub struct FinalPath(pub PathBuf);

/// Monotonic counter disambiguating staging filenames across
/// concurrently in-flight jobs and retries of the same job.
static STAGING_DISCRIMINATOR: AtomicU64 = AtomicU64::new(0);

/// Derives a job's staging and final paths. The staging name
/// incorporates a unique discriminator so concurrent workers never
/// collide on the same staging file.
pub fn derive_paths(staging_dir: &Path, dest_dir: &Path, job: &Job) -> (StagingPath, FinalPath) {
    let filename = job.target_filename();
    let discriminator = STAGING_DISCRIMINATOR.fetch_add(1, Ordering::Relaxed);
    let staging_name = sanitize_staging_name(filename, discriminator);

    (
        StagingPath(staging_dir.join(staging_name)),
        FinalPath(dest_dir.join(filename)),
    )
}

fn sanitize_staging_name(filename: &str, discriminator: u64) -> String {
    let flattened: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{flattened}.{discriminator}.tmp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn job(filename: &str) -> Job {
        Job {
            bucket: "b".into(),
            object: "o".into(),
            generation: None,
            filename: Some(filename.into()),
            expected_sha1: None,
        }
    }

    #[test]
    fn target_filename_defaults_to_object() {
        let j = Job {
            bucket: "b".into(),
            object: "path/obj.js".into(),
            generation: None,
            filename: None,
            expected_sha1: None,
        };
        assert_eq!(j.target_filename(), "path/obj.js");
    }

    #[test]
    fn derive_paths_nests_under_dest_and_staging_dirs() {
        let staging_dir = PathBuf::from("/tmp/staging");
        let dest_dir = PathBuf::from("/tmp/dest");
        let j = job("sub/file.js");

        let (staging, final_path) = derive_paths(&staging_dir, &dest_dir, &j);
        assert_eq!(final_path.0, dest_dir.join("sub/file.js"));
        assert!(staging.0.starts_with(&staging_dir));
        assert!(staging.0.to_string_lossy().contains("file.js"));
    }

    #[test]
    fn derive_paths_never_collides_for_same_filename() {
        let staging_dir = PathBuf::from("/tmp/staging");
        let dest_dir = PathBuf::from("/tmp/dest");
        let j = job("same.js");

        let (s1, _) = derive_paths(&staging_dir, &dest_dir, &j);
        let (s2, _) = derive_paths(&staging_dir, &dest_dir, &j);
        assert_ne!(s1.0, s2.0);
    }
}
