//! Retrying fetcher: wraps the single-attempt fetcher with bounded
//! retries, staged-write promotion, and per-job telemetry. Never fails
//! externally — a failure manifests as `report.success = false`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::config::{FetcherConfig, FINAL_FILE_MODE};
use crate::dirs::CreatedDirs;
use crate::error::FetchError;
use crate::fetch::fetch_once;
use crate::fs::{self, Filesystem};
use crate::model::{derive_paths, AttemptRecord, Job, JobReport};
use crate::storage::StorageReader;
use crate::timeout_policy::attempt_timeout;

/// Runs `job` to completion (success or retry exhaustion), producing a
/// [`JobReport`]. `outer` is the caller's own cancellation source; a
/// stall watchdog fire does not cancel it and does not prevent the
/// next attempt from starting fresh.
#[instrument(skip(storage, fs, clock, created_dirs, cfg, outer), fields(filename = job.target_filename()))]
pub async fn fetch_with_retry(
    storage: &dyn StorageReader,
    fs: &dyn Filesystem,
    clock: &Arc<dyn Clock>,
    created_dirs: &CreatedDirs,
    cfg: &FetcherConfig,
    job: Job,
    outer: &CancellationToken,
) -> JobReport {
    let started_at = clock.now();
    let (staging, final_path) = derive_paths(&cfg.staging_dir, &cfg.dest_dir, &job);
    let mut attempts = Vec::new();

    let max_attempt = cfg.retries as usize;
    for attempt in 0..=max_attempt {
        if let Some(parent) = final_path.0.parent() {
            if let Err(err) = created_dirs.ensure(fs, parent).await {
                let record = AttemptRecord {
                    started_at: clock.now(),
                    elapsed: Duration::ZERO,
                    outcome: Err(FetchError::from(err)),
                };
                attempts.push(record);
                continue;
            }
        }

        let deadline = if cfg.stall_timeout {
            attempt_timeout(job.target_filename(), attempt, &cfg.timeouts)
        } else {
            Duration::MAX
        };

        let attempt_start = clock.now();
        let result = fetch_once(storage, fs, clock, &job, &staging.0, deadline, outer).await;

        let outcome = match result {
            Ok(bytes) => finalize_attempt(fs, &staging.0, &final_path.0, bytes).await,
            Err(err) => Err(err),
        };

        let elapsed = clock.now().duration_since(attempt_start);

        match outcome {
            Ok(bytes) => {
                attempts.push(AttemptRecord {
                    started_at: attempt_start,
                    elapsed,
                    outcome: Ok(()),
                });
                info!(bytes, attempt, "fetch succeeded");
                return JobReport {
                    job,
                    success: true,
                    err: None,
                    started_at,
                    completed_at: clock.now(),
                    bytes,
                    final_path: Some(final_path.0),
                    attempts,
                };
            }
            Err(err) => {
                let _ = fs::remove_if_present(fs, &staging.0).await;
                let _ = fs::remove_if_present(fs, &final_path.0).await;

                let fatal = err.is_fatal();
                attempts.push(AttemptRecord {
                    started_at: attempt_start,
                    elapsed,
                    outcome: Err(err.clone()),
                });

                if fatal {
                    warn!(%err, attempt, "fatal error, aborting job");
                    return JobReport {
                        job,
                        success: false,
                        err: Some(err),
                        started_at,
                        completed_at: clock.now(),
                        bytes: 0,
                        final_path: None,
                        attempts,
                    };
                }

                warn!(%err, attempt, max_attempt, "retriable error");
            }
        }
    }

    let err = attempts
        .last()
        .and_then(|a| a.outcome.clone().err())
        .expect("at least one attempt recorded");

    JobReport {
        job,
        success: false,
        err: Some(err),
        started_at,
        completed_at: clock.now(),
        bytes: 0,
        final_path: None,
        attempts,
    }
}

/// Chmods the staging file and renames it into place. A failure of
/// either step converts the whole attempt to a failure; the caller
/// removes the staging remnant before the next attempt.
async fn finalize_attempt(
    fs: &dyn Filesystem,
    staging: &std::path::Path,
    final_path: &std::path::Path,
    bytes: u64,
) -> Result<u64, FetchError> {
    fs.set_permissions(staging, FINAL_FILE_MODE)
        .await
        .map_err(FetchError::from)?;
    fs.rename(staging, final_path)
        .await
        .map_err(FetchError::from)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeFilesystem, FakeStorageReader, InstantClock};
    use std::path::{Path, PathBuf};

    fn cfg() -> FetcherConfig {
        FetcherConfig {
            bucket: "b".into(),
            object: "o".into(),
            generation: None,
            dest_dir: PathBuf::from("/dest"),
            staging_dir: PathBuf::from("/staging"),
            workers: 1,
            retries: 3,
            stall_timeout: true,
            timeouts: Default::default(),
        }
    }

    fn job(filename: &str) -> Job {
        Job {
            bucket: "b".into(),
            object: filename.into(),
            generation: None,
            filename: Some(filename.into()),
            expected_sha1: None,
        }
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(InstantClock)
    }

    #[tokio::test]
    async fn happy_path_succeeds_on_first_attempt() {
        let storage = FakeStorageReader::with_object("b", "sfile1.js", vec![0u8; 17]);
        let fs = FakeFilesystem::new();
        let created = CreatedDirs::new();
        let outer = CancellationToken::new();

        let report = fetch_with_retry(
            &storage,
            &fs,
            &clock(),
            &created,
            &cfg(),
            job("sfile1.js"),
            &outer,
        )
        .await;

        assert!(report.success);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.bytes, 17);
        assert_eq!(report.final_path, Some(PathBuf::from("/dest/sfile1.js")));
        assert_eq!(fs.file_contents(Path::new("/dest/sfile1.js")), Some(vec![0u8; 17]));
        assert!(!fs.file_exists(Path::new("/staging/sfile1.js.0.tmp")));
        assert_eq!(fs.file_mode(Path::new("/dest/sfile1.js")), Some(FINAL_FILE_MODE));
    }

    #[tokio::test]
    async fn transient_create_failure_recovers_on_second_attempt() {
        let storage = FakeStorageReader::with_object("b", "sfile1", vec![0u8; 17]);
        let fs = FakeFilesystem::new();
        fs.fail_next_create();
        let created = CreatedDirs::new();
        let outer = CancellationToken::new();

        let report = fetch_with_retry(
            &storage,
            &fs,
            &clock(),
            &created,
            &cfg(),
            job("sfile1"),
            &outer,
        )
        .await;

        assert!(report.success);
        assert_eq!(report.attempts.len(), 2);
        assert!(report.attempts[0].outcome.is_err());
        assert!(report.attempts[1].outcome.is_ok());
        assert!(fs.file_exists(Path::new("/dest/sfile1")));
    }

    #[tokio::test]
    async fn permanent_create_failure_exhausts_retries() {
        let storage = FakeStorageReader::with_object("b", "sfile1", vec![0u8; 17]);
        let fs = FakeFilesystem::new();
        fs.fail_creates(4);
        let created = CreatedDirs::new();
        let outer = CancellationToken::new();

        let mut config = cfg();
        config.retries = 3;

        let report =
            fetch_with_retry(&storage, &fs, &clock(), &created, &config, job("sfile1"), &outer)
                .await;

        assert!(!report.success);
        assert_eq!(report.attempts.len(), 4);
        assert_eq!(report.final_path, None);
        assert!(!fs.file_exists(Path::new("/dest/sfile1")));
    }

    #[tokio::test]
    async fn permission_error_short_circuits_without_exhausting_retries() {
        let storage = FakeStorageReader::denying("b", "secret", "some@robot");
        let fs = FakeFilesystem::new();
        let created = CreatedDirs::new();
        let outer = CancellationToken::new();

        let report = fetch_with_retry(
            &storage,
            &fs,
            &clock(),
            &created,
            &cfg(),
            job("secret"),
            &outer,
        )
        .await;

        assert!(!report.success);
        assert_eq!(report.attempts.len(), 1);
        let err = report.err.expect("expected fatal error");
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Access to bucket b denied. You must grant Storage Object Viewer permission to some@robot. If you are using VPC Service Controls, you must also grant it access to your service perimeter."
        );
    }

    #[tokio::test]
    async fn every_attempt_start_precedes_next_attempt_start() {
        let storage = FakeStorageReader::with_object("b", "sfile1", vec![0u8; 5]);
        let fs = FakeFilesystem::new();
        fs.fail_creates(2);
        let created = CreatedDirs::new();
        let outer = CancellationToken::new();

        let report =
            fetch_with_retry(&storage, &fs, &clock(), &created, &cfg(), job("sfile1"), &outer)
                .await;

        assert!(report.success);
        for window in report.attempts.windows(2) {
            assert!(window[0].started_at <= window[1].started_at);
        }
        assert!(report.started_at <= report.attempts[0].started_at);
        assert!(report.completed_at >= report.attempts.last().unwrap().started_at);
    }
}
