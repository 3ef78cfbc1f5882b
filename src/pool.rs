//! Fixed-size worker pool: spawns `WorkerCount` concurrent consumers
//! draining a shared job channel and feeding a report channel, until
//! the job channel is closed and drained.
//!
//! No ordering guarantee is provided between jobs; reports arrive in
//! completion order, not submission order. Workers are independent and
//! coordinate only through the shared created-directory set.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::clock::Clock;
use crate::config::FetcherConfig;
use crate::dirs::CreatedDirs;
use crate::fs::Filesystem;
use crate::model::{Job, JobReport};
use crate::retry::fetch_with_retry;
use crate::storage::StorageReader;

pub struct WorkerPool {
    storage: Arc<dyn StorageReader>,
    fs: Arc<dyn Filesystem>,
    clock: Arc<dyn Clock>,
    cfg: Arc<FetcherConfig>,
}

impl WorkerPool {
    pub fn new(
        storage: Arc<dyn StorageReader>,
        fs: Arc<dyn Filesystem>,
        clock: Arc<dyn Clock>,
        cfg: Arc<FetcherConfig>,
    ) -> Self {
        WorkerPool {
            storage,
            fs,
            clock,
            cfg,
        }
    }

    /// Runs every job in `jobs` to completion and returns their
    /// reports. The report channel is sized equal to `jobs.len()` so
    /// workers never block on publishing.
    pub async fn run(&self, jobs: Vec<Job>, outer: &CancellationToken) -> Vec<JobReport> {
        let job_count = jobs.len();
        if job_count == 0 {
            return Vec::new();
        }

        let worker_count = self.cfg.workers.max(1).min(job_count);
        info!(job_count, worker_count, "starting worker pool");

        let (job_tx, job_rx) = mpsc::channel::<Job>(job_count);
        for job in jobs {
            // Capacity equals job_count, so this never blocks.
            let _ = job_tx.send(job).await;
        }
        drop(job_tx);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let (report_tx, mut report_rx) = mpsc::channel::<JobReport>(job_count);
        let created_dirs = CreatedDirs::new();

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let job_rx = Arc::clone(&job_rx);
            let report_tx = report_tx.clone();
            let storage = Arc::clone(&self.storage);
            let fs = Arc::clone(&self.fs);
            let clock = Arc::clone(&self.clock);
            let cfg = Arc::clone(&self.cfg);
            let created_dirs = created_dirs.clone();
            let outer = outer.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = job_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else { break };

                    let report = fetch_with_retry(
                        storage.as_ref(),
                        fs.as_ref(),
                        &clock,
                        &created_dirs,
                        &cfg,
                        job,
                        &outer,
                    )
                    .await;

                    if report_tx.send(report).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(report_tx);

        for handle in handles {
            let _ = handle.await;
        }

        let mut reports = Vec::with_capacity(job_count);
        while let Some(report) = report_rx.recv().await {
            reports.push(report);
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeFilesystem, FakeStorageReader, InstantClock};
    use std::path::PathBuf;

    fn cfg(workers: usize, retries: u32) -> Arc<FetcherConfig> {
        Arc::new(FetcherConfig {
            bucket: "b".into(),
            object: "manifest.json".into(),
            generation: None,
            dest_dir: PathBuf::from("/dest"),
            staging_dir: PathBuf::from("/staging"),
            workers,
            retries,
            stall_timeout: true,
            timeouts: Default::default(),
        })
    }

    fn job(name: &str) -> Job {
        Job {
            bucket: "b".into(),
            object: name.into(),
            generation: None,
            filename: Some(name.into()),
            expected_sha1: None,
        }
    }

    #[tokio::test]
    async fn runs_every_job_and_reports_all_of_them() {
        let storage = FakeStorageReader::new();
        storage.set_object("b", "sfile1.js", vec![0u8; 17]);
        storage.set_object("b", "sfile2.jpg", vec![0u8; 18]);
        storage.set_object("b", "sfile3", vec![0u8; 19]);

        let fs = FakeFilesystem::new();
        let pool = WorkerPool::new(
            Arc::new(storage),
            Arc::new(fs.clone()),
            Arc::new(InstantClock),
            cfg(2, 3),
        );

        let jobs = vec![job("sfile1.js"), job("sfile2.jpg"), job("sfile3")];
        let outer = CancellationToken::new();
        let reports = pool.run(jobs, &outer).await;

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.success));
        let total_bytes: u64 = reports.iter().map(|r| r.bytes).sum();
        assert_eq!(total_bytes, 54);
    }

    #[tokio::test]
    async fn empty_job_list_yields_no_reports() {
        let storage = FakeStorageReader::new();
        let fs = FakeFilesystem::new();
        let pool = WorkerPool::new(
            Arc::new(storage),
            Arc::new(fs),
            Arc::new(InstantClock),
            cfg(2, 3),
        );

        let outer = CancellationToken::new();
        let reports = pool.run(Vec::new(), &outer).await;
        assert!(reports.is_empty());
    }
}
