//! Stats aggregator: tallies bytes, retries, successes, and failures
//! across a batch of job reports.

use crate::model::{JobReport, JobStats};

/// Aggregates a batch of reports produced by a [`crate::pool::WorkerPool`]
/// run.
pub fn aggregate(reports: &[JobReport]) -> JobStats {
    let mut stats = JobStats {
        success: true,
        ..Default::default()
    };

    for report in reports {
        stats.files += 1;
        stats.retries += report.attempts.len().saturating_sub(1);

        if report.success {
            stats.bytes += report.bytes;
        } else {
            stats.success = false;
            if let Some(err) = &report.err {
                stats
                    .errors
                    .push((report.job.target_filename().to_string(), err.clone()));
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::model::{AttemptRecord, Job};
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    fn job(name: &str) -> Job {
        Job {
            bucket: "b".into(),
            object: name.into(),
            generation: None,
            filename: Some(name.into()),
            expected_sha1: None,
        }
    }

    fn successful_report(name: &str, bytes: u64, attempts: usize) -> JobReport {
        let now = Instant::now();
        JobReport {
            job: job(name),
            success: true,
            err: None,
            started_at: now,
            completed_at: now,
            bytes,
            final_path: Some(PathBuf::from(format!("/dest/{name}"))),
            attempts: (0..attempts)
                .map(|i| AttemptRecord {
                    started_at: now,
                    elapsed: Duration::ZERO,
                    outcome: if i + 1 == attempts {
                        Ok(())
                    } else {
                        Err(FetchError::Transport("retry".into()))
                    },
                })
                .collect(),
        }
    }

    fn failed_report(name: &str) -> JobReport {
        let now = Instant::now();
        JobReport {
            job: job(name),
            success: false,
            err: Some(FetchError::Transport("gave up".into())),
            started_at: now,
            completed_at: now,
            bytes: 0,
            final_path: None,
            attempts: vec![AttemptRecord {
                started_at: now,
                elapsed: Duration::ZERO,
                outcome: Err(FetchError::Transport("gave up".into())),
            }],
        }
    }

    #[test]
    fn empty_run_is_a_success() {
        let stats = aggregate(&[]);
        assert_eq!(stats.files, 0);
        assert!(stats.success);
    }

    #[test]
    fn tallies_bytes_and_retries_across_reports() {
        let reports = vec![
            successful_report("sfile1.js", 17, 1),
            successful_report("sfile2.jpg", 18, 1),
            successful_report("sfile3", 19, 1),
        ];
        let stats = aggregate(&reports);
        assert_eq!(stats.files, 3);
        assert_eq!(stats.bytes, 54);
        assert_eq!(stats.retries, 0);
        assert!(stats.success);
    }

    #[test]
    fn failures_mark_overall_run_unsuccessful_and_collect_errors() {
        let reports = vec![successful_report("ok.js", 5, 2), failed_report("bad.js")];
        let stats = aggregate(&reports);
        assert_eq!(stats.files, 2);
        assert_eq!(stats.bytes, 5);
        assert_eq!(stats.retries, 1);
        assert!(!stats.success);
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.errors[0].0, "bad.js");
    }
}
