//! Concurrent fetch engine that materializes a build's source tree
//! from an object-storage bucket: a bounded worker pool, per-job retry
//! and timeout policy, staged atomic writes, and manifest/zip/tar.gz
//! ingestion dispatchers.

pub mod clock;
pub mod config;
pub mod dirs;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod fs;
pub mod gcs_url;
pub mod model;
pub mod pool;
pub mod retry;
pub mod stats;
pub mod storage;
pub mod timeout_policy;

#[doc(hidden)]
pub mod test_support;

pub use config::{Cli, FetcherConfig, IngestionKind};
pub use error::{ArchiveError, DispatchError, FetchError, StorageError};
pub use model::{Job, JobReport, JobStats};
