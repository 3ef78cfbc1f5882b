use std::path::PathBuf;
use std::time::Duration;

/// Errors surfaced by a single fetch attempt.
///
/// [`FetchError::Permission`] is fatal and bypasses retry; the other
/// variants are retriable by the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error(
        "Access to bucket {bucket} denied. You must grant Storage Object Viewer permission to {principal}. If you are using VPC Service Controls, you must also grant it access to your service perimeter."
    )]
    Permission { bucket: String, principal: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl FetchError {
    /// True for errors the retry loop must not retry past.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Permission { .. })
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Filesystem(err.to_string())
    }
}

/// Errors surfaced by an ingestion dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("error decoding JSON from manifest file {path}: {source}")]
    ManifestDecode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid manifest source URL {url:?}: {reason}")]
    InvalidSourceUrl { url: String, reason: String },

    #[error("error opening manifest file {path}: {source}")]
    ManifestOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Errors surfaced while expanding a zip or tar.gz archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("error reading archive {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error reading zip entry {index} of {path}: {source}")]
    ZipEntry {
        path: PathBuf,
        index: usize,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("error extracting {entry} from {path}: {source}")]
    ExtractEntry {
        path: PathBuf,
        entry: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by an object-storage read.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("permission denied for {bucket}/{object}")]
    PermissionDenied {
        bucket: String,
        object: String,
        principal: String,
    },

    #[error("transport error reading {bucket}/{object}: {message}")]
    Transport {
        bucket: String,
        object: String,
        message: String,
    },
}

impl From<StorageError> for FetchError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::PermissionDenied {
                bucket, principal, ..
            } => FetchError::Permission { bucket, principal },
            StorageError::Transport { message, .. } => FetchError::Transport(message),
        }
    }
}
