//! Hand-rolled, fault-injecting fakes for the [`Clock`], [`Filesystem`],
//! and [`StorageReader`] traits. Used by this crate's own unit tests and
//! by the integration tests under `tests/`.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWrite;

use crate::clock::Clock;
use crate::error::StorageError;
use crate::fs::{BoxedWriter, Filesystem};
use crate::storage::{ByteStream, StorageReader};

/// [`Clock`] that reports real wall time but never actually sleeps,
/// so timeout-staircase and backoff tests run instantly.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantClock;

#[async_trait]
impl Clock for InstantClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
struct FakeFsInner {
    files: HashMap<PathBuf, Vec<u8>>,
    dirs: HashSet<PathBuf>,
    permissions: HashMap<PathBuf, u32>,
    create_failures_remaining: usize,
    mkdir_failures_remaining: usize,
}

/// In-memory [`Filesystem`] that can be told to fail its next N
/// `create_file`/`create_dir_all` calls, for exercising the retry
/// loop's filesystem-error path.
#[derive(Clone, Default)]
pub struct FakeFilesystem {
    inner: Arc<Mutex<FakeFsInner>>,
}

impl FakeFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_create(&self) {
        self.inner.lock().unwrap().create_failures_remaining = 1;
    }

    pub fn fail_creates(&self, count: usize) {
        self.inner.lock().unwrap().create_failures_remaining = count;
    }

    pub fn fail_next_mkdir(&self) {
        self.inner.lock().unwrap().mkdir_failures_remaining = 1;
    }

    pub fn file_contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().files.get(path).cloned()
    }

    pub fn file_exists(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().files.contains_key(path)
    }

    pub fn file_mode(&self, path: &Path) -> Option<u32> {
        self.inner.lock().unwrap().permissions.get(path).copied()
    }

    pub fn dir_exists(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().dirs.contains(path)
    }
}

#[async_trait]
impl Filesystem for FakeFilesystem {
    async fn create_file(&self, path: &Path) -> io::Result<BoxedWriter> {
        let mut inner = self.inner.lock().unwrap();
        if inner.create_failures_remaining > 0 {
            inner.create_failures_remaining -= 1;
            return Err(io::Error::other("forced create failure"));
        }
        inner.files.insert(path.to_path_buf(), Vec::new());
        Ok(Box::pin(InMemoryWriter {
            path: path.to_path_buf(),
            buffer: Vec::new(),
            store: Arc::clone(&self.inner),
        }))
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file missing"))
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.mkdir_failures_remaining > 0 {
            inner.mkdir_failures_remaining -= 1;
            return Err(io::Error::other("forced mkdir failure"));
        }
        inner.dirs.insert(path.to_path_buf());
        Ok(())
    }

    async fn set_permissions(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .permissions
            .insert(path.to_path_buf(), mode);
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let Some(bytes) = inner.files.remove(from) else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "rename source missing"));
        };
        inner.files.insert(to.to_path_buf(), bytes);
        if let Some(mode) = inner.permissions.remove(from) {
            inner.permissions.insert(to.to_path_buf(), mode);
        }
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.files.remove(path).is_none() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "file missing"));
        }
        Ok(())
    }
}

struct InMemoryWriter {
    path: PathBuf,
    buffer: Vec<u8>,
    store: Arc<Mutex<FakeFsInner>>,
}

impl AsyncWrite for InMemoryWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.store
            .lock()
            .unwrap()
            .files
            .insert(this.path.clone(), std::mem::take(&mut this.buffer));
        Poll::Ready(Ok(()))
    }
}

#[derive(Clone)]
enum FakeBehavior {
    Bytes(Vec<u8>),
    Denied { principal: String },
    Stall { delay: Duration },
}

/// In-memory [`StorageReader`] whose responses are configured per
/// `(bucket, object)` key.
#[derive(Clone, Default)]
pub struct FakeStorageReader {
    objects: Arc<Mutex<HashMap<(String, String), FakeBehavior>>>,
}

impl FakeStorageReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(bucket: &str, object: &str, bytes: Vec<u8>) -> Self {
        let reader = Self::new();
        reader.set_object(bucket, object, bytes);
        reader
    }

    pub fn denying(bucket: &str, object: &str, principal: &str) -> Self {
        let reader = Self::new();
        reader.objects.lock().unwrap().insert(
            (bucket.to_string(), object.to_string()),
            FakeBehavior::Denied {
                principal: principal.to_string(),
            },
        );
        reader
    }

    pub fn stalling(bucket: &str, object: &str, delay: Duration) -> Self {
        let reader = Self::new();
        reader.objects.lock().unwrap().insert(
            (bucket.to_string(), object.to_string()),
            FakeBehavior::Stall { delay },
        );
        reader
    }

    pub fn set_object(&self, bucket: &str, object: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), object.to_string()),
            FakeBehavior::Bytes(bytes),
        );
    }
}

#[async_trait]
impl StorageReader for FakeStorageReader {
    async fn open(
        &self,
        bucket: &str,
        object: &str,
        _generation: Option<i64>,
    ) -> Result<ByteStream, StorageError> {
        let behavior = self
            .objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), object.to_string()))
            .cloned()
            .unwrap_or_else(|| panic!("no fake object configured for {bucket}/{object}"));

        match behavior {
            FakeBehavior::Bytes(bytes) => {
                let chunk: Result<Bytes, StorageError> = Ok(Bytes::from(bytes));
                Ok(Box::pin(futures_util::stream::once(async { chunk })))
            }
            FakeBehavior::Denied { principal } => Err(StorageError::PermissionDenied {
                bucket: bucket.to_string(),
                object: object.to_string(),
                principal,
            }),
            FakeBehavior::Stall { delay } => {
                let bucket = bucket.to_string();
                let object = object.to_string();
                Ok(Box::pin(futures_util::stream::once(async move {
                    tokio::time::sleep(delay).await;
                    Err(StorageError::Transport {
                        bucket,
                        object,
                        message: "stalled reader gave up".to_string(),
                    })
                })))
            }
        }
    }
}
