//! A thin indirection over file operations (create, rename, chmod,
//! mkdirall, open, removeall) so tests may inject failures without
//! touching a real disk.

use std::io;
use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send + Unpin>>;

#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Creates (truncating) a file for writing.
    async fn create_file(&self, path: &Path) -> io::Result<BoxedWriter>;

    /// Reads a whole file's contents. Used to decode a manifest that
    /// was just materialized by the fetcher.
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Creates `path` and all missing parent directories. Idempotent.
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Sets the Unix permission bits on `path`.
    async fn set_permissions(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Atomically moves `from` to `to`, replacing any existing file at
    /// `to`.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Removes a single file. Implementations should tolerate a
    /// not-found error the way callers expect (callers decide whether
    /// to treat `NotFound` as success).
    async fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// Disk-backed [`Filesystem`] using `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFilesystem;

#[async_trait]
impl Filesystem for RealFilesystem {
    async fn create_file(&self, path: &Path) -> io::Result<BoxedWriter> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Box::pin(file))
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn set_permissions(&self, path: &Path, mode: u32) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(mode);
            tokio::fs::set_permissions(path, perms).await
        }
        #[cfg(not(unix))]
        {
            let _ = (path, mode);
            Ok(())
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

/// Removes `path`, tolerating an absent file.
pub async fn remove_if_present(fs: &dyn Filesystem, path: &Path) -> io::Result<()> {
    match fs.remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
