//! The created-directory set: a mapping from absolute directory paths
//! to a marker, tracking parent directories the engine has already
//! ensured. Safe for concurrent read-modify-write; a failed mkdir must
//! never poison it.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::fs::Filesystem;

#[derive(Clone, Default)]
pub struct CreatedDirs {
    seen: Arc<Mutex<HashSet<PathBuf>>>,
}

impl CreatedDirs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures `dir` exists, consulting (and only updating on success)
    /// the shared set to skip redundant `mkdir -p` calls.
    pub async fn ensure(&self, fs: &dyn Filesystem, dir: &Path) -> io::Result<()> {
        {
            let seen = self.seen.lock().await;
            if seen.contains(dir) {
                return Ok(());
            }
        }

        fs.create_dir_all(dir).await?;

        let mut seen = self.seen.lock().await;
        seen.insert(dir.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeFilesystem;

    #[tokio::test]
    async fn skips_redundant_mkdir() {
        let fs = FakeFilesystem::new();
        let dirs = CreatedDirs::new();

        dirs.ensure(&fs, Path::new("/dest/sub")).await.unwrap();
        assert!(fs.dir_exists(Path::new("/dest/sub")));

        // A failure configured now would surface only if ensure()
        // actually calls create_dir_all again.
        fs.fail_next_mkdir();
        dirs.ensure(&fs, Path::new("/dest/sub")).await.unwrap();
    }

    #[tokio::test]
    async fn failed_mkdir_does_not_poison_the_set() {
        let fs = FakeFilesystem::new();
        let dirs = CreatedDirs::new();

        fs.fail_next_mkdir();
        assert!(dirs.ensure(&fs, Path::new("/dest/sub")).await.is_err());

        // Next attempt should retry the real mkdir, not short-circuit
        // as already-created.
        dirs.ensure(&fs, Path::new("/dest/sub")).await.unwrap();
        assert!(fs.dir_exists(Path::new("/dest/sub")));
    }
}
