//! Single-attempt fetcher: copies one object's bytes into a staging
//! path under a stall watchdog. Never renames, never chmods, never
//! touches the final path.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::FetchError;
use crate::fs::Filesystem;
use crate::model::Job;
use crate::storage::{ByteStream, StorageReader};

/// Copies `job`'s object into `staging_path`, aborting if neither the
/// copy nor a close completes before `deadline` or `outer` fires.
/// Returns the number of bytes written.
pub async fn fetch_once(
    storage: &dyn StorageReader,
    fs: &dyn Filesystem,
    clock: &Arc<dyn Clock>,
    job: &Job,
    staging_path: &Path,
    deadline: Duration,
    outer: &CancellationToken,
) -> Result<u64, FetchError> {
    let stream = storage
        .open(&job.bucket, &job.object, job.generation)
        .await?;

    let mut writer = fs.create_file(staging_path).await?;

    let watchdog = CancellationToken::new();
    let watchdog_timer = watchdog.clone();
    let watchdog_clock = Arc::clone(clock);
    let watchdog_task = tokio::spawn(async move {
        watchdog_clock.sleep(deadline).await;
        watchdog_timer.cancel();
    });

    let copy_result = copy_stream(stream, &mut writer, deadline, &watchdog, outer).await;
    watchdog_task.abort();

    // Always attempt to close, but never let a close error mask an
    // earlier copy failure.
    let close_result = writer.shutdown().await;

    let bytes = copy_result?;
    close_result.map_err(FetchError::from)?;
    Ok(bytes)
}

async fn copy_stream(
    mut stream: ByteStream,
    writer: &mut crate::fs::BoxedWriter,
    deadline: Duration,
    watchdog: &CancellationToken,
    outer: &CancellationToken,
) -> Result<u64, FetchError> {
    let mut bytes = 0u64;
    loop {
        tokio::select! {
            biased;
            () = watchdog.cancelled() => {
                return Err(FetchError::Timeout(deadline));
            }
            () = outer.cancelled() => {
                return Err(FetchError::Transport("fetch cancelled by caller".to_string()));
            }
            chunk = stream.next() => {
                match chunk {
                    Some(Ok(chunk)) => {
                        writer.write_all(&chunk).await.map_err(FetchError::from)?;
                        bytes += chunk.len() as u64;
                    }
                    Some(Err(err)) => return Err(FetchError::from(err)),
                    None => return Ok(bytes),
                }
            }
        }
    }
}
