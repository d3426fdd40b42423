// ── Advisory file locks ──
//
// One exclusive `flock` per resource type (and per render target).
// Works across processes, and across tasks in one process because every
// acquisition opens its own file description.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use tokio::time::Instant;
use tracing::debug;

use crate::error::CoreError;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Held lock; released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire an exclusive lock on `path`, polling until `timeout`.
    pub async fn acquire(path: &Path, timeout: Duration) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| CoreError::io(path, e))?;

        let deadline = Instant::now() + timeout;
        let contended = fs2::lock_contended_error().raw_os_error();

        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    debug!(path = %path.display(), "lock acquired");
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.raw_os_error() == contended => {
                    if Instant::now() >= deadline {
                        return Err(CoreError::Lock {
                            path: path.to_path_buf(),
                            reason: format!("still held after {}s", timeout.as_secs()),
                        });
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => {
                    return Err(CoreError::Lock {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "lock released");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_times_out_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks").join("dhcpentries.lock");

        let held = FileLock::acquire(&path, Duration::from_secs(1)).await.unwrap();
        let err = FileLock::acquire(&path, Duration::from_millis(120))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Lock { .. }));

        drop(held);
        FileLock::acquire(&path, Duration::from_millis(120))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn different_paths_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();
        let _a = FileLock::acquire(&dir.path().join("a.lock"), Duration::from_millis(50))
            .await
            .unwrap();
        let _b = FileLock::acquire(&dir.path().join("b.lock"), Duration::from_millis(50))
            .await
            .unwrap();
    }
}
