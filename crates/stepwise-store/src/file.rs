//! File-backed implementation of `TaskStore`.
//!
//! One file per paused task: `<dir>/<task_id>.json`. Saves are atomic:
//!
//! 1. Write the snapshot to a uniquely named temporary file in `<dir>`
//! 2. Sync the file to disk
//! 3. Rename it over the target
//!
//! A crash mid-save leaves either the previous snapshot or the new one,
//! never a partial file. Stray `.tmp` and `.claim` files from a crash are
//! ignored by `task_ids`.
//!
//! `take` claims a snapshot by renaming it to a uniquely named `.claim`
//! file before reading it. A rename is atomic, so when two resumes race for
//! the same file exactly one of them gets it; the other sees `NotFound`.
//! A snapshot saved after the rename is a new file and is left alone.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info, warn};

use stepwise_contracts::{
    error::{StoreError, StoreResult},
    task::TaskId,
};
use stepwise_core::traits::TaskStore;

const EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FileTaskStore {
    dir: PathBuf,
}

impl FileTaskStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, "create store directory", &e))?;
        info!(dir = %dir.display(), "file task store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, task_id: &TaskId) -> PathBuf {
        self.dir.join(format!("{task_id}.{EXTENSION}"))
    }

    /// Ids of every stored task.
    pub async fn task_ids(&self) -> StoreResult<Vec<TaskId>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, "list store directory", &e))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir, "list store directory", &e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(TaskId::parse)
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn write_atomic(&self, target: &Path, bytes: &[u8]) -> StoreResult<()> {
        let temp = self
            .dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4()));

        if let Err(e) = write_and_sync(&temp, bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(io_error(&temp, "write temporary snapshot", &e));
        }

        if let Err(e) = fs::rename(&temp, target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(io_error(target, "replace snapshot", &e));
        }
        Ok(())
    }
}

async fn write_and_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

fn io_error(path: &Path, action: &str, e: &std::io::Error) -> StoreError {
    StoreError::Io {
        reason: format!("failed to {action} '{}': {e}", path.display()),
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn save(&self, task_id: &TaskId, snapshot: &[u8]) -> StoreResult<()> {
        let target = self.path_for(task_id);
        self.write_atomic(&target, snapshot).await?;
        debug!(
            task_id = %task_id,
            path = %target.display(),
            bytes = snapshot.len(),
            "snapshot written"
        );
        Ok(())
    }

    async fn load(&self, task_id: &TaskId) -> StoreResult<Vec<u8>> {
        let path = self.path_for(task_id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                task_id: task_id.to_string(),
            }),
            Err(e) => Err(io_error(&path, "read snapshot", &e)),
        }
    }

    async fn take(&self, task_id: &TaskId) -> StoreResult<Vec<u8>> {
        let path = self.path_for(task_id);
        let claim = self
            .dir
            .join(format!(".{task_id}.{}.claim", uuid::Uuid::new_v4()));

        match fs::rename(&path, &claim).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    task_id: task_id.to_string(),
                })
            }
            Err(e) => return Err(io_error(&path, "claim snapshot", &e)),
        }

        let bytes = fs::read(&claim)
            .await
            .map_err(|e| io_error(&claim, "read claimed snapshot", &e))?;
        if let Err(e) = fs::remove_file(&claim).await {
            warn!(task_id = %task_id, error = %e, "claimed snapshot not removed");
        }
        debug!(task_id = %task_id, bytes = bytes.len(), "snapshot taken");
        Ok(bytes)
    }

    async fn delete(&self, task_id: &TaskId) -> StoreResult<bool> {
        let path = self.path_for(task_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(task_id = %task_id, "snapshot already removed");
                Ok(false)
            }
            Err(e) => Err(io_error(&path, "remove snapshot", &e)),
        }
    }
}
