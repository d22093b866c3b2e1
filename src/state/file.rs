//! Single-line checkpoint file

use super::CheckpointStore;
use crate::error::RelayerResult;

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Stores the task id as the sole content of a file.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so readers never observe a partial id.
pub struct FileCheckpointStore {
    path: PathBuf,
    /// Serializes writers within the process
    lock: Mutex<()>,
}

impl FileCheckpointStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn read(&self) -> RelayerResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let id = content.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, task_id: &str) -> RelayerResult<()> {
        let _guard = self.lock.lock().await;

        let temp = self.temp_path();
        tokio::fs::write(&temp, task_id).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!("Checkpoint {:?} now at task {}", self.path, task_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_read_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("latest-task.txt"));
        assert_eq!(store.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest-task.txt");
        let store = FileCheckpointStore::new(&path);

        store.write("task-1").await.unwrap();
        store.write("task-2").await.unwrap();

        assert_eq!(store.read().await.unwrap().as_deref(), Some("task-2"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "task-2");
        assert!(!dir.path().join("latest-task.txt.tmp").exists());
    }

    #[tokio::test]
    async fn test_read_trims_operator_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest-task.txt");
        std::fs::write(&path, "task-9\n").unwrap();

        let store = FileCheckpointStore::new(&path);
        assert_eq!(store.read().await.unwrap().as_deref(), Some("task-9"));
    }

    #[tokio::test]
    async fn test_concurrent_writes_leave_one_complete_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCheckpointStore::new(dir.path().join("latest-task.txt")));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.write(&format!("task-{}", i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let id = store.read().await.unwrap().unwrap();
        assert!(id.starts_with("task-"));
        assert!(id["task-".len()..].parse::<u32>().unwrap() < 8);
    }

    #[tokio::test]
    async fn test_unwritable_location_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("missing").join("latest-task.txt"));
        assert!(store.write("task-1").await.is_err());
    }
}
