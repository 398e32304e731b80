//! One JSON document per task under a directory.
//!
//! Writes go to a temporary file that is renamed over the record, so a reader
//! never sees a half-written task.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{StoreError, TaskRecordStore};
use crate::state_machine::Task;

#[derive(Debug, Clone)]
pub struct FileTaskStore {
    dir: PathBuf,
}

impl FileTaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, task_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !task_id.is_empty()
            && task_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidId(task_id.to_string()));
        }
        Ok(self.dir.join(format!("{task_id}.json")))
    }

    async fn write(&self, path: &Path, task: &Task) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec_pretty(task)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskRecordStore for FileTaskStore {
    async fn create(&self, task: &Task) -> Result<(), StoreError> {
        let path = self.record_path(&task.task_id)?;
        if tokio::fs::try_exists(&path).await? {
            return Err(StoreError::AlreadyExists(task.task_id.clone()));
        }
        self.write(&path, task).await?;
        tracing::debug!(task_id = %task.task_id, path = %path.display(), "task record created");
        Ok(())
    }

    async fn update(&self, task: &Task) -> Result<(), StoreError> {
        let path = self.record_path(&task.task_id)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(StoreError::NotFound(task.task_id.clone()));
        }
        self.write(&path, task).await
    }

    async fn get_by_task_id(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let path = self.record_path(task_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
