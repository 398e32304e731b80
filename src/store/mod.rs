//! Persistence of task records.
//!
//! A store is a keyed record store: it does not enforce the phase rules,
//! which live on [`Task`]. Every write replaces the whole record.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::state_machine::Task;

pub use file::FileTaskStore;
pub use memory::InMemoryTaskStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(String),

    #[error("task {0} already exists")]
    AlreadyExists(String),

    #[error("invalid task id '{0}'")]
    InvalidId(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt task record: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait TaskRecordStore: Send + Sync {
    /// Inserts a new record. Fails if the id is taken.
    async fn create(&self, task: &Task) -> Result<(), StoreError>;

    /// Replaces an existing record. Fails if the id is unknown.
    async fn update(&self, task: &Task) -> Result<(), StoreError>;

    async fn get_by_task_id(&self, task_id: &str) -> Result<Option<Task>, StoreError>;
}
