use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{StoreError, TaskRecordStore};
use crate::state_machine::Task;

/// [`TaskRecordStore`] kept in a [`DashMap`]. Records live for the life of the process.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    records: DashMap<String, Task>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TaskRecordStore for InMemoryTaskStore {
    async fn create(&self, task: &Task) -> Result<(), StoreError> {
        match self.records.entry(task.task_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(task.task_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(task.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, task: &Task) -> Result<(), StoreError> {
        let mut entry = self
            .records
            .get_mut(&task.task_id)
            .ok_or_else(|| StoreError::NotFound(task.task_id.clone()))?;
        *entry = task.clone();
        Ok(())
    }

    async fn get_by_task_id(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.records.get(task_id).map(|entry| entry.value().clone()))
    }
}
