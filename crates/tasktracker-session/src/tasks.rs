//! Task board of one project partition

use crate::error::SessionError;
use std::sync::Arc;
use tasktracker_model::{PartitionKey, Task, TaskId, TaskStatus};
use tasktracker_store::{LiveSequence, StoreError, StoreHandle, WriteOp};
use tokio::task::JoinHandle;

/// Live tasks of a project partition plus the writes a user can issue on them.
///
/// Wraps a `Ready` handle owned by a lifecycle segment; once that segment is
/// torn down every operation reports `StoreUnavailable`.
#[derive(Debug, Clone)]
pub struct TaskBoard {
    store: Arc<StoreHandle>,
}

impl TaskBoard {
    /// Create board over `store`
    #[inline]
    #[must_use]
    pub fn new(store: Arc<StoreHandle>) -> Self {
        Self { store }
    }

    /// Partition the board reads and writes
    #[must_use]
    pub fn partition(&self) -> &PartitionKey {
        self.store.partition()
    }

    /// Live tasks, sorted by id
    ///
    /// # Errors
    /// - `SessionError::StoreUnavailable` if the handle is not `Ready`
    pub fn tasks(&self) -> Result<LiveSequence<Task>, SessionError> {
        self.store.tasks().map_err(SessionError::StoreUnavailable)
    }

    /// Create a task titled `title` in the background.
    ///
    /// The result arrives through the returned join handle; the live task list
    /// picks the new task up on its own.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create_task(&self, title: impl Into<String>) -> JoinHandle<Result<Task, SessionError>> {
        let store = Arc::clone(&self.store);
        let title = title.into();
        tokio::spawn(async move {
            let task = Task::new(title)
                .map_err(|e| SessionError::TaskWriteFailed(StoreError::from(e)))?;
            let created = task.clone();
            store
                .write(WriteOp::InsertTask(task))
                .await
                .map_err(|e| write_error(&store, e))?;
            tracing::info!(partition = %store.partition(), task = %created.id, "task created");
            Ok(created)
        })
    }

    /// Change the status of task `id`
    ///
    /// # Errors
    /// - `SessionError::StoreUnavailable` if the handle is not `Ready`
    /// - `SessionError::TaskWriteFailed` if the task is unknown or the write is rejected
    pub async fn set_status(&self, id: TaskId, status: TaskStatus) -> Result<(), SessionError> {
        self.store
            .write(WriteOp::SetTaskStatus { id, status })
            .await
            .map_err(|e| write_error(&self.store, e))?;
        tracing::debug!(partition = %self.partition(), task = %id, %status, "task status changed");
        Ok(())
    }

    /// Delete task `id`
    ///
    /// # Errors
    /// - `SessionError::StoreUnavailable` if the handle is not `Ready`
    /// - `SessionError::TaskWriteFailed` if the task is unknown or the write is rejected
    pub async fn delete(&self, id: TaskId) -> Result<(), SessionError> {
        self.store
            .write(WriteOp::DeleteTask(id))
            .await
            .map_err(|e| write_error(&self.store, e))?;
        tracing::debug!(partition = %self.partition(), task = %id, "task deleted");
        Ok(())
    }
}

fn write_error(store: &StoreHandle, error: StoreError) -> SessionError {
    tracing::warn!(partition = %store.partition(), error = %error, "task write failed");
    match error {
        StoreError::NotReady(_) | StoreError::Closed(_) => SessionError::StoreUnavailable(error),
        other => SessionError::TaskWriteFailed(other),
    }
}
