//! Seam to the backing store and sync engine
//!
//! The sync wire protocol, conflict resolution and persistence format all live
//! behind these traits. The session layer only ever sees a `StoreHandle`.

use crate::error::StoreError;
use crate::live::LiveSequence;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tasktracker_model::{MembershipRecord, PartitionKey, Task, TaskId, TaskStatus};

/// Writes a client may issue against a project partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert a new task
    InsertTask(Task),
    /// Change the status of an existing task
    SetTaskStatus {
        /// Task to update
        id: TaskId,
        /// New status
        status: TaskStatus,
    },
    /// Remove a task
    DeleteTask(TaskId),
}

/// An open connection to one partition's data
#[async_trait]
pub trait PartitionConnection: Send + Sync + Debug {
    /// Partition this connection is scoped to
    fn partition(&self) -> &PartitionKey;

    /// Raw live membership records in the partition
    fn memberships(&self) -> LiveSequence<MembershipRecord>;

    /// Raw live tasks in the partition
    fn tasks(&self) -> LiveSequence<Task>;

    /// Apply a write
    ///
    /// # Errors
    /// - `StoreError::Closed` once the connection is closed
    /// - `StoreError::WriteFailed` if the collaborator rejects the write
    async fn write(&self, op: WriteOp) -> Result<(), StoreError>;

    /// Release the connection. Must be idempotent.
    fn close(&self);
}

/// Opens partition-scoped connections; may suspend for an unbounded time
#[async_trait]
pub trait StoreOpener: Send + Sync {
    /// Open `partition`
    ///
    /// # Errors
    /// - `StoreError::OpenFailed` if the collaborator cannot open the partition
    async fn open(
        &self,
        partition: &PartitionKey,
    ) -> Result<Arc<dyn PartitionConnection>, StoreError>;
}
