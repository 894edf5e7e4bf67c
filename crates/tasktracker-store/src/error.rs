//! Error types for store access

use tasktracker_model::{ModelError, PartitionKey, TaskId};

/// Errors reported by store handles and backing collaborators
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backing collaborator could not open the partition
    #[error("failed to open partition {partition}: {reason}")]
    OpenFailed {
        /// Partition that was requested
        partition: PartitionKey,
        /// Collaborator-supplied reason
        reason: String,
    },

    /// Handle has not finished opening
    #[error("store handle for {0} is not ready")]
    NotReady(PartitionKey),

    /// Handle or connection was closed
    #[error("store handle for {0} is closed")]
    Closed(PartitionKey),

    /// Write rejected by the backing collaborator
    #[error("write to partition {partition} failed: {reason}")]
    WriteFailed {
        /// Target partition
        partition: PartitionKey,
        /// Collaborator-supplied reason
        reason: String,
    },

    /// Task does not exist in the partition
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Input rejected before reaching the store
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ModelError),
}

impl StoreError {
    /// Check if the error came from a handle that is no longer usable
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    /// Create open failure for partition
    pub fn open_failed(partition: &PartitionKey, reason: impl Into<String>) -> Self {
        Self::OpenFailed {
            partition: partition.clone(),
            reason: reason.into(),
        }
    }

    /// Create write failure for partition
    pub fn write_failed(partition: &PartitionKey, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            partition: partition.clone(),
            reason: reason.into(),
        }
    }
}
