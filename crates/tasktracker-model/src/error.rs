//! Error types for model construction

/// Errors raised while building model values from untrusted input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Principal identifier was empty
    #[error("principal id must not be empty")]
    EmptyPrincipalId,

    /// Partition key was empty
    #[error("partition key must not be empty")]
    EmptyPartition,

    /// Task title was empty or whitespace only
    #[error("task title must not be blank")]
    BlankTaskTitle,

    /// Unknown task status label
    #[error("unknown task status: {0}")]
    UnknownStatus(String),
}
