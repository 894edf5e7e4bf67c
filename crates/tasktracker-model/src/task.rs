//! Tasks stored in a project partition

use crate::error::ModelError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Unique task identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Ulid);

impl TaskId {
    /// Generate new task ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workflow status of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Not started
    #[default]
    Open,
    /// Someone is working on it
    InProgress,
    /// Done
    Complete,
}

impl TaskStatus {
    /// Stored label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "InProgress",
            Self::Complete => "Complete",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(Self::Open),
            "InProgress" => Ok(Self::InProgress),
            "Complete" => Ok(Self::Complete),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work inside a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Identifier, also the display sort key
    pub id: TaskId,
    /// Title entered by the user
    pub name: String,
    /// Current status
    #[serde(default)]
    pub status: TaskStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create an open task with the given title
    ///
    /// # Errors
    /// - `ModelError::BlankTaskTitle` if the title is empty after trimming
    pub fn new(name: impl Into<String>) -> Result<Self, ModelError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ModelError::BlankTaskTitle);
        }
        Ok(Self {
            id: TaskId::new(),
            name,
            status: TaskStatus::Open,
            created_at: Utc::now(),
        })
    }

    /// With status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }
}
