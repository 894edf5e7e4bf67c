//! Partition keys and derivation rules
//!
//! A partition is a named scope of data that is stored and synchronized
//! independently of other scopes. Keys come from exactly two places:
//! - explicit navigation context, used verbatim
//! - derivation from a principal's identifier (`user=<id>` or `project=<id>`)

use crate::error::ModelError;
use crate::principal::{Principal, PrincipalId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix of a principal's root partition
pub const USER_PREFIX: &str = "user=";

/// Prefix of a principal's default project partition
pub const PROJECT_PREFIX: &str = "project=";

/// Token identifying one logical partition of data
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Use a caller-supplied key verbatim
    #[inline]
    #[must_use]
    pub fn explicit(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Root partition of a principal: `user=<id>`
    #[inline]
    #[must_use]
    pub fn user_root(id: &PrincipalId) -> Self {
        Self(format!("{USER_PREFIX}{id}"))
    }

    /// Default project partition of a principal: `project=<id>`
    #[inline]
    #[must_use]
    pub fn default_project(id: &PrincipalId) -> Self {
        Self(format!("{PROJECT_PREFIX}{id}"))
    }

    /// Partition a view should open for `principal` given optional navigation context.
    ///
    /// The explicit key wins whenever context supplies one; otherwise the
    /// principal's root partition is used.
    #[must_use]
    pub fn effective(principal: &Principal, context: Option<&NavigationContext>) -> Self {
        match context {
            Some(ctx) => ctx.partition.clone(),
            None => Self::user_root(principal.id()),
        }
    }

    /// Borrow the raw key
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PartitionKey {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ModelError::EmptyPartition);
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Explicit navigation context handed to a view when it is opened for a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationContext {
    /// Partition to open
    pub partition: PartitionKey,
    /// Display label (project name), shown as the view title
    #[serde(default)]
    pub label: Option<String>,
}

impl NavigationContext {
    /// Context for a named project partition
    #[inline]
    #[must_use]
    pub fn new(partition: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            partition: PartitionKey::explicit(partition),
            label: Some(label.into()),
        }
    }

    /// Context carrying only a partition key
    #[inline]
    #[must_use]
    pub fn partition_only(partition: PartitionKey) -> Self {
        Self {
            partition,
            label: None,
        }
    }
}
