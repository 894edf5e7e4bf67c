//! Project memberships
//!
//! The authoritative `MembershipRecord` is provisioned by a server-side trigger
//! after first sign-up and may lag behind authentication. Until it shows up the
//! session layer works from a `PlaceholderMembership`, which is never persisted
//! and never synchronized.

use crate::partition::PartitionKey;
use crate::principal::PrincipalId;
use serde::{Deserialize, Serialize};

/// Display name plus the partition holding that project's tasks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectReference {
    /// Project name shown to the user
    pub name: String,
    /// Task partition of the project
    pub partition: PartitionKey,
}

impl ProjectReference {
    /// Create new project reference
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, partition: PartitionKey) -> Self {
        Self {
            name: name.into(),
            partition,
        }
    }
}

/// Authoritative record of one principal's project memberships
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    /// Owner of the record, also its sort key
    pub id: PrincipalId,
    /// Projects the principal belongs to, in stored order
    #[serde(default)]
    pub member_of: Vec<ProjectReference>,
}

impl MembershipRecord {
    /// Create an empty record for `id`
    #[inline]
    #[must_use]
    pub fn new(id: PrincipalId) -> Self {
        Self {
            id,
            member_of: Vec::new(),
        }
    }

    /// With projects
    #[inline]
    #[must_use]
    pub fn with_projects(mut self, projects: Vec<ProjectReference>) -> Self {
        self.member_of = projects;
        self
    }

    /// Projects in stored order
    #[inline]
    #[must_use]
    pub fn projects(&self) -> &[ProjectReference] {
        &self.member_of
    }
}

/// Local stand-in for a `MembershipRecord` that does not exist yet.
///
/// Deliberately a distinct type: it cannot be written to a store or confused
/// with an authoritative record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMembership {
    owner: PrincipalId,
    project: ProjectReference,
}

impl PlaceholderMembership {
    /// Placeholder holding the owner's default project under `label`
    #[must_use]
    pub fn for_principal(owner: &PrincipalId, label: impl Into<String>) -> Self {
        Self {
            owner: owner.clone(),
            project: ProjectReference::new(label, PartitionKey::default_project(owner)),
        }
    }

    /// Principal this placeholder stands in for
    #[inline]
    #[must_use]
    pub fn owner(&self) -> &PrincipalId {
        &self.owner
    }

    /// The single default project
    #[inline]
    #[must_use]
    pub fn project(&self) -> &ProjectReference {
        &self.project
    }

    /// One-element project collection
    #[inline]
    #[must_use]
    pub fn projects(&self) -> Vec<ProjectReference> {
        vec![self.project.clone()]
    }
}
