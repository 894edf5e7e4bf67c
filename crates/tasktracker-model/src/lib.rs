//! Task Tracker Model
//!
//! Plain value types shared by the store and session layers:
//! - Principals and their identifiers
//! - Partition keys and their derivation rules
//! - Project references and membership records
//! - Tasks and task status
//!
//! Nothing in this crate performs I/O. Partition derivation in particular is
//! a pure function of its inputs.
//!
//! # Example
//!
//! ```rust
//! use tasktracker_model::{NavigationContext, PartitionKey, Principal};
//!
//! let principal = Principal::new("u1");
//! let root = PartitionKey::effective(&principal, None);
//! assert_eq!(root.as_str(), "user=u1");
//!
//! let ctx = NavigationContext::new("project=abc", "Groceries");
//! let explicit = PartitionKey::effective(&principal, Some(&ctx));
//! assert_eq!(explicit.as_str(), "project=abc");
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod membership;
pub mod partition;
pub mod principal;
pub mod task;

pub use error::ModelError;
pub use membership::{MembershipRecord, PlaceholderMembership, ProjectReference};
pub use partition::{NavigationContext, PartitionKey, PROJECT_PREFIX, USER_PREFIX};
pub use principal::{Principal, PrincipalId};
pub use task::{Task, TaskId, TaskStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
