//! Task Tracker Store
//!
//! Partition-scoped data access for the session layer:
//! - `StoreOpener` / `PartitionConnection`: the seam to the backing store and sync engine
//! - `StoreHandle`: one opened partition with an Opening → Ready → Closed lifetime
//! - `LiveSequence`: ordered collections that re-emit as the data changes
//! - `MemoryStore`: an in-memory backend used by tests and the demo binary
//!
//! # Architecture
//!
//! ```text
//! StoreOpener ──open──▶ PartitionConnection ──set once──▶ StoreHandle
//!                              │                              │
//!                        raw live data ──filter/sort──▶ LiveSequence<T>
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod connection;
pub mod error;
pub mod handle;
pub mod live;
pub mod memory;

pub use config::MemoryStoreConfig;
pub use connection::{PartitionConnection, StoreOpener, WriteOp};
pub use error::StoreError;
pub use handle::{HandleId, HandleState, StoreHandle};
pub use live::{LivePublisher, LiveSequence};
pub use memory::MemoryStore;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with partition stores
    pub use crate::{
        HandleState, LiveSequence, MemoryStore, PartitionConnection, StoreError, StoreHandle,
        StoreOpener, WriteOp,
    };
}
