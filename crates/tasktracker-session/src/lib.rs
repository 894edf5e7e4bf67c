//! Task Tracker Session
//!
//! Binds partition-scoped store handles to the visibility lifecycle of an
//! authenticated view, and resolves a principal's project memberships while
//! the authoritative record may still be on its way.
//!
//! - `SessionLifecycleController`: one per view; opens a handle per visible
//!   segment and closes it on stop/destroy
//! - `CollectionResolver`: live project list, placeholder until the
//!   membership record exists
//! - `TaskBoard`: live tasks of a project partition plus task writes
//! - `bind_list`: drives a `ListSink` from a live sequence
//!
//! # Example
//!
//! ```rust,ignore
//! use tasktracker_session::prelude::*;
//!
//! let mut controller = SessionLifecycleController::new(identity, store, navigator, view);
//! match controller.on_start(None) {
//!     StartOutcome::LoginRequired => { /* navigator got RequireLogin */ }
//!     StartOutcome::Opening { partition, .. } => println!("opening {partition}"),
//! }
//! // ... view.on_store_ready(handle) fires once the partition is open
//! controller.on_stop();
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod navigation;
pub mod resolver;
pub mod segment;
pub mod sink;
pub mod tasks;
pub mod view;

pub use config::{ConfigError, SessionConfig};
pub use error::{ErrorKind, IdentityError, SessionError, TransitionError};
pub use identity::{IdentityProvider, LocalIdentityProvider};
pub use lifecycle::{SessionLifecycleController, StartOutcome};
pub use navigation::{ChannelNavigator, NavigationSignal, Navigator};
pub use resolver::{CollectionResolver, PlaceholderScope};
pub use segment::{SegmentId, SegmentState};
pub use sink::{bind_list, ListSink};
pub use tasks::TaskBoard;
pub use view::SessionView;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wiring a view to a session
    pub use crate::{
        bind_list, CollectionResolver, IdentityProvider, ListSink, NavigationSignal, Navigator,
        SessionConfig, SessionError, SessionLifecycleController, SessionView, StartOutcome,
        TaskBoard,
    };
    pub use tasktracker_model::{NavigationContext, PartitionKey, Principal, ProjectReference};
    pub use tasktracker_store::{LiveSequence, StoreHandle, StoreOpener};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
