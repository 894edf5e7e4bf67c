//! Callbacks from the session lifecycle into the hosting view

use crate::error::SessionError;
use std::sync::Arc;
use tasktracker_model::{PartitionKey, Principal};
use tasktracker_store::StoreHandle;

/// Capabilities a view exposes to its `SessionLifecycleController`.
///
/// Callbacks for a segment arrive only while that segment is alive. Only
/// `on_store_ready` is required.
pub trait SessionView: Send + Sync {
    /// Navigation context carried a display label
    fn on_title(&self, _label: &str) {}

    /// A principal is present and the store open has been requested
    fn on_authorized_start(&self, _principal: &Principal, _partition: &PartitionKey) {}

    /// The segment's store handle is `Ready`.
    ///
    /// Runs while the segment is held open; the handle cannot close before
    /// this returns. Do not call back into the controller from here.
    fn on_store_ready(&self, store: Arc<StoreHandle>);

    /// The store could not be opened; no retry follows
    fn on_store_failed(&self, _error: &SessionError) {}
}
