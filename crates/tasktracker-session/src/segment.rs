//! View-lifecycle segments
//!
//! A segment spans one "became visible" → "stopped/destroyed" stretch of a
//! view. It owns at most one store handle. The handle only becomes visible
//! to the view through the set-once `ready` slot, which completion handlers
//! fill under the segment lock after checking the segment is still alive.
//!
//! ```text
//! Unbound → AwaitingIdentity → LoginRequired
//!                            ↘ Opening → Ready → Closed
//!                                      ↘ OpenFailed
//!                                      ↘ Closed
//! ```

use crate::error::TransitionError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tasktracker_model::{PartitionKey, Principal};
use tasktracker_store::StoreHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Sequential segment identifier, unique per controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg-{}", self.0)
    }
}

/// Segment lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentState {
    /// Created, nothing checked yet
    Unbound,
    /// Reading the identity provider
    AwaitingIdentity,
    /// No principal; terminal for this segment
    LoginRequired,
    /// Store open requested
    Opening,
    /// Store handle delivered to the view
    Ready,
    /// Collaborator failed the open; terminal
    OpenFailed,
    /// Torn down by stop/destroy; terminal
    Closed,
}

impl SegmentState {
    /// Whether no further transition is possible
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: SegmentState) -> Vec<SegmentState> {
    use SegmentState::*;
    match from {
        Unbound => vec![AwaitingIdentity],
        AwaitingIdentity => vec![LoginRequired, Opening],
        Opening => vec![Ready, OpenFailed, Closed],
        Ready => vec![Closed],
        LoginRequired | OpenFailed | Closed => vec![],
    }
}

/// Validates a segment state transition.
///
/// # Errors
/// - `TransitionError` if `to` is not reachable from `from`
pub fn validate_transition(from: SegmentState, to: SegmentState) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Principal and handle bound to a segment once identity is known
#[derive(Debug)]
pub(crate) struct Binding {
    pub(crate) principal: Principal,
    pub(crate) handle: Arc<StoreHandle>,
}

/// One view-lifecycle segment
#[derive(Debug)]
pub(crate) struct Segment {
    id: SegmentId,
    state: Mutex<SegmentState>,
    binding: OnceLock<Binding>,
    ready: OnceLock<Arc<StoreHandle>>,
    cancel: CancellationToken,
    open_task: Mutex<Option<JoinHandle<()>>>,
}

impl Segment {
    pub(crate) fn new(id: SegmentId) -> Self {
        Self {
            id,
            state: Mutex::new(SegmentState::Unbound),
            binding: OnceLock::new(),
            ready: OnceLock::new(),
            cancel: CancellationToken::new(),
            open_task: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> SegmentId {
        self.id
    }

    pub(crate) fn state(&self) -> SegmentState {
        *self.state.lock()
    }

    pub(crate) fn transition(&self, to: SegmentState) -> Result<SegmentState, TransitionError> {
        let mut state = self.state.lock();
        validate_transition(*state, to)?;
        let from = std::mem::replace(&mut *state, to);
        tracing::debug!(segment = %self.id, ?from, ?to, "segment transition");
        Ok(from)
    }

    pub(crate) fn bind(&self, principal: Principal, handle: Arc<StoreHandle>) {
        // Bound once, right after identity is read; a second bind is a no-op.
        let _ = self.binding.set(Binding { principal, handle });
    }

    pub(crate) fn binding(&self) -> Option<&Binding> {
        self.binding.get()
    }

    pub(crate) fn partition(&self) -> Option<&PartitionKey> {
        self.binding.get().map(|b| b.handle.partition())
    }

    pub(crate) fn store(&self) -> Option<Arc<StoreHandle>> {
        self.ready.get().cloned()
    }

    pub(crate) fn track_open(&self, task: JoinHandle<()>) {
        *self.open_task.lock() = Some(task);
    }

    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Publish `handle` as the segment's Ready store and hand it to `deliver`.
    /// Returns `false`, without calling `deliver`, if the segment left
    /// `Opening` or the handle is no longer ready.
    ///
    /// `deliver` runs under the segment lock, so a concurrent [`Segment::close`]
    /// waits for it and the delivered handle is still ready while it runs. It
    /// must not call back into the segment.
    pub(crate) fn mark_ready<F>(&self, handle: &Arc<StoreHandle>, deliver: F) -> bool
    where
        F: FnOnce(Arc<StoreHandle>),
    {
        let mut state = self.state.lock();
        if *state != SegmentState::Opening || self.cancel.is_cancelled() || !handle.is_ready() {
            return false;
        }
        if self.ready.set(Arc::clone(handle)).is_err() {
            return false;
        }
        *state = SegmentState::Ready;
        tracing::debug!(segment = %self.id, "segment ready");
        deliver(Arc::clone(handle));
        true
    }

    /// Record an open failure and report it through `deliver`, under the
    /// segment lock. Returns `false` if the segment is no longer opening.
    pub(crate) fn mark_failed<F: FnOnce()>(&self, deliver: F) -> bool {
        let mut state = self.state.lock();
        if *state != SegmentState::Opening || self.cancel.is_cancelled() {
            return false;
        }
        *state = SegmentState::OpenFailed;
        deliver();
        true
    }

    /// Tear the segment down. Returns `true` if a store handle was closed.
    ///
    /// Safe to call any number of times; terminal segments are left as they are.
    pub(crate) fn close(&self) -> bool {
        let was_live = {
            let mut state = self.state.lock();
            if matches!(*state, SegmentState::Opening | SegmentState::Ready) {
                *state = SegmentState::Closed;
                true
            } else {
                false
            }
        };

        self.cancel.cancel();
        if let Some(task) = self.open_task.lock().take() {
            task.abort();
        }

        let closed_handle = self
            .binding
            .get()
            .is_some_and(|binding| binding.handle.close());

        if was_live {
            tracing::debug!(segment = %self.id, closed_handle, "segment closed");
        }
        closed_handle
    }
}
