//! Session lifecycle controller
//!
//! A view owns one `SessionLifecycleController` and forwards its visibility
//! events to it. The controller decides between "require login" and
//! "open the store" at every start, and guarantees the store handle it opens
//! never outlives the segment that asked for it.
//!
//! # Workflow
//! 1. `on_start`: read the principal; redirect to login or spawn the open
//! 2. the open completes on a background task; if the segment is still alive
//!    the view receives `on_store_ready`, otherwise the connection is released
//! 3. `on_stop` / `on_destroy`: close the segment's handle

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::identity::IdentityProvider;
use crate::navigation::{NavigationSignal, Navigator};
use crate::segment::{Segment, SegmentId, SegmentState};
use crate::view::SessionView;
use std::sync::Arc;
use tasktracker_model::{NavigationContext, PartitionKey, Principal};
use tasktracker_store::{StoreHandle, StoreOpener};

/// Result of a start transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// No principal; the navigator was told to show login
    LoginRequired,
    /// Store open requested for `partition`
    Opening {
        /// New segment
        segment: SegmentId,
        /// Partition being opened
        partition: PartitionKey,
    },
}

/// Binds store handles to a view's visibility lifecycle
pub struct SessionLifecycleController {
    identity: Arc<dyn IdentityProvider>,
    opener: Arc<dyn StoreOpener>,
    navigator: Arc<dyn Navigator>,
    view: Arc<dyn SessionView>,
    show_title: bool,
    segment: Option<Arc<Segment>>,
    next_segment: u64,
}

impl std::fmt::Debug for SessionLifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLifecycleController")
            .field("segment", &self.segment)
            .field("next_segment", &self.next_segment)
            .finish_non_exhaustive()
    }
}

impl SessionLifecycleController {
    /// Create controller for `view`
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        opener: Arc<dyn StoreOpener>,
        navigator: Arc<dyn Navigator>,
        view: Arc<dyn SessionView>,
    ) -> Self {
        Self {
            identity,
            opener,
            navigator,
            view,
            show_title: true,
            segment: None,
            next_segment: 1,
        }
    }

    /// Apply session configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: &SessionConfig) -> Self {
        self.show_title = config.show_project_title;
        self
    }

    /// View became visible.
    ///
    /// Starts a fresh segment, tearing down the previous one first. Returns
    /// without waiting for the store; readiness arrives through
    /// `SessionView::on_store_ready`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_start(&mut self, context: Option<&NavigationContext>) -> StartOutcome {
        self.teardown("restart");

        let segment = Arc::new(Segment::new(SegmentId(self.next_segment)));
        self.next_segment += 1;
        self.segment = Some(Arc::clone(&segment));
        self.advance(&segment, SegmentState::AwaitingIdentity);

        if self.show_title {
            if let Some(label) = context.and_then(|c| c.label.as_deref()) {
                self.view.on_title(label);
            }
        }

        let Some(principal) = self.identity.current() else {
            self.advance(&segment, SegmentState::LoginRequired);
            tracing::info!(segment = %segment.id(), "no principal; login required");
            self.navigator.navigate(NavigationSignal::RequireLogin);
            return StartOutcome::LoginRequired;
        };

        let partition = PartitionKey::effective(&principal, context);
        let handle = Arc::new(StoreHandle::new(partition.clone()));
        segment.bind(principal.clone(), Arc::clone(&handle));
        self.advance(&segment, SegmentState::Opening);

        tracing::info!(
            segment = %segment.id(),
            principal = %principal.id,
            partition = %partition,
            handle = %handle.id(),
            "opening store"
        );

        let task = tokio::spawn(complete_open(
            Arc::clone(&segment),
            handle,
            Arc::clone(&self.opener),
            Arc::clone(&self.view),
        ));
        segment.track_open(task);

        self.view.on_authorized_start(&principal, &partition);

        StartOutcome::Opening {
            segment: segment.id(),
            partition,
        }
    }

    /// View is no longer visible. Closes the handle while a principal is present.
    ///
    /// Returns `true` if a store handle was closed.
    pub fn on_stop(&mut self) -> bool {
        if self.identity.current().is_none() {
            tracing::debug!("view stopped without principal; segment kept until destroy");
            return false;
        }
        self.teardown("stop")
    }

    /// View is gone. Closes unconditionally; repeated calls are no-ops.
    ///
    /// Returns `true` if a store handle was closed.
    pub fn on_destroy(&mut self) -> bool {
        self.teardown("destroy")
    }

    /// Sign the principal out.
    ///
    /// On success the current segment is torn down and the navigator receives
    /// `LoggedOut`. On failure nothing changes.
    ///
    /// # Errors
    /// - `SessionError::SignOutFailed` if the identity provider refused
    pub async fn sign_out(&mut self) -> Result<(), SessionError> {
        match self.identity.sign_out().await {
            Ok(()) => {
                tracing::info!("user logged out");
                self.teardown("sign-out");
                self.navigator.navigate(NavigationSignal::LoggedOut);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "log out failed");
                Err(SessionError::SignOutFailed(e))
            }
        }
    }

    /// State of the current segment (`Unbound` if none was started)
    #[must_use]
    pub fn state(&self) -> SegmentState {
        self.segment
            .as_ref()
            .map_or(SegmentState::Unbound, |s| s.state())
    }

    /// Current segment id
    #[must_use]
    pub fn segment_id(&self) -> Option<SegmentId> {
        self.segment.as_ref().map(|s| s.id())
    }

    /// Ready store handle of the current segment
    #[must_use]
    pub fn store(&self) -> Option<Arc<StoreHandle>> {
        self.segment.as_ref().and_then(|s| s.store())
    }

    /// Partition requested by the current segment
    #[must_use]
    pub fn partition(&self) -> Option<PartitionKey> {
        self.segment
            .as_ref()
            .and_then(|s| s.partition().cloned())
    }

    /// Principal bound to the current segment
    #[must_use]
    pub fn principal(&self) -> Option<Principal> {
        self.segment
            .as_ref()
            .and_then(|s| s.binding().map(|b| b.principal.clone()))
    }

    fn advance(&self, segment: &Segment, to: SegmentState) {
        // Transitions issued here follow the fixed start sequence on a fresh segment.
        if let Err(e) = segment.transition(to) {
            tracing::error!(segment = %segment.id(), error = %e, "segment bookkeeping out of order");
        }
    }

    fn teardown(&mut self, reason: &'static str) -> bool {
        let Some(segment) = self.segment.take() else {
            return false;
        };
        let closed = segment.close();
        tracing::info!(segment = %segment.id(), reason, closed_handle = closed, "segment torn down");
        closed
    }
}

impl Drop for SessionLifecycleController {
    fn drop(&mut self) {
        self.teardown("drop");
    }
}

/// Background completion of a store open.
///
/// Every outcome is checked against segment liveness first; results for a
/// torn-down segment are discarded without touching the view.
async fn complete_open(
    segment: Arc<Segment>,
    handle: Arc<StoreHandle>,
    opener: Arc<dyn StoreOpener>,
    view: Arc<dyn SessionView>,
) {
    let result = tokio::select! {
        biased;
        () = segment.cancelled() => {
            tracing::debug!(segment = %segment.id(), "open cancelled by teardown");
            return;
        }
        result = handle.connect(opener.as_ref()) => result,
    };

    match result {
        Ok(()) => {
            let delivered = segment.mark_ready(&handle, |store| {
                tracing::info!(segment = %segment.id(), partition = %store.partition(), "store ready");
                view.on_store_ready(store);
            });
            if !delivered {
                handle.close();
                tracing::debug!(segment = %segment.id(), "late store-ready discarded");
            }
        }
        Err(e) if e.is_closed() => {
            tracing::debug!(segment = %segment.id(), "open finished after teardown; discarded");
        }
        Err(e) => {
            let reported = segment.mark_failed(|| {
                tracing::warn!(segment = %segment.id(), error = %e, "store open failed");
                view.on_store_failed(&SessionError::StoreOpenFailed(e.clone()));
            });
            if !reported {
                tracing::debug!(segment = %segment.id(), error = %e, "late open failure discarded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MockIdentityProvider;
    use crate::navigation::ChannelNavigator;
    use parking_lot::Mutex;
    use tasktracker_store::{HandleState, MemoryStore};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct TestView {
        ready: Mutex<Vec<Arc<StoreHandle>>>,
        failed: Mutex<Vec<SessionError>>,
        titles: Mutex<Vec<String>>,
        changed: Notify,
    }

    impl SessionView for TestView {
        fn on_title(&self, label: &str) {
            self.titles.lock().push(label.to_string());
        }

        fn on_store_ready(&self, store: Arc<StoreHandle>) {
            self.ready.lock().push(store);
            self.changed.notify_waiters();
        }

        fn on_store_failed(&self, error: &SessionError) {
            self.failed.lock().push(error.clone());
            self.changed.notify_waiters();
        }
    }

    impl TestView {
        async fn wait_outcome(&self) {
            loop {
                let notified = self.changed.notified();
                let done = !self.ready.lock().is_empty() || !self.failed.lock().is_empty();
                if done {
                    return;
                }
                notified.await;
            }
        }
    }

    fn signed_in(id: &'static str) -> MockIdentityProvider {
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_current()
            .returning(move || Some(Principal::new(id)));
        identity
    }

    fn controller(
        identity: MockIdentityProvider,
        store: &MemoryStore,
        view: &Arc<TestView>,
    ) -> (
        SessionLifecycleController,
        tokio::sync::mpsc::UnboundedReceiver<NavigationSignal>,
    ) {
        let (navigator, rx) = ChannelNavigator::channel();
        let controller = SessionLifecycleController::new(
            Arc::new(identity),
            Arc::new(store.clone()),
            Arc::new(navigator),
            Arc::clone(view) as Arc<dyn SessionView>,
        );
        (controller, rx)
    }

    #[tokio::test]
    async fn missing_principal_requires_login() {
        let mut identity = MockIdentityProvider::new();
        identity.expect_current().returning(|| None);
        let store = MemoryStore::default();
        let view = Arc::new(TestView::default());
        let (mut controller, mut nav) = controller(identity, &store, &view);

        assert_eq!(controller.on_start(None), StartOutcome::LoginRequired);
        assert_eq!(controller.state(), SegmentState::LoginRequired);
        assert_eq!(nav.recv().await, Some(NavigationSignal::RequireLogin));
        assert_eq!(store.total_opens(), 0);
        assert!(controller.store().is_none());
    }

    #[tokio::test]
    async fn default_partition_derives_from_principal() {
        let store = MemoryStore::default();
        let view = Arc::new(TestView::default());
        let (mut controller, _nav) = controller(signed_in("u1"), &store, &view);

        let outcome = controller.on_start(None);
        assert!(matches!(
            outcome,
            StartOutcome::Opening { ref partition, .. } if partition.as_str() == "user=u1"
        ));

        view.wait_outcome().await;
        let handle = controller.store().unwrap();
        assert_eq!(handle.partition().as_str(), "user=u1");
        assert_eq!(controller.state(), SegmentState::Ready);
    }

    #[tokio::test]
    async fn explicit_context_sets_partition_and_title() {
        let store = MemoryStore::default();
        let view = Arc::new(TestView::default());
        let (mut controller, _nav) = controller(signed_in("u1"), &store, &view);

        let ctx = NavigationContext::new("project=abc", "Groceries");
        controller.on_start(Some(&ctx));
        view.wait_outcome().await;

        assert_eq!(
            view.ready.lock()[0].partition(),
            &PartitionKey::explicit("project=abc")
        );
        assert_eq!(view.titles.lock().as_slice(), ["Groceries".to_string()]);
    }

    #[tokio::test]
    async fn stop_with_principal_closes_handle() {
        let store = MemoryStore::default();
        let view = Arc::new(TestView::default());
        let (mut controller, _nav) = controller(signed_in("u1"), &store, &view);

        controller.on_start(None);
        view.wait_outcome().await;
        let handle = controller.store().unwrap();

        assert!(controller.on_stop());
        assert_eq!(handle.state(), HandleState::Closed);
        assert_eq!(store.open_connections(), 0);
        assert!(!controller.on_destroy());
    }

    #[tokio::test]
    async fn stop_without_principal_defers_to_destroy() {
        let mut identity = MockIdentityProvider::new();
        let mut calls = 0;
        identity.expect_current().returning(move || {
            calls += 1;
            (calls == 1).then(|| Principal::new("u1"))
        });
        let store = MemoryStore::default();
        let view = Arc::new(TestView::default());
        let (mut controller, _nav) = controller(identity, &store, &view);

        controller.on_start(None);
        view.wait_outcome().await;

        assert!(!controller.on_stop());
        assert_eq!(store.open_connections(), 1);
        assert!(controller.on_destroy());
        assert_eq!(store.open_connections(), 0);
    }

    #[tokio::test]
    async fn open_failure_is_reported_once() {
        let store = MemoryStore::default();
        store.fail_opens(&PartitionKey::explicit("user=u1"), "disk full");
        let view = Arc::new(TestView::default());
        let (mut controller, _nav) = controller(signed_in("u1"), &store, &view);

        controller.on_start(None);
        view.wait_outcome().await;

        assert_eq!(controller.state(), SegmentState::OpenFailed);
        assert!(controller.store().is_none());
        assert!(view.ready.lock().is_empty());
        let failures = view.failed.lock();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], SessionError::StoreOpenFailed(_)));
    }

    #[tokio::test]
    async fn restart_tears_down_previous_segment() {
        let store = MemoryStore::default();
        let view = Arc::new(TestView::default());
        let (mut controller, _nav) = controller(signed_in("u1"), &store, &view);

        controller.on_start(None);
        view.wait_outcome().await;
        let first = controller.store().unwrap();
        let first_segment = controller.segment_id();

        controller.on_start(None);
        assert_eq!(first.state(), HandleState::Closed);
        assert_ne!(controller.segment_id(), first_segment);
    }

    #[tokio::test]
    async fn failed_sign_out_leaves_session_untouched() {
        let mut identity = signed_in("u1");
        identity.expect_sign_out().returning(|| {
            Err(crate::error::IdentityError::Unavailable("timeout".into()))
        });
        let store = MemoryStore::default();
        let view = Arc::new(TestView::default());
        let (mut controller, mut nav) = controller(identity, &store, &view);

        controller.on_start(None);
        view.wait_outcome().await;

        let err = controller.sign_out().await.unwrap_err();
        assert!(matches!(err, SessionError::SignOutFailed(_)));
        assert_eq!(controller.state(), SegmentState::Ready);
        assert!(nav.try_recv().is_err());
    }

    #[tokio::test]
    async fn sign_out_tears_down_and_signals() {
        let mut identity = signed_in("u1");
        identity.expect_sign_out().returning(|| Ok(()));
        let store = MemoryStore::default();
        let view = Arc::new(TestView::default());
        let (mut controller, mut nav) = controller(identity, &store, &view);

        controller.on_start(None);
        view.wait_outcome().await;

        controller.sign_out().await.unwrap();
        assert_eq!(nav.recv().await, Some(NavigationSignal::LoggedOut));
        assert_eq!(controller.state(), SegmentState::Unbound);
        assert_eq!(store.open_connections(), 0);
    }
}
