//! Testing utilities for the task tracker workspace
//!
//! Recording fakes for the view, navigator and list sink seams, plus fixtures.

#![allow(missing_docs)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tasktracker_model::{
    MembershipRecord, NavigationContext, PartitionKey, Principal, PrincipalId, ProjectReference,
};
use tasktracker_session::{ListSink, NavigationSignal, Navigator, SessionError, SessionView};
use tasktracker_store::{MemoryStore, MemoryStoreConfig, StoreHandle};
use tokio::sync::Notify;

/// Upper bound for every `wait_*` helper
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum ViewEvent {
    Title(String),
    AuthorizedStart {
        principal: Principal,
        partition: PartitionKey,
    },
    StoreReady(Arc<StoreHandle>),
    StoreFailed(SessionError),
}

/// `SessionView` that records every callback in order
#[derive(Debug, Default)]
pub struct RecordingView {
    events: Mutex<Vec<ViewEvent>>,
    notify: Notify,
}

impl RecordingView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().clone()
    }

    pub fn ready_handles(&self) -> Vec<Arc<StoreHandle>> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ViewEvent::StoreReady(handle) => Some(Arc::clone(handle)),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<SessionError> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ViewEvent::StoreFailed(err) => Some(err.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn titles(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Title(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    /// First recorded event matching `pred`, waiting up to `WAIT_TIMEOUT`
    pub async fn wait_for<F>(&self, mut pred: F) -> Option<ViewEvent>
    where
        F: FnMut(&ViewEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            let notified = self.notify.notified();
            let found = self.events.lock().iter().find(|e| pred(e)).cloned();
            if found.is_some() {
                return found;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    pub async fn wait_ready(&self) -> Option<Arc<StoreHandle>> {
        match self.wait_for(|e| matches!(e, ViewEvent::StoreReady(_))).await? {
            ViewEvent::StoreReady(handle) => Some(handle),
            _ => None,
        }
    }

    pub async fn wait_failed(&self) -> Option<SessionError> {
        match self.wait_for(|e| matches!(e, ViewEvent::StoreFailed(_))).await? {
            ViewEvent::StoreFailed(err) => Some(err),
            _ => None,
        }
    }

    fn record(&self, event: ViewEvent) {
        self.events.lock().push(event);
        self.notify.notify_waiters();
    }
}

impl SessionView for RecordingView {
    fn on_title(&self, label: &str) {
        self.record(ViewEvent::Title(label.to_string()));
    }

    fn on_authorized_start(&self, principal: &Principal, partition: &PartitionKey) {
        self.record(ViewEvent::AuthorizedStart {
            principal: principal.clone(),
            partition: partition.clone(),
        });
    }

    fn on_store_ready(&self, store: Arc<StoreHandle>) {
        self.record(ViewEvent::StoreReady(store));
    }

    fn on_store_failed(&self, error: &SessionError) {
        self.record(ViewEvent::StoreFailed(error.clone()));
    }
}

/// `Navigator` that keeps every signal
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    signals: Mutex<Vec<NavigationSignal>>,
}

impl RecordingNavigator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn signals(&self) -> Vec<NavigationSignal> {
        self.signals.lock().clone()
    }

    pub fn last(&self) -> Option<NavigationSignal> {
        self.signals.lock().last().copied()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, signal: NavigationSignal) {
        self.signals.lock().push(signal);
    }
}

/// `ListSink` that keeps every rendered snapshot
#[derive(Debug)]
pub struct RecordingSink<T> {
    renders: Mutex<Vec<Vec<T>>>,
    closed: AtomicBool,
    notify: Notify,
}

impl<T> Default for RecordingSink<T> {
    fn default() -> Self {
        Self {
            renders: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }
}

impl<T: Clone> RecordingSink<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn renders(&self) -> Vec<Vec<T>> {
        self.renders.lock().clone()
    }

    pub fn latest(&self) -> Option<Vec<T>> {
        self.renders.lock().last().cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Latest render matching `pred`, waiting up to `WAIT_TIMEOUT`
    pub async fn wait_for<F>(&self, mut pred: F) -> Option<Vec<T>>
    where
        F: FnMut(&[T]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            let notified = self.notify.notified();
            let found = self.renders.lock().last().filter(|r| pred(r)).cloned();
            if found.is_some() {
                return found;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }
}

impl<T: Clone + Send + Sync> ListSink<T> for RecordingSink<T> {
    fn render(&self, items: &[T]) {
        self.renders.lock().push(items.to_vec());
        self.notify.notify_waiters();
    }

    fn closed(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

pub fn principal(id: &str) -> Principal {
    Principal::new(id)
}

pub fn project(name: &str, partition: &str) -> ProjectReference {
    ProjectReference::new(name, PartitionKey::explicit(partition))
}

pub fn project_context(partition: &str, label: &str) -> NavigationContext {
    NavigationContext::new(partition, label)
}

pub fn membership(owner: &str, projects: Vec<ProjectReference>) -> MembershipRecord {
    MembershipRecord::new(PrincipalId::new(owner)).with_projects(projects)
}

pub fn memory_store() -> MemoryStore {
    MemoryStore::default()
}

pub fn slow_store(open_latency: Duration) -> MemoryStore {
    MemoryStore::new(MemoryStoreConfig::new().with_open_latency(open_latency))
}

/// Handle on `partition` that has finished opening against `store`
///
/// # Panics
/// If the store refuses the open.
pub async fn ready_handle(store: &MemoryStore, partition: &str) -> Arc<StoreHandle> {
    let handle = Arc::new(StoreHandle::new(PartitionKey::explicit(partition)));
    handle
        .connect(store)
        .await
        .unwrap_or_else(|e| panic!("open of {partition} failed: {e}"));
    handle
}
