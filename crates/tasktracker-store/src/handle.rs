//! Partition-scoped store handles
//!
//! A `StoreHandle` is created in `Opening` with its partition fixed for life.
//! The connection is delivered through a set-once slot; a connection that
//! arrives after the handle was closed is released immediately instead of
//! becoming visible.
//!
//! Every live query derived from a handle stops publishing when the handle closes.

use crate::connection::{PartitionConnection, StoreOpener, WriteOp};
use crate::error::StoreError;
use crate::live::LiveSequence;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use tasktracker_model::{MembershipRecord, PartitionKey, PrincipalId, Task};
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

/// Unique store handle identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(pub Ulid);

impl HandleId {
    /// Generate new handle ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifetime phase of a store handle.
///
/// Transitions: `Opening` → `Ready` → `Closed`, or `Opening` → `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandleState {
    /// Waiting for the backing collaborator
    Opening = 0,
    /// Connection available
    Ready = 1,
    /// Released; never reopens
    Closed = 2,
}

impl HandleState {
    fn from_u8(val: u8) -> Self {
        match val {
            0 => Self::Opening,
            1 => Self::Ready,
            _ => Self::Closed,
        }
    }
}

/// An opened, partition-scoped data connection with a bounded lifetime
pub struct StoreHandle {
    id: HandleId,
    partition: PartitionKey,
    state: AtomicU8,
    connection: OnceLock<Arc<dyn PartitionConnection>>,
    closed: CancellationToken,
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("id", &self.id)
            .field("partition", &self.partition)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl StoreHandle {
    /// Create a handle in `Opening` for `partition`
    #[must_use]
    pub fn new(partition: PartitionKey) -> Self {
        Self {
            id: HandleId::new(),
            partition,
            state: AtomicU8::new(HandleState::Opening as u8),
            connection: OnceLock::new(),
            closed: CancellationToken::new(),
        }
    }

    /// Open the partition through `opener` and move to `Ready`.
    ///
    /// Closing the handle while this is pending cancels the wait.
    ///
    /// # Errors
    /// - `StoreError::Closed` if the handle was closed before or during the open
    /// - `StoreError::OpenFailed` (or any collaborator error) if the open failed;
    ///   the handle is closed in that case
    pub async fn connect(&self, opener: &dyn StoreOpener) -> Result<(), StoreError> {
        if self.state() != HandleState::Opening {
            return Err(StoreError::Closed(self.partition.clone()));
        }

        let opened = tokio::select! {
            biased;
            () = self.closed.cancelled() => {
                return Err(StoreError::Closed(self.partition.clone()));
            }
            result = opener.open(&self.partition) => result,
        };

        let connection = match opened {
            Ok(connection) => connection,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };

        if self.closed.is_cancelled() || self.connection.set(Arc::clone(&connection)).is_err() {
            tracing::debug!(handle = %self.id, partition = %self.partition, "releasing connection that arrived after close");
            connection.close();
            return Err(StoreError::Closed(self.partition.clone()));
        }

        if self
            .state
            .compare_exchange(
                HandleState::Opening as u8,
                HandleState::Ready as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            connection.close();
            return Err(StoreError::Closed(self.partition.clone()));
        }

        tracing::debug!(handle = %self.id, partition = %self.partition, "store handle ready");
        Ok(())
    }

    /// Close the handle. Returns `true` on the first call only.
    pub fn close(&self) -> bool {
        let prev = HandleState::from_u8(self.state.swap(HandleState::Closed as u8, Ordering::AcqRel));
        self.closed.cancel();
        if let Some(connection) = self.connection.get() {
            connection.close();
        }
        if prev == HandleState::Closed {
            return false;
        }
        tracing::debug!(handle = %self.id, partition = %self.partition, from = ?prev, "store handle closed");
        true
    }

    /// Handle identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Partition this handle is scoped to
    #[inline]
    #[must_use]
    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    /// Current lifetime phase
    #[inline]
    #[must_use]
    pub fn state(&self) -> HandleState {
        HandleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the handle is `Ready`
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == HandleState::Ready
    }

    /// Completes once the handle is closed
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Token cancelled when the handle closes
    #[must_use]
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Membership records owned by `owner`, sorted by owner id
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - `StoreError::NotReady` / `StoreError::Closed` if the handle is not `Ready`
    pub fn memberships_for(
        &self,
        owner: &PrincipalId,
    ) -> Result<LiveSequence<MembershipRecord>, StoreError> {
        let source = self.connection()?.memberships();
        let owner = owner.clone();
        Ok(self.derive(source, move |records| {
            let mut matching: Vec<MembershipRecord> =
                records.iter().filter(|r| r.id == owner).cloned().collect();
            matching.sort_by(|a, b| a.id.cmp(&b.id));
            matching
        }))
    }

    /// Tasks in the partition, sorted by task id so re-renders keep their order
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - `StoreError::NotReady` / `StoreError::Closed` if the handle is not `Ready`
    pub fn tasks(&self) -> Result<LiveSequence<Task>, StoreError> {
        let source = self.connection()?.tasks();
        Ok(self.derive(source, |tasks| {
            let mut sorted = tasks.to_vec();
            sorted.sort_by_key(|t| t.id);
            sorted
        }))
    }

    /// Apply a write to the partition
    ///
    /// # Errors
    /// - `StoreError::NotReady` / `StoreError::Closed` if the handle is not `Ready`
    /// - any error reported by the backing collaborator
    pub async fn write(&self, op: WriteOp) -> Result<(), StoreError> {
        let connection = Arc::clone(self.connection()?);
        connection.write(op).await
    }

    fn connection(&self) -> Result<&Arc<dyn PartitionConnection>, StoreError> {
        match self.state() {
            HandleState::Opening => Err(StoreError::NotReady(self.partition.clone())),
            HandleState::Closed => Err(StoreError::Closed(self.partition.clone())),
            HandleState::Ready => self
                .connection
                .get()
                .ok_or_else(|| StoreError::NotReady(self.partition.clone())),
        }
    }

    /// Project a raw live collection through `view`, stopping when the handle closes
    /// or every reader is gone. Spawns onto the current tokio runtime.
    fn derive<T, U, F>(&self, mut source: LiveSequence<T>, view: F) -> LiveSequence<U>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        U: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&[T]) -> Vec<U> + Send + 'static,
    {
        let (publisher, derived) = LiveSequence::channel(view(&source.snapshot()));
        let closed = self.closed.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = closed.cancelled() => break,
                    () = publisher.closed() => break,
                    next = source.changed() => match next {
                        Some(items) => {
                            publisher.publish(view(&items));
                        }
                        None => break,
                    },
                }
            }
        });

        derived
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use pretty_assertions::assert_eq;
    use tasktracker_model::ProjectReference;

    #[tokio::test]
    async fn connect_moves_to_ready() {
        let store = MemoryStore::default();
        let handle = StoreHandle::new(PartitionKey::explicit("user=u1"));
        assert_eq!(handle.state(), HandleState::Opening);

        handle.connect(&store).await.unwrap();
        assert!(handle.is_ready());
        assert_eq!(store.open_connections(), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let store = MemoryStore::default();
        let handle = StoreHandle::new(PartitionKey::explicit("user=u1"));
        handle.connect(&store).await.unwrap();

        assert!(handle.close());
        assert!(!handle.close());
        assert_eq!(handle.state(), HandleState::Closed);
        assert_eq!(store.open_connections(), 0);
    }

    #[tokio::test]
    async fn closed_handle_rejects_queries() {
        let store = MemoryStore::default();
        let handle = StoreHandle::new(PartitionKey::explicit("user=u1"));
        assert!(matches!(handle.tasks(), Err(StoreError::NotReady(_))));

        handle.connect(&store).await.unwrap();
        handle.close();
        assert!(matches!(handle.tasks(), Err(StoreError::Closed(_))));
        assert!(handle.connect(&store).await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn close_during_open_releases_late_connection() {
        let store = MemoryStore::default();
        store.pause_opens();

        let handle = Arc::new(StoreHandle::new(PartitionKey::explicit("user=u1")));
        let pending = {
            let handle = Arc::clone(&handle);
            let store = store.clone();
            tokio::spawn(async move { handle.connect(&store).await })
        };

        tokio::task::yield_now().await;
        handle.close();
        store.resume_opens();

        let result = pending.await.unwrap();
        assert!(result.unwrap_err().is_closed());
        assert_eq!(handle.state(), HandleState::Closed);
        assert_eq!(store.open_connections(), 0);
    }

    #[tokio::test]
    async fn membership_query_filters_by_owner() {
        let store = MemoryStore::default();
        let partition = PartitionKey::explicit("user=u1");
        let project = ProjectReference::new("A", PartitionKey::explicit("project=a"));
        store.provision_membership(
            &partition,
            MembershipRecord::new(PrincipalId::new("u2")).with_projects(vec![project.clone()]),
        );

        let handle = StoreHandle::new(partition.clone());
        handle.connect(&store).await.unwrap();
        let mut records = handle.memberships_for(&PrincipalId::new("u1")).unwrap();
        assert!(records.is_empty());

        store.provision_membership(
            &partition,
            MembershipRecord::new(PrincipalId::new("u1")).with_projects(vec![project]),
        );
        let seen = records.wait_until(|r| !r.is_empty()).await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, PrincipalId::new("u1"));
    }

    #[tokio::test]
    async fn derived_sequences_close_with_handle() {
        let store = MemoryStore::default();
        let handle = StoreHandle::new(PartitionKey::explicit("project=p"));
        handle.connect(&store).await.unwrap();

        let mut tasks = handle.tasks().unwrap();
        handle.close();
        assert_eq!(tasks.changed().await, None);
    }
}
