//! In-memory store backend
//!
//! Stands in for the real store/sync collaborator. Partitions are created on
//! first use and live as long as the `MemoryStore`; connections are cheap
//! views onto them. Test hooks:
//! - `pause_opens` / `resume_opens` hold every pending open at a gate
//! - `fail_opens` / `fail_writes` inject collaborator errors per partition
//! - `provision_membership` plays the server-side trigger that creates
//!   membership records some time after sign-up

use crate::config::MemoryStoreConfig;
use crate::connection::{PartitionConnection, StoreOpener, WriteOp};
use crate::error::StoreError;
use crate::live::{LivePublisher, LiveSequence};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tasktracker_model::{MembershipRecord, PartitionKey, PrincipalId, Task};
use tokio::sync::watch;

/// Data held for one partition
#[derive(Debug)]
struct PartitionData {
    memberships: LivePublisher<MembershipRecord>,
    tasks: LivePublisher<Task>,
}

impl PartitionData {
    fn new() -> Self {
        let (memberships, _) = LiveSequence::channel(Vec::new());
        let (tasks, _) = LiveSequence::channel(Vec::new());
        Self { memberships, tasks }
    }
}

#[derive(Debug)]
struct Inner {
    config: MemoryStoreConfig,
    partitions: DashMap<PartitionKey, Arc<PartitionData>>,
    open_failures: DashMap<PartitionKey, String>,
    write_failures: DashMap<PartitionKey, String>,
    open_connections: AtomicUsize,
    total_opens: AtomicUsize,
    gate: watch::Sender<bool>,
}

/// In-memory partitioned store
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create store with configuration
    #[must_use]
    pub fn new(config: MemoryStoreConfig) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                config,
                partitions: DashMap::new(),
                open_failures: DashMap::new(),
                write_failures: DashMap::new(),
                open_connections: AtomicUsize::new(0),
                total_opens: AtomicUsize::new(0),
                gate,
            }),
        }
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MemoryStoreConfig {
        &self.inner.config
    }

    /// Hold every open at the gate until `resume_opens`
    pub fn pause_opens(&self) {
        self.inner.gate.send_replace(false);
    }

    /// Release held opens
    pub fn resume_opens(&self) {
        self.inner.gate.send_replace(true);
    }

    /// Make every open of `partition` fail with `reason`
    pub fn fail_opens(&self, partition: &PartitionKey, reason: impl Into<String>) {
        self.inner
            .open_failures
            .insert(partition.clone(), reason.into());
    }

    /// Stop failing opens of `partition`
    pub fn clear_open_failure(&self, partition: &PartitionKey) {
        self.inner.open_failures.remove(partition);
    }

    /// Make every write to `partition` fail with `reason`
    pub fn fail_writes(&self, partition: &PartitionKey, reason: impl Into<String>) {
        self.inner
            .write_failures
            .insert(partition.clone(), reason.into());
    }

    /// Stop failing writes to `partition`
    pub fn clear_write_failure(&self, partition: &PartitionKey) {
        self.inner.write_failures.remove(partition);
    }

    /// Create or replace the membership record for `record.id` in `partition`.
    ///
    /// This is the server-side provisioning path; clients never write memberships.
    pub fn provision_membership(&self, partition: &PartitionKey, record: MembershipRecord) {
        let data = self.partition_data(partition);
        data.memberships.modify(|records| {
            match records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) if *existing == record => return false,
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
            records.sort_by(|a, b| a.id.cmp(&b.id));
            true
        });
        tracing::debug!(partition = %partition, principal = %record.id, "membership provisioned");
    }

    /// Remove the membership record of `owner` from `partition`
    pub fn remove_membership(&self, partition: &PartitionKey, owner: &PrincipalId) -> bool {
        let data = self.partition_data(partition);
        data.memberships.modify(|records| {
            let before = records.len();
            records.retain(|r| &r.id != owner);
            records.len() != before
        })
    }

    /// Current membership records of `partition`
    #[must_use]
    pub fn memberships(&self, partition: &PartitionKey) -> Vec<MembershipRecord> {
        self.partition_data(partition).memberships.current()
    }

    /// Current tasks of `partition`
    #[must_use]
    pub fn tasks(&self, partition: &PartitionKey) -> Vec<Task> {
        self.partition_data(partition).tasks.current()
    }

    /// Connections opened and not yet closed
    #[inline]
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.inner.open_connections.load(Ordering::Acquire)
    }

    /// Opens requested since creation, including failed and cancelled ones
    #[inline]
    #[must_use]
    pub fn total_opens(&self) -> usize {
        self.inner.total_opens.load(Ordering::Acquire)
    }

    fn partition_data(&self, partition: &PartitionKey) -> Arc<PartitionData> {
        let entry = self
            .inner
            .partitions
            .entry(partition.clone())
            .or_insert_with(|| Arc::new(PartitionData::new()));
        Arc::clone(entry.value())
    }

    async fn wait_for_gate(&self) {
        let mut gate = self.inner.gate.subscribe();
        // The sender lives in `inner`, which outlives this call.
        let _ = gate.wait_for(|open| *open).await;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

#[async_trait]
impl StoreOpener for MemoryStore {
    async fn open(
        &self,
        partition: &PartitionKey,
    ) -> Result<Arc<dyn PartitionConnection>, StoreError> {
        self.inner.total_opens.fetch_add(1, Ordering::AcqRel);
        self.wait_for_gate().await;

        let latency = self.inner.config.open_latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(reason) = self.inner.open_failures.get(partition) {
            tracing::warn!(partition = %partition, reason = %reason.value(), "open rejected");
            return Err(StoreError::open_failed(partition, reason.value().clone()));
        }

        let data = self.partition_data(partition);
        self.inner.open_connections.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(partition = %partition, "partition opened");

        Ok(Arc::new(MemoryConnection {
            partition: partition.clone(),
            data,
            store: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
struct MemoryConnection {
    partition: PartitionKey,
    data: Arc<PartitionData>,
    store: Arc<Inner>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn apply(&self, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::InsertTask(task) => {
                self.data.tasks.modify(|tasks| {
                    tasks.retain(|t| t.id != task.id);
                    tasks.push(task);
                    tasks.sort_by_key(|t| t.id);
                    true
                });
                Ok(())
            }
            WriteOp::SetTaskStatus { id, status } => {
                let mut found = false;
                self.data.tasks.modify(|tasks| {
                    let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
                        return false;
                    };
                    found = true;
                    if task.status == status {
                        return false;
                    }
                    task.status = status;
                    true
                });
                if found {
                    Ok(())
                } else {
                    Err(StoreError::TaskNotFound(id))
                }
            }
            WriteOp::DeleteTask(id) => {
                let removed = self.data.tasks.modify(|tasks| {
                    let before = tasks.len();
                    tasks.retain(|t| t.id != id);
                    tasks.len() != before
                });
                if removed {
                    Ok(())
                } else {
                    Err(StoreError::TaskNotFound(id))
                }
            }
        }
    }
}

#[async_trait]
impl PartitionConnection for MemoryConnection {
    fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    fn memberships(&self) -> LiveSequence<MembershipRecord> {
        self.data.memberships.subscribe()
    }

    fn tasks(&self) -> LiveSequence<Task> {
        self.data.tasks.subscribe()
    }

    async fn write(&self, op: WriteOp) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed(self.partition.clone()));
        }

        let latency = self.store.config.write_latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(reason) = self.store.write_failures.get(&self.partition) {
            return Err(StoreError::write_failed(&self.partition, reason.value().clone()));
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed(self.partition.clone()));
        }

        self.apply(op)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.store.open_connections.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!(partition = %self.partition, "partition connection closed");
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tasktracker_model::{TaskId, TaskStatus};

    fn key(raw: &str) -> PartitionKey {
        PartitionKey::explicit(raw)
    }

    #[tokio::test]
    async fn open_counts_connections() {
        let store = MemoryStore::default();
        let first = store.open(&key("project=a")).await.unwrap();
        let second = store.open(&key("project=a")).await.unwrap();
        assert_eq!(store.open_connections(), 2);

        first.close();
        first.close();
        assert_eq!(store.open_connections(), 1);

        drop(second);
        assert_eq!(store.open_connections(), 0);
        assert_eq!(store.total_opens(), 2);
    }

    #[tokio::test]
    async fn injected_open_failure_is_reported() {
        let store = MemoryStore::default();
        store.fail_opens(&key("user=u1"), "quota exceeded");

        let err = store.open(&key("user=u1")).await.unwrap_err();
        assert_eq!(err, StoreError::open_failed(&key("user=u1"), "quota exceeded"));
        assert_eq!(store.open_connections(), 0);

        store.clear_open_failure(&key("user=u1"));
        assert!(store.open(&key("user=u1")).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn open_latency_is_simulated() {
        let store = MemoryStore::new(
            MemoryStoreConfig::new().with_open_latency(Duration::from_secs(5)),
        );
        let started = tokio::time::Instant::now();
        store.open(&key("user=u1")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn task_writes_keep_id_order() {
        let store = MemoryStore::default();
        let conn = store.open(&key("project=a")).await.unwrap();

        let first = Task::new("first").unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let second = Task::new("second").unwrap();

        conn.write(WriteOp::InsertTask(second.clone())).await.unwrap();
        conn.write(WriteOp::InsertTask(first.clone())).await.unwrap();
        let names: Vec<_> = store
            .tasks(&key("project=a"))
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["first".to_string(), "second".to_string()]);

        conn.write(WriteOp::SetTaskStatus {
            id: first.id,
            status: TaskStatus::Complete,
        })
        .await
        .unwrap();
        assert_eq!(store.tasks(&key("project=a"))[0].status, TaskStatus::Complete);

        conn.write(WriteOp::DeleteTask(second.id)).await.unwrap();
        assert_eq!(store.tasks(&key("project=a")).len(), 1);
    }

    #[tokio::test]
    async fn writes_to_missing_tasks_fail() {
        let store = MemoryStore::default();
        let conn = store.open(&key("project=a")).await.unwrap();
        let id = TaskId::new();
        assert_eq!(
            conn.write(WriteOp::DeleteTask(id)).await,
            Err(StoreError::TaskNotFound(id))
        );
    }

    #[tokio::test]
    async fn closed_connection_rejects_writes() {
        let store = MemoryStore::default();
        let conn = store.open(&key("project=a")).await.unwrap();
        conn.close();
        let err = conn
            .write(WriteOp::InsertTask(Task::new("late").unwrap()))
            .await
            .unwrap_err();
        assert!(err.is_closed());
    }

    #[test]
    fn provisioning_replaces_existing_record() {
        let store = MemoryStore::default();
        let partition = key("user=u1");
        let owner = PrincipalId::new("u1");

        store.provision_membership(&partition, MembershipRecord::new(owner.clone()));
        store.provision_membership(
            &partition,
            MembershipRecord::new(owner.clone()).with_projects(vec![
                tasktracker_model::ProjectReference::new("A", key("project=a")),
            ]),
        );

        let records = store.memberships(&partition);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].member_of.len(), 1);
        assert!(store.remove_membership(&partition, &owner));
        assert!(store.memberships(&partition).is_empty());
    }
}
