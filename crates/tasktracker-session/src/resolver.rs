//! Membership collection resolution
//!
//! The authoritative membership record is written by a server-side trigger
//! some time after sign-up, so a freshly authenticated principal may not have
//! one yet. The resolver hides that gap: it emits the projects of the record
//! when it exists, otherwise the single default project of a placeholder, and
//! swaps to the record as soon as it is observed.
//!
//! Output is always exactly one of the two sources, never a merge.

use crate::config::{SessionConfig, DEFAULT_PROJECT_NAME};
use crate::error::SessionError;
use dashmap::DashMap;
use std::sync::Arc;
use tasktracker_model::{
    MembershipRecord, PlaceholderMembership, Principal, PrincipalId, ProjectReference,
};
use tasktracker_store::{HandleId, LiveSequence, StoreHandle};

/// Private, non-persistent home of placeholder memberships.
///
/// Entries are keyed by (handle, principal), so repeated resolution against
/// the same handle reuses one placeholder.
#[derive(Debug, Default)]
pub struct PlaceholderScope {
    entries: DashMap<(HandleId, PrincipalId), Arc<PlaceholderMembership>>,
}

impl PlaceholderScope {
    /// Create empty scope
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing placeholder for (handle, owner), or a new one labelled `label`
    pub fn get_or_create(
        &self,
        handle: HandleId,
        owner: &PrincipalId,
        label: &str,
    ) -> Arc<PlaceholderMembership> {
        self.entries
            .entry((handle, owner.clone()))
            .or_insert_with(|| {
                tracing::debug!(handle = %handle, principal = %owner, "placeholder membership created");
                Arc::new(PlaceholderMembership::for_principal(owner, label))
            })
            .clone()
    }

    /// Placeholder for (handle, owner), if one exists
    #[must_use]
    pub fn get(&self, handle: HandleId, owner: &PrincipalId) -> Option<Arc<PlaceholderMembership>> {
        self.entries
            .get(&(handle, owner.clone()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Drop the placeholder for (handle, owner). Returns `true` if one existed.
    pub fn discard(&self, handle: HandleId, owner: &PrincipalId) -> bool {
        self.entries.remove(&(handle, owner.clone())).is_some()
    }

    /// Drop every placeholder created against `handle`
    pub fn discard_handle(&self, handle: HandleId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(h, _), _| *h != handle);
        before.saturating_sub(self.entries.len())
    }

    /// Number of live placeholders
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the scope holds no placeholder
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where the emitted collection currently comes from
#[derive(Debug, Clone)]
enum Resolution {
    Authoritative(MembershipRecord),
    Placeholder(Arc<PlaceholderMembership>),
}

impl Resolution {
    fn projects(&self) -> Vec<ProjectReference> {
        match self {
            Self::Authoritative(record) => record.projects().to_vec(),
            Self::Placeholder(placeholder) => placeholder.projects(),
        }
    }

    fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }
}

/// One (handle, principal) pair being resolved
#[derive(Debug, Clone)]
struct Subject {
    scope: Arc<PlaceholderScope>,
    handle: HandleId,
    owner: PrincipalId,
    label: String,
}

impl Subject {
    /// `records` is already filtered to the owner and sorted by id
    fn resolve(&self, records: &[MembershipRecord]) -> Resolution {
        match records.first() {
            Some(record) => {
                self.scope.discard(self.handle, &self.owner);
                Resolution::Authoritative(record.clone())
            }
            None => Resolution::Placeholder(self.scope.get_or_create(
                self.handle,
                &self.owner,
                &self.label,
            )),
        }
    }
}

/// Resolves a principal's live project list against a Ready store handle
#[derive(Debug, Clone)]
pub struct CollectionResolver {
    scope: Arc<PlaceholderScope>,
    default_project_name: String,
}

impl Default for CollectionResolver {
    fn default() -> Self {
        Self {
            scope: Arc::new(PlaceholderScope::new()),
            default_project_name: DEFAULT_PROJECT_NAME.to_string(),
        }
    }
}

impl CollectionResolver {
    /// Create resolver using `config.default_project_name` for placeholders
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            scope: Arc::new(PlaceholderScope::new()),
            default_project_name: config.default_project_name.clone(),
        }
    }

    /// Placeholder scope shared by every resolution of this resolver
    #[must_use]
    pub fn placeholders(&self) -> &Arc<PlaceholderScope> {
        &self.scope
    }

    /// Live project list of `principal` in `store`.
    ///
    /// The returned sequence follows the authoritative record once it exists
    /// and the placeholder's single project until then. It stops updating when
    /// the handle closes or every reader is dropped. Placeholders created here
    /// are dropped from the scope when the handle closes.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - `SessionError::StoreUnavailable` if `store` is not `Ready`
    pub fn resolve(
        &self,
        store: &Arc<StoreHandle>,
        principal: &Principal,
    ) -> Result<LiveSequence<ProjectReference>, SessionError> {
        let records = store
            .memberships_for(&principal.id)
            .map_err(SessionError::StoreUnavailable)?;

        let subject = Subject {
            scope: Arc::clone(&self.scope),
            handle: store.id(),
            owner: principal.id.clone(),
            label: self.default_project_name.clone(),
        };

        let initial = subject.resolve(&records.snapshot());
        if initial.is_placeholder() {
            tracing::info!(
                principal = %subject.owner,
                partition = %store.partition(),
                handle = %subject.handle,
                "membership record absent; using placeholder project"
            );
        }

        let (publisher, projects) = LiveSequence::channel(initial.projects());
        let closed = store.close_token();

        tokio::spawn(async move {
            let mut records = records;
            let mut current = initial;
            loop {
                tokio::select! {
                    biased;
                    () = closed.cancelled() => break,
                    () = publisher.closed() => {
                        tracing::debug!(principal = %subject.owner, "project list has no readers");
                        break;
                    }
                    next = records.changed() => {
                        let Some(found) = next else { break };
                        let next = subject.resolve(&found);
                        match (current.is_placeholder(), next.is_placeholder()) {
                            (true, false) => tracing::info!(
                                principal = %subject.owner,
                                handle = %subject.handle,
                                "membership record observed; placeholder discarded"
                            ),
                            (false, true) => tracing::warn!(
                                principal = %subject.owner,
                                handle = %subject.handle,
                                "membership record disappeared; falling back to placeholder"
                            ),
                            _ => tracing::debug!(principal = %subject.owner, "membership record updated"),
                        }
                        publisher.publish(next.projects());
                        current = next;
                    }
                }
            }

            drop(records);

            // Placeholders live as long as the handle, even once nobody reads the list.
            closed.cancelled().await;
            let dropped = subject.scope.discard_handle(subject.handle);
            tracing::debug!(handle = %subject.handle, dropped, "resolution ended with handle");
        });

        Ok(projects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tasktracker_model::PartitionKey;
    use tasktracker_store::MemoryStore;

    async fn ready_handle(store: &MemoryStore, key: &str) -> Arc<StoreHandle> {
        let handle = Arc::new(StoreHandle::new(PartitionKey::explicit(key)));
        handle.connect(store).await.unwrap();
        handle
    }

    fn project(name: &str, key: &str) -> ProjectReference {
        ProjectReference::new(name, PartitionKey::explicit(key))
    }

    #[tokio::test]
    async fn absent_record_yields_single_placeholder_project() {
        let store = MemoryStore::default();
        let handle = ready_handle(&store, "user=u1").await;
        let resolver = CollectionResolver::default();

        let projects = resolver.resolve(&handle, &Principal::new("u1")).unwrap();

        assert_eq!(projects.snapshot(), vec![project("My Project", "project=u1")]);
        assert_eq!(resolver.placeholders().len(), 1);
    }

    #[tokio::test]
    async fn placeholder_label_comes_from_config() {
        let store = MemoryStore::default();
        let handle = ready_handle(&store, "user=u1").await;
        let config = SessionConfig::new().with_default_project_name("Inbox");
        let resolver = CollectionResolver::new(&config);

        let projects = resolver.resolve(&handle, &Principal::new("u1")).unwrap();
        assert_eq!(projects.snapshot()[0].name, "Inbox");
    }

    #[tokio::test]
    async fn existing_record_is_used_directly() {
        let store = MemoryStore::default();
        let key = PartitionKey::explicit("user=u1");
        store.provision_membership(
            &key,
            MembershipRecord::new(PrincipalId::new("u1")).with_projects(vec![
                project("Home", "project=h"),
                project("Work", "project=w"),
            ]),
        );
        let handle = ready_handle(&store, "user=u1").await;
        let resolver = CollectionResolver::default();

        let projects = resolver.resolve(&handle, &Principal::new("u1")).unwrap();

        assert_eq!(
            projects.snapshot(),
            vec![project("Home", "project=h"), project("Work", "project=w")]
        );
        assert!(resolver.placeholders().is_empty());
    }

    #[tokio::test]
    async fn other_principals_records_are_ignored() {
        let store = MemoryStore::default();
        let key = PartitionKey::explicit("user=u1");
        store.provision_membership(
            &key,
            MembershipRecord::new(PrincipalId::new("u2"))
                .with_projects(vec![project("Theirs", "project=t")]),
        );
        let handle = ready_handle(&store, "user=u1").await;

        let projects = CollectionResolver::default()
            .resolve(&handle, &Principal::new("u1"))
            .unwrap();
        assert_eq!(projects.snapshot(), vec![project("My Project", "project=u1")]);
    }

    #[tokio::test]
    async fn late_record_replaces_placeholder_without_union() {
        let store = MemoryStore::default();
        let key = PartitionKey::explicit("user=u1");
        let handle = ready_handle(&store, "user=u1").await;
        let resolver = CollectionResolver::default();
        let mut projects = resolver.resolve(&handle, &Principal::new("u1")).unwrap();
        assert_eq!(projects.len(), 1);

        let authoritative = vec![
            project("A", "project=a"),
            project("B", "project=b"),
            project("C", "project=c"),
        ];
        store.provision_membership(
            &key,
            MembershipRecord::new(PrincipalId::new("u1")).with_projects(authoritative.clone()),
        );

        let mut seen = Vec::new();
        while let Some(snapshot) = projects.changed().await {
            seen.push(snapshot.len());
            if snapshot.len() == 3 {
                assert_eq!(snapshot, authoritative);
                break;
            }
        }
        assert!(seen.iter().all(|len| *len == 1 || *len == 3), "{seen:?}");
        assert!(resolver.placeholders().is_empty());
    }

    #[tokio::test]
    async fn record_updates_flow_without_re_resolving() {
        let store = MemoryStore::default();
        let key = PartitionKey::explicit("user=u1");
        let record = MembershipRecord::new(PrincipalId::new("u1"))
            .with_projects(vec![project("A", "project=a")]);
        store.provision_membership(&key, record.clone());
        let handle = ready_handle(&store, "user=u1").await;
        let mut projects = CollectionResolver::default()
            .resolve(&handle, &Principal::new("u1"))
            .unwrap();

        store.provision_membership(
            &key,
            record.with_projects(vec![project("A", "project=a"), project("B", "project=b")]),
        );

        let updated = projects.wait_until(|p| p.len() == 2).await.unwrap();
        assert_eq!(updated[1].name, "B");
    }

    #[tokio::test]
    async fn repeated_resolution_reuses_placeholder() {
        let store = MemoryStore::default();
        let handle = ready_handle(&store, "user=u1").await;
        let resolver = CollectionResolver::default();
        let principal = Principal::new("u1");

        let first = resolver.resolve(&handle, &principal).unwrap();
        let held = resolver.placeholders().get(handle.id(), &principal.id).unwrap();
        let second = resolver.resolve(&handle, &principal).unwrap();
        let again = resolver.placeholders().get(handle.id(), &principal.id).unwrap();

        assert!(Arc::ptr_eq(&held, &again));
        assert_eq!(resolver.placeholders().len(), 1);
        assert_eq!(first.snapshot(), second.snapshot());
    }

    #[tokio::test]
    async fn removed_record_falls_back_to_placeholder() {
        let store = MemoryStore::default();
        let key = PartitionKey::explicit("user=u1");
        store.provision_membership(
            &key,
            MembershipRecord::new(PrincipalId::new("u1")).with_projects(vec![
                project("A", "project=a"),
                project("B", "project=b"),
            ]),
        );
        let handle = ready_handle(&store, "user=u1").await;
        let mut projects = CollectionResolver::default()
            .resolve(&handle, &Principal::new("u1"))
            .unwrap();

        assert!(store.remove_membership(&key, &PrincipalId::new("u1")));

        let fallback = projects.wait_until(|p| p.len() == 1).await.unwrap();
        assert_eq!(fallback, vec![project("My Project", "project=u1")]);
    }

    #[tokio::test]
    async fn not_ready_handle_is_rejected() {
        let handle = Arc::new(StoreHandle::new(PartitionKey::explicit("user=u1")));
        let err = CollectionResolver::default()
            .resolve(&handle, &Principal::new("u1"))
            .unwrap_err();

        assert!(matches!(err, SessionError::StoreUnavailable(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn placeholder_outlives_readers_until_handle_closes() {
        let store = MemoryStore::default();
        let handle = ready_handle(&store, "user=u1").await;
        let resolver = CollectionResolver::default();

        let projects = resolver.resolve(&handle, &Principal::new("u1")).unwrap();
        drop(projects);
        tokio::task::yield_now().await;
        assert_eq!(resolver.placeholders().len(), 1);

        handle.close();
        for _ in 0..10 {
            if resolver.placeholders().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(resolver.placeholders().is_empty());
    }

    #[tokio::test]
    async fn closing_handle_ends_resolution_and_drops_placeholder() {
        let store = MemoryStore::default();
        let key = PartitionKey::explicit("user=u1");
        let handle = ready_handle(&store, "user=u1").await;
        let resolver = CollectionResolver::default();
        let mut projects = resolver.resolve(&handle, &Principal::new("u1")).unwrap();

        handle.close();
        while projects.changed().await.is_some() {}

        assert!(resolver.placeholders().is_empty());
        store.provision_membership(
            &key,
            MembershipRecord::new(PrincipalId::new("u1"))
                .with_projects(vec![project("Late", "project=l")]),
        );
        assert_eq!(projects.snapshot(), vec![project("My Project", "project=u1")]);
    }
}
