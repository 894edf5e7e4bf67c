//! Live sequences
//!
//! A `LiveSequence<T>` is an ordered snapshot that re-emits whenever the data
//! behind it changes. It is a thin layer over `tokio::sync::watch`: readers
//! always see the latest snapshot, and intermediate snapshots may be skipped
//! by slow readers. The publishing side never emits a snapshot equal to the
//! current one.

use tokio::sync::watch;

/// Reader side of a live ordered collection
#[derive(Debug, Clone)]
pub struct LiveSequence<T> {
    rx: watch::Receiver<Vec<T>>,
}

/// Writer side of a live ordered collection
#[derive(Debug)]
pub struct LivePublisher<T> {
    tx: watch::Sender<Vec<T>>,
}

impl<T: Clone + PartialEq> LiveSequence<T> {
    /// Create a publisher/sequence pair seeded with `initial`
    #[must_use]
    pub fn channel(initial: Vec<T>) -> (LivePublisher<T>, LiveSequence<T>) {
        let (tx, rx) = watch::channel(initial);
        (LivePublisher { tx }, LiveSequence { rx })
    }

    /// Clone the current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.rx.borrow().clone()
    }

    /// Number of items in the current snapshot
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.borrow().len()
    }

    /// Whether the current snapshot is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.borrow().is_empty()
    }

    /// Wait for the next snapshot this reader has not seen.
    ///
    /// Returns `None` once the publisher is gone and every snapshot has been seen.
    pub async fn changed(&mut self) -> Option<Vec<T>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until a snapshot satisfies `predicate`, checking the current one first.
    ///
    /// Returns `None` if the publisher goes away first.
    pub async fn wait_until<F>(&mut self, mut predicate: F) -> Option<Vec<T>>
    where
        F: FnMut(&[T]) -> bool,
    {
        self.rx
            .wait_for(|items| predicate(items))
            .await
            .ok()
            .map(|items| items.clone())
    }

    /// Whether the publisher has been dropped
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }
}

impl<T: Clone + PartialEq> LivePublisher<T> {
    /// Replace the snapshot; returns `true` if subscribers were notified
    pub fn publish(&self, items: Vec<T>) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == items {
                false
            } else {
                *current = items;
                true
            }
        })
    }

    /// Edit the snapshot in place; `edit` returns whether anything changed
    pub fn modify<F>(&self, edit: F) -> bool
    where
        F: FnOnce(&mut Vec<T>) -> bool,
    {
        self.tx.send_if_modified(edit)
    }

    /// Clone the current snapshot
    #[must_use]
    pub fn current(&self) -> Vec<T> {
        self.tx.borrow().clone()
    }

    /// New reader positioned at the current snapshot
    #[must_use]
    pub fn subscribe(&self) -> LiveSequence<T> {
        LiveSequence {
            rx: self.tx.subscribe(),
        }
    }

    /// Whether every reader has been dropped
    #[must_use]
    pub fn has_no_readers(&self) -> bool {
        self.tx.is_closed()
    }

    /// Completes once every reader has been dropped
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}
