//! Rendering live sequences

use std::sync::Arc;
use tasktracker_store::LiveSequence;
use tokio::task::JoinHandle;

/// Presentation target for a live list
pub trait ListSink<T>: Send + Sync {
    /// Render a complete snapshot, replacing whatever was shown before
    fn render(&self, items: &[T]);

    /// The sequence ended; no further snapshots follow
    fn closed(&self) {}
}

/// Drive `sink` from `sequence`.
///
/// Renders the current snapshot right away, then every update until the
/// publishing side goes away. Abort the returned task to stop early.
///
/// Must be called from within a tokio runtime.
pub fn bind_list<T>(mut sequence: LiveSequence<T>, sink: Arc<dyn ListSink<T>>) -> JoinHandle<()>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    tokio::spawn(async move {
        sink.render(&sequence.snapshot());
        while let Some(items) = sequence.changed().await {
            sink.render(&items);
        }
        tracing::debug!("live list ended");
        sink.closed();
    })
}
