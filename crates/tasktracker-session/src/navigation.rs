//! One-way navigation signals

use tokio::sync::mpsc;

/// Signals sent to the external navigation collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationSignal {
    /// No principal; show the login flow
    RequireLogin,
    /// Sign-out finished; show the login flow
    LoggedOut,
}

/// Receives navigation signals. Fire-and-forget: nothing is returned.
pub trait Navigator: Send + Sync {
    /// Deliver `signal`
    fn navigate(&self, signal: NavigationSignal);
}

/// Navigator that forwards signals over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<NavigationSignal>,
}

impl ChannelNavigator {
    /// Create navigator and the receiving end
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NavigationSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Navigator for ChannelNavigator {
    fn navigate(&self, signal: NavigationSignal) {
        if self.tx.send(signal).is_err() {
            tracing::debug!(?signal, "navigation receiver gone; signal dropped");
        }
    }
}
