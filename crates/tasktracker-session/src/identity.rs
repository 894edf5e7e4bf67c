//! Identity provider seam

use crate::error::IdentityError;
use async_trait::async_trait;
use parking_lot::RwLock;
use tasktracker_model::Principal;

/// Supplies the current authenticated principal
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Principal signed in right now, if any
    fn current(&self) -> Option<Principal>;

    /// End the current session
    ///
    /// # Errors
    /// - `IdentityError` if the provider could not sign out
    async fn sign_out(&self) -> Result<(), IdentityError>;
}

/// Identity provider holding the principal in memory
#[derive(Debug, Default)]
pub struct LocalIdentityProvider {
    current: RwLock<Option<Principal>>,
    sign_out_failure: RwLock<Option<String>>,
}

impl LocalIdentityProvider {
    /// Provider with nobody signed in
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with `principal` already signed in
    #[must_use]
    pub fn signed_in(principal: Principal) -> Self {
        let provider = Self::new();
        provider.sign_in(principal);
        provider
    }

    /// Replace the current principal
    pub fn sign_in(&self, principal: Principal) {
        tracing::info!(principal = %principal.id, "principal signed in");
        *self.current.write() = Some(principal);
    }

    /// Make every following sign-out fail with `reason`, or succeed again with `None`
    pub fn set_sign_out_failure(&self, reason: Option<String>) {
        *self.sign_out_failure.write() = reason;
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    fn current(&self) -> Option<Principal> {
        self.current.read().clone()
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        if let Some(reason) = self.sign_out_failure.read().clone() {
            return Err(IdentityError::SignOutRejected(reason));
        }
        *self.current.write() = None;
        Ok(())
    }
}
