//! Error types for the session layer
//!
//! Nothing here is fatal. Every failure ends either in a user-visible,
//! non-fatal notification or in a silent no-op:
//! - missing principal: redirect to login
//! - open failure: reported to the view, no retry
//! - sign-out failure: reported, session left as it was
//! - absent membership record: not an error at all (placeholder path)
//! - completion after teardown: discarded silently

use crate::segment::SegmentState;
use tasktracker_store::StoreError;

/// Identity provider errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// Provider refused to end the session
    #[error("sign-out rejected: {0}")]
    SignOutRejected(String),

    /// Provider could not be reached
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Main session error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Backing collaborator failed to open the partition
    #[error("could not open store: {0}")]
    StoreOpenFailed(#[source] StoreError),

    /// Identity provider failed to sign out
    #[error("sign-out failed: {0}")]
    SignOutFailed(#[source] IdentityError),

    /// Handle is not in `Ready`
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// Task write was rejected
    #[error("task write failed: {0}")]
    TaskWriteFailed(#[source] StoreError),

    /// Illegal segment transition
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl SessionError {
    /// Classify the error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StoreOpenFailed(_) => ErrorKind::StoreOpenFailed,
            Self::SignOutFailed(_) => ErrorKind::SignOutFailed,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::TaskWriteFailed(_) => ErrorKind::TaskWriteFailed,
            Self::Transition(_) => ErrorKind::IllegalTransition,
        }
    }

    /// Session errors never terminate the process
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        false
    }

    /// Check if the error should be shown to the user
    #[inline]
    #[must_use]
    pub fn is_surfaced(&self) -> bool {
        self.kind().is_surfaced()
    }
}

/// Failure classes, including the benign ones that never become a `SessionError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No principal; reported as `StartOutcome::LoginRequired` and redirected to login
    AuthenticationRequired,
    /// Non-fatal message, no retry
    StoreOpenFailed,
    /// Surfaced, session unchanged
    SignOutFailed,
    /// Membership record not provisioned yet; handled by the placeholder path
    TransientRecordAbsent,
    /// Completion arrived for a torn-down segment; discarded
    LateCallbackAfterTeardown,
    /// Operation on a handle that is not ready
    StoreUnavailable,
    /// Task write rejected
    TaskWriteFailed,
    /// Programming error in segment bookkeeping
    IllegalTransition,
}

impl ErrorKind {
    /// Whether this class reaches the user as a notification
    #[must_use]
    pub const fn is_surfaced(self) -> bool {
        matches!(
            self,
            Self::StoreOpenFailed | Self::SignOutFailed | Self::TaskWriteFailed
        )
    }
}

/// Segment state change that the state machine does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal segment transition: {from:?} -> {to:?}")]
pub struct TransitionError {
    /// State before the attempted change
    pub from: SegmentState,
    /// Requested state
    pub to: SegmentState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasktracker_model::PartitionKey;

    #[test]
    fn session_error_display() {
        let err = SessionError::StoreOpenFailed(StoreError::open_failed(
            &PartitionKey::explicit("user=u1"),
            "offline",
        ));
        assert!(err.to_string().contains("could not open store"));
        assert!(err.to_string().contains("offline"));
    }

    #[test]
    fn only_user_facing_failures_are_surfaced() {
        assert!(SessionError::SignOutFailed(IdentityError::SignOutRejected("x".into()))
            .is_surfaced());
        assert!(!ErrorKind::AuthenticationRequired.is_surfaced());
        assert!(!ErrorKind::TransientRecordAbsent.is_surfaced());
        assert!(!ErrorKind::LateCallbackAfterTeardown.is_surfaced());
    }

    #[test]
    fn nothing_is_fatal() {
        let unavailable = SessionError::StoreUnavailable(StoreError::Closed(
            PartitionKey::explicit("user=u1"),
        ));
        assert!(!unavailable.is_fatal());
        let err: SessionError = TransitionError {
            from: SegmentState::Closed,
            to: SegmentState::Ready,
        }
        .into();
        assert!(!err.is_fatal());
        assert_eq!(err.kind(), ErrorKind::IllegalTransition);
    }
}
