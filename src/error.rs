//! # Guard Errors
//!
//! Every failure the guard can report to a dispatcher. A failed `acquire`
//! never leaves partial bookkeeping behind, so callers can treat any of these
//! as "the invocation did not run".

use crate::context::CallChain;
use std::fmt;

/// Error produced by a dirty-state refresh callback.
pub type RefreshError = Box<dyn std::error::Error + Send + Sync>;

/// Why a queued acquisition was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation token fired.
    Caller,
    /// The configured acquire timeout elapsed.
    Timeout,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Caller => write!(f, "cancelled by caller"),
            CancelReason::Timeout => write!(f, "timed out waiting for the lock"),
        }
    }
}

/// Errors returned by [`ConcurrencyGuard`](crate::ConcurrencyGuard).
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// The reentrancy policy forbids this chain from re-entering.
    #[error("Reentrancy denied for {context} (held by {holder})")]
    ReentrancyDenied { context: CallChain, holder: CallChain },

    /// The request was abandoned while waiting in the queue.
    #[error("Operation cancelled: {0}")]
    OperationCancelled(CancelReason),

    /// `release` named a token with no outstanding acquisition.
    #[error("Invalid release context: {context}")]
    InvalidReleaseContext { context: CallChain },

    /// The context token is empty or has an empty segment.
    #[error("Invalid context token: {0:?}")]
    InvalidContext(String),

    /// The dirty-state refresh callback failed; the grant was rolled back.
    #[error("State refresh failed: {0}")]
    RefreshFailed(#[source] RefreshError),
}

impl GuardError {
    /// True for the two cancellation flavours.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GuardError::OperationCancelled(_))
    }
}
