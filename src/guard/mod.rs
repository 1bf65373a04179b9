//! # Concurrency Guard
//!
//! [`ConcurrencyGuard`] serializes the invocations aimed at one actor. A
//! dispatcher calls [`acquire`](ConcurrencyGuard::acquire) with the
//! invocation's [`CallChain`], runs the actor method, then calls
//! [`release`](ConcurrencyGuard::release) with the same chain.
//!
//! ## Grant rules
//!
//! | Mode | Same-chain reentry | Cross-chain | Unheld |
//! |---|---|---|---|
//! | `LogicalCallContext` | granted immediately, nested count++ | queued, FIFO | granted |
//! | `Disallowed` | `ReentrancyDenied` | queued, FIFO | granted |
//!
//! Reentrant grants bypass the queue; queued callers are woken strictly in
//! arrival order, one per release-to-zero.
//!
//! ## Dirty state
//!
//! Whenever the lock passes to a new top-level holder while the owner reports
//! [`is_dirty`](GuardedOwner::is_dirty), the caller's [`StateRefresh`] runs
//! before `acquire` returns, and the owner is marked fresh when it succeeds. A
//! failing refresh rolls the grant back.
//!
//! ## Example
//!
//! ```rust
//! use actor_guard::{CallChain, ConcurrencyGuard, GuardConfig, mock::MockOwner};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), actor_guard::GuardError> {
//!     let guard = ConcurrencyGuard::new(Arc::new(MockOwner::default()), GuardConfig::default());
//!     let cancel = CancellationToken::new();
//!
//!     let root: CallChain = "order_7".parse()?;
//!     guard.acquire(&root, None, &cancel).await?;
//!
//!     // The actor calls back into itself
//!     let nested = root.child("reserve")?;
//!     guard.acquire(&nested, None, &cancel).await?;
//!     assert_eq!(guard.current_count(), 2);
//!
//!     guard.release(&nested)?;
//!     guard.release(&root)?;
//!     assert_eq!(guard.current_context(), None);
//!     Ok(())
//! }
//! ```

mod state;

use crate::config::{GuardConfig, ReentrancyMode};
use crate::context::CallChain;
use crate::error::{CancelReason, GuardError};
use crate::owner::{GuardedOwner, StateRefresh};
use state::{Admission, GuardState, Released};
use std::future::{pending, Future};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Reentrant, FIFO-fair async lock for a single actor.
pub struct ConcurrencyGuard<O: GuardedOwner> {
    owner: Arc<O>,
    config: GuardConfig,
    state: Mutex<GuardState>,
}

impl<O: GuardedOwner> ConcurrencyGuard<O> {
    pub fn new(owner: Arc<O>, config: GuardConfig) -> Self {
        Self {
            owner,
            config,
            state: Mutex::new(GuardState::default()),
        }
    }

    /// Shorthand for a guard with the given mode and no acquire timeout.
    pub fn with_mode(owner: Arc<O>, mode: ReentrancyMode) -> Self {
        Self::new(owner, GuardConfig::new(mode))
    }

    /// Acquires the guard for `context`.
    ///
    /// Returns once the lock is held by `context`, either freshly or as a
    /// nested reentry. On any error the guard is left exactly as it was.
    ///
    /// # Errors
    ///
    /// * [`GuardError::ReentrancyDenied`] - same-chain reentry under `Disallowed`.
    /// * [`GuardError::OperationCancelled`] - `cancel` fired, or the configured
    ///   timeout elapsed, while waiting in the queue. Immediate grants and
    ///   reentries ignore `cancel`, even when it has already fired.
    /// * [`GuardError::RefreshFailed`] - the dirty-state refresh failed.
    ///
    /// # Cancel safety
    ///
    /// Dropping the returned future is safe: a queued request leaves the
    /// queue, and a grant that was already handed over is released.
    #[instrument(skip(self, context, refresh, cancel), fields(context = %context))]
    pub async fn acquire(
        &self,
        context: &CallChain,
        refresh: Option<&dyn StateRefresh<O>>,
        cancel: &CancellationToken,
    ) -> Result<(), GuardError> {
        let admission = self.lock_state().admit(context, self.config.mode);
        let mut hold = match admission {
            Admission::Reentered { count } => {
                debug!(count, "Reentered");
                return Ok(());
            }
            Admission::Denied { holder } => {
                warn!(%holder, "Reentrancy denied");
                return Err(GuardError::ReentrancyDenied {
                    context: context.clone(),
                    holder,
                });
            }
            Admission::Granted => {
                debug!("Granted");
                Hold::held(self, context)
            }
            Admission::Queued {
                ticket,
                position,
                granted,
            } => {
                debug!(ticket, position, "Queued behind current holder");
                let mut hold = Hold::queued(self, context, ticket, granted);
                self.wait_for_grant(&mut hold, cancel).await?;
                hold
            }
        };

        // Dropping `hold` on error rolls the grant back
        self.refresh_if_dirty(refresh).await?;
        hold.settle();
        Ok(())
    }

    /// Releases one acquisition made with exactly `context`.
    ///
    /// When the nested count drops to zero the lock passes to the next
    /// queued caller, if any.
    ///
    /// # Errors
    ///
    /// [`GuardError::InvalidReleaseContext`] if `context` has no outstanding
    /// acquisition. The guard is unchanged in that case.
    pub fn release(&self, context: &CallChain) -> Result<(), GuardError> {
        let released = self.lock_state().release(context);
        match released {
            Some(Released::Nested { count }) => debug!(%context, count, "Released nested"),
            Some(Released::Idle) => debug!(%context, "Released, guard idle"),
            Some(Released::HandedOff { next }) => {
                debug!(%context, %next, "Released, handed off")
            }
            None => {
                warn!(%context, "Release without matching acquisition");
                return Err(GuardError::InvalidReleaseContext {
                    context: context.clone(),
                });
            }
        }
        Ok(())
    }

    /// Runs one turn: acquire, call into the owner, release.
    ///
    /// The release happens even if `call` panics or the returned future is
    /// dropped part-way.
    #[instrument(skip(self, context, refresh, cancel, call), fields(context = %context))]
    pub async fn invoke<F, Fut, T>(
        &self,
        context: &CallChain,
        refresh: Option<&dyn StateRefresh<O>>,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T, GuardError>
    where
        F: FnOnce(Arc<O>) -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire(context, refresh, cancel).await?;
        let _turn = Hold::held(self, context);
        Ok(call(Arc::clone(&self.owner)).await)
    }

    /// Root chain of the current holder.
    pub fn current_context(&self) -> Option<CallChain> {
        self.lock_state().current_context().cloned()
    }

    /// Outstanding acquisitions of the current holder; zero when idle.
    pub fn current_count(&self) -> usize {
        self.lock_state().current_count()
    }

    pub fn waiter_count(&self) -> usize {
        self.lock_state().waiter_count()
    }

    pub fn mode(&self) -> ReentrancyMode {
        self.config.mode
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn owner(&self) -> &Arc<O> {
        &self.owner
    }

    async fn wait_for_grant(
        &self,
        hold: &mut Hold<'_, O>,
        cancel: &CancellationToken,
    ) -> Result<(), GuardError> {
        let timeout = async {
            match self.config.acquire_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => pending::<()>().await,
            }
        };
        tokio::pin!(timeout);

        let abandoned = match &mut hold.stage {
            Stage::Queued { granted, .. } => tokio::select! {
                biased;
                // The sender only goes away with the waiter's queue entry
                result = granted => result.err().map(|_| CancelReason::Caller),
                _ = cancel.cancelled() => Some(CancelReason::Caller),
                _ = &mut timeout => Some(CancelReason::Timeout),
            },
            _ => None,
        };

        let Some(reason) = abandoned else {
            hold.granted();
            debug!("Granted after wait");
            return Ok(());
        };

        if hold.withdraw() {
            info!(%reason, "Acquire abandoned while queued");
            Err(GuardError::OperationCancelled(reason))
        } else {
            // Ownership was handed over before the cancellation was seen
            debug!(%reason, "Grant won the race with cancellation");
            Ok(())
        }
    }

    async fn refresh_if_dirty(
        &self,
        refresh: Option<&dyn StateRefresh<O>>,
    ) -> Result<(), GuardError> {
        if !self.owner.is_dirty() {
            return Ok(());
        }
        let Some(refresh) = refresh else {
            debug!("Owner is dirty but no refresh callback was supplied");
            return Ok(());
        };

        debug!("Refreshing dirty owner state");
        if let Err(e) = refresh.refresh(Arc::clone(&self.owner)).await {
            warn!(error = %e, "State refresh failed, rolling back grant");
            return Err(GuardError::RefreshFailed(e));
        }
        self.owner.mark_fresh();
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, GuardState> {
        // Bookkeeping never panics mid-update, so a poisoned state is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Stage {
    /// Waiting in line. The receiver stays alive until the ticket is
    /// withdrawn, so a hand-off can never be sent into the void.
    Queued {
        ticket: u64,
        granted: oneshot::Receiver<()>,
    },
    Held,
    Settled,
}

/// Tracks one in-flight acquisition so that dropping it part-way gives back
/// whatever it had taken.
struct Hold<'a, O: GuardedOwner> {
    guard: &'a ConcurrencyGuard<O>,
    context: &'a CallChain,
    stage: Stage,
}

impl<'a, O: GuardedOwner> Hold<'a, O> {
    fn queued(
        guard: &'a ConcurrencyGuard<O>,
        context: &'a CallChain,
        ticket: u64,
        granted: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            guard,
            context,
            stage: Stage::Queued { ticket, granted },
        }
    }

    fn held(guard: &'a ConcurrencyGuard<O>, context: &'a CallChain) -> Self {
        Self {
            guard,
            context,
            stage: Stage::Held,
        }
    }

    fn granted(&mut self) {
        self.stage = Stage::Held;
    }

    /// Leaves the queue. Returns `false` if the grant arrived first, in which
    /// case this hold now owns the lock.
    fn withdraw(&mut self) -> bool {
        let Stage::Queued { ticket, .. } = &self.stage else {
            return false;
        };
        let removed = self.guard.lock_state().withdraw(*ticket);
        self.stage = if removed { Stage::Settled } else { Stage::Held };
        removed
    }

    fn settle(&mut self) {
        self.stage = Stage::Settled;
    }
}

impl<O: GuardedOwner> Drop for Hold<'_, O> {
    fn drop(&mut self) {
        match self.stage {
            Stage::Settled => {}
            Stage::Queued { .. } => {
                if !self.withdraw() {
                    self.give_back();
                }
            }
            Stage::Held => self.give_back(),
        }
    }
}

impl<O: GuardedOwner> Hold<'_, O> {
    fn give_back(&mut self) {
        self.stage = Stage::Settled;
        if let Err(e) = self.guard.release(self.context) {
            error!(context = %self.context, error = %e, "Failed to give back abandoned grant");
        }
    }
}
