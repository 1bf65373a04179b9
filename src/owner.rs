//! # Owner Surface
//!
//! The guard knows nothing about the actor it protects beyond two things: whether
//! its cached state is stale, and how to declare it fresh again. Refreshing the
//! state itself is done by a [`StateRefresh`] callback supplied per acquisition,
//! so the guard never depends on the owner's concrete type.

use crate::error::RefreshError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Contract between a guard and the actor it serializes.
pub trait GuardedOwner: Send + Sync + 'static {
    /// True when cached state must be reloaded before the next holder runs.
    fn is_dirty(&self) -> bool;

    /// Declares the state fresh. Must be idempotent.
    fn mark_fresh(&self);
}

/// Callback run on a fresh top-level grant while the owner is dirty.
///
/// The lock is already held by the new holder when this runs, so the callback
/// may mutate owner state freely. On `Ok` the guard marks the owner fresh.
#[async_trait]
pub trait StateRefresh<O: ?Sized>: Send + Sync {
    async fn refresh(&self, owner: Arc<O>) -> Result<(), RefreshError>;
}

/// Adapts an async closure into a [`StateRefresh`].
///
/// ```rust
/// use actor_guard::{DirtyFlag, GuardedOwner, RefreshFn, StateRefresh};
/// use std::sync::Arc;
///
/// struct Account { dirty: DirtyFlag }
/// impl GuardedOwner for Account {
///     fn is_dirty(&self) -> bool { self.dirty.is_dirty() }
///     fn mark_fresh(&self) { self.dirty.mark_fresh(); }
/// }
///
/// let reload = RefreshFn::new(|_account: Arc<Account>| async move {
///     // reload from storage here
///     Ok::<_, actor_guard::RefreshError>(())
/// });
/// # let _: &dyn StateRefresh<Account> = &reload;
/// ```
pub struct RefreshFn<F>(F);

impl<F> RefreshFn<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<O, F, Fut> StateRefresh<O> for RefreshFn<F>
where
    O: Send + Sync + 'static,
    F: Fn(Arc<O>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), RefreshError>> + Send,
{
    async fn refresh(&self, owner: Arc<O>) -> Result<(), RefreshError> {
        (self.0)(owner).await
    }
}

/// Atomic stale-state flag for owners to embed.
#[derive(Debug, Default)]
pub struct DirtyFlag(AtomicBool);

impl DirtyFlag {
    pub fn new(dirty: bool) -> Self {
        Self(AtomicBool::new(dirty))
    }

    pub fn is_dirty(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Clears the flag. Returns `true` only for the call that actually
    /// flipped it from dirty to fresh.
    pub fn mark_fresh(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}
