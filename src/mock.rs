//! # Mock Owner & Refresh Doubles
//!
//! Dispatchers built on [`ConcurrencyGuard`](crate::ConcurrencyGuard) need an
//! owner and, usually, a refresh callback. The doubles in this module stand in
//! for both so tests can drive every dirty-state path deterministically.
//!
//! | Double | Stands in for | Records |
//! |--------|---------------|---------|
//! | [`MockOwner`] | the actor | dirty flag, `mark_fresh` calls, real dirty→fresh transitions |
//! | [`MockRefresh`] | the reload callback | each invocation, scripted success or failure |
//!
//! ## Example
//!
//! ```rust
//! use actor_guard::mock::{MockOwner, MockRefresh};
//! use actor_guard::{CallChain, ConcurrencyGuard, GuardConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let owner = Arc::new(MockOwner::dirty());
//!     let guard = ConcurrencyGuard::new(owner.clone(), GuardConfig::default());
//!
//!     let mut refresh = MockRefresh::new();
//!     refresh.expect_refresh().return_ok();
//!
//!     let root = CallChain::new("root").unwrap();
//!     guard.acquire(&root, Some(&refresh), &CancellationToken::new()).await.unwrap();
//!
//!     assert!(!owner.is_dirty());
//!     refresh.verify();
//! }
//! ```

use crate::error::RefreshError;
use crate::owner::{DirtyFlag, GuardedOwner, StateRefresh};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Owner double with an inspectable dirty flag.
#[derive(Debug, Default)]
pub struct MockOwner {
    dirty: DirtyFlag,
    mark_fresh_calls: AtomicUsize,
    fresh_transitions: AtomicUsize,
}

impl MockOwner {
    /// An owner that starts stale.
    pub fn dirty() -> Self {
        Self {
            dirty: DirtyFlag::new(true),
            ..Self::default()
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    pub fn mark_dirty(&self) {
        self.dirty.mark_dirty();
    }

    /// Every `mark_fresh` call, including no-op ones.
    pub fn mark_fresh_calls(&self) -> usize {
        self.mark_fresh_calls.load(Ordering::SeqCst)
    }

    /// Only the `mark_fresh` calls that actually cleared the flag.
    pub fn fresh_transitions(&self) -> usize {
        self.fresh_transitions.load(Ordering::SeqCst)
    }
}

impl GuardedOwner for MockOwner {
    fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    fn mark_fresh(&self) {
        self.mark_fresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.dirty.mark_fresh() {
            self.fresh_transitions.fetch_add(1, Ordering::SeqCst);
        }
    }
}

enum Expectation {
    Ok { mark_fresh: usize },
    Err(String),
}

/// Refresh callback double with scripted outcomes, consumed in order.
///
/// An invocation with no expectation left panics, as does [`verify`](Self::verify)
/// with expectations still pending.
#[derive(Default)]
pub struct MockRefresh {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    calls: AtomicUsize,
}

impl MockRefresh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects one more refresh.
    pub fn expect_refresh(&mut self) -> RefreshExpectationBuilder {
        RefreshExpectationBuilder {
            expectations: self.expectations.clone(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let exps = self.expectations.lock().unwrap();
        if !exps.is_empty() {
            panic!("Not all refresh expectations were met. {} remaining", exps.len());
        }
    }
}

#[async_trait]
impl<O: GuardedOwner> StateRefresh<O> for MockRefresh {
    async fn refresh(&self, owner: Arc<O>) -> Result<(), RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let expectation = self.expectations.lock().unwrap().pop_front();
        match expectation {
            Some(Expectation::Ok { mark_fresh }) => {
                for _ in 0..mark_fresh {
                    owner.mark_fresh();
                }
                Ok(())
            }
            Some(Expectation::Err(msg)) => Err(msg.into()),
            None => panic!("Unexpected refresh"),
        }
    }
}

/// Builder for refresh expectations.
pub struct RefreshExpectationBuilder {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl RefreshExpectationBuilder {
    /// The refresh succeeds without touching the owner.
    pub fn return_ok(self) {
        self.push(Expectation::Ok { mark_fresh: 0 });
    }

    /// The refresh calls `owner.mark_fresh()` `times` times, then succeeds.
    pub fn mark_fresh_and_return_ok(self, times: usize) {
        self.push(Expectation::Ok { mark_fresh: times });
    }

    /// The refresh fails with `message`.
    pub fn return_err(self, message: impl Into<String>) {
        self.push(Expectation::Err(message.into()));
    }

    fn push(self, expectation: Expectation) {
        self.expectations.lock().unwrap().push_back(expectation);
    }
}
