//! Bookkeeping behind the guard's mutex.
//!
//! Everything here is synchronous and runs with the mutex held, so each method
//! is one atomic transition of the state machine:
//!
//! ```text
//! Idle ──acquire──▶ Held(1) ──reenter──▶ Held(n+1)
//!                     ▲  │
//!                     │  └──release(last)──▶ Idle, or Held(1) for the next waiter
//!                     └──────── cross-chain callers wait in `waiters`
//! ```

use crate::config::ReentrancyMode;
use crate::context::CallChain;
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// Outcome of offering a context to the guard.
pub(crate) enum Admission {
    /// The guard was idle; the context is the new top-level holder.
    Granted,
    /// The context extends the holder's chain and was counted in.
    Reentered { count: usize },
    /// Policy forbids this chain from re-entering.
    Denied { holder: CallChain },
    /// The context must wait; `granted` fires when ownership is handed over.
    Queued {
        ticket: u64,
        position: usize,
        granted: oneshot::Receiver<()>,
    },
}

/// Outcome of a successful release.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Released {
    /// The holder still has outstanding nested acquisitions.
    Nested { count: usize },
    /// The guard is now idle.
    Idle,
    /// Ownership moved to the next waiter.
    HandedOff { next: CallChain },
}

/// The chain currently holding the lock and every acquisition it has not yet
/// released. `entries.len()` is the nested count.
struct Holder {
    root: CallChain,
    entries: Vec<CallChain>,
}

impl Holder {
    fn new(root: CallChain) -> Self {
        Self {
            entries: vec![root.clone()],
            root,
        }
    }
}

struct Waiter {
    ticket: u64,
    context: CallChain,
    grant: oneshot::Sender<()>,
}

#[derive(Default)]
pub(crate) struct GuardState {
    holder: Option<Holder>,
    waiters: VecDeque<Waiter>,
    next_ticket: u64,
}

impl GuardState {
    pub(crate) fn admit(&mut self, context: &CallChain, mode: ReentrancyMode) -> Admission {
        let Some(holder) = self.holder.as_mut() else {
            self.holder = Some(Holder::new(context.clone()));
            return Admission::Granted;
        };

        if context.extends(&holder.root) {
            return match mode {
                ReentrancyMode::LogicalCallContext => {
                    holder.entries.push(context.clone());
                    Admission::Reentered {
                        count: holder.entries.len(),
                    }
                }
                ReentrancyMode::Disallowed => Admission::Denied {
                    holder: holder.root.clone(),
                },
            };
        }

        let (grant, granted) = oneshot::channel();
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.waiters.push_back(Waiter {
            ticket,
            context: context.clone(),
            grant,
        });
        Admission::Queued {
            ticket,
            position: self.waiters.len(),
            granted,
        }
    }

    /// Removes one outstanding acquisition made with exactly `context`.
    /// Returns `None`, touching nothing, when there is no such acquisition.
    pub(crate) fn release(&mut self, context: &CallChain) -> Option<Released> {
        let holder = self.holder.as_mut()?;
        let idx = holder.entries.iter().rposition(|entry| entry == context)?;
        holder.entries.remove(idx);

        if !holder.entries.is_empty() {
            return Some(Released::Nested {
                count: holder.entries.len(),
            });
        }

        self.holder = None;
        Some(match self.hand_off() {
            Some(next) => Released::HandedOff { next },
            None => Released::Idle,
        })
    }

    /// Takes a queued waiter out of line. `false` means the ticket is no
    /// longer queued, i.e. ownership was already handed to it.
    pub(crate) fn withdraw(&mut self, ticket: u64) -> bool {
        match self.waiters.iter().position(|w| w.ticket == ticket) {
            Some(idx) => {
                self.waiters.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Grants the idle lock to the first waiter still listening.
    fn hand_off(&mut self) -> Option<CallChain> {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.grant.send(()).is_ok() {
                self.holder = Some(Holder::new(waiter.context.clone()));
                return Some(waiter.context);
            }
        }
        None
    }

    pub(crate) fn current_context(&self) -> Option<&CallChain> {
        self.holder.as_ref().map(|h| &h.root)
    }

    pub(crate) fn current_count(&self) -> usize {
        self.holder.as_ref().map_or(0, |h| h.entries.len())
    }

    pub(crate) fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}
