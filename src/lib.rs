//! # Actor Guard
//!
//! > **Turn-based concurrency for actors, with reentrant call chains.**
//!
//! An actor processes one invocation at a time. That rule deadlocks the moment
//! an actor calls something that calls back into it, so real actor runtimes
//! let a call chain that already holds the actor *re-enter* it. This crate is
//! that lock.
//!
//! ## 🚀 Core Concepts
//!
//! ### Call chains
//! Every invocation carries a [`CallChain`] such as `"order_7:reserve"`. The
//! dispatcher appends one segment per nested hop, so "the same logical caller"
//! is recognisable across any number of async hops, without thread-locals.
//!
//! ### The guard
//! [`ConcurrencyGuard`] holds one actor's turn. Calls from the chain holding
//! the turn re-enter immediately under [`ReentrancyMode::LogicalCallContext`];
//! everyone else waits in a FIFO queue. [`ReentrancyMode::Disallowed`] rejects
//! reentry outright.
//!
//! ### Dirty state
//! The owner exposes a stale flag through [`GuardedOwner`]. When the turn passes
//! to a new top-level caller while the owner is stale, that caller's
//! [`StateRefresh`] runs before it gets control.
//!
//! ## 👩‍💻 Architecture Notes
//!
//! ### 1. Short critical section
//! All bookkeeping lives behind one mutex that is never held across an
//! `.await`. Waiting callers suspend on their own `oneshot` channel.
//!
//! ### 2. Release by token
//! There is no lock handle. `release` names the chain that acquired, and the
//! guard tracks every outstanding acquisition, so a bogus release is reported
//! as [`GuardError::InvalidReleaseContext`] instead of corrupting the count.
//!
//! ### 3. Cancellation
//! Queued callers can be cancelled with a `CancellationToken`, by the
//! configured timeout, or by dropping the future. Holders cannot be cancelled;
//! only `release` ends a turn.
//!
//! ## 🗺️ Module Tour
//!
//! - [`context`] - call-chain tokens
//! - [`guard`] - the lock itself
//! - [`owner`] - what the guard needs from the actor
//! - [`config`] - mode and timeout, from code, serde or env
//! - [`mock`] - owner and refresh doubles for tests
//! - [`tracing`] - subscriber setup
//!
//! ## Running the Demo
//!
//! ```bash
//! RUST_LOG=debug cargo run
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod mock;
pub mod owner;
pub mod tracing;

// Re-export core types for convenience
pub use config::{ConfigError, GuardConfig, ReentrancyMode};
pub use context::CallChain;
pub use error::{CancelReason, GuardError, RefreshError};
pub use guard::ConcurrencyGuard;
pub use owner::{DirtyFlag, GuardedOwner, RefreshFn, StateRefresh};
