//! # Observability & Tracing
//!
//! The guard logs every transition with `tracing`, inside a span that carries
//! the call chain:
//!
//! - **debug**: grants, reentries, queueing, releases and hand-offs
//! - **info**: waiters abandoned by cancellation or timeout
//! - **warn**: denied reentry, releases without a matching acquisition, failed refreshes
//!
//! [`setup_tracing`] installs a compact subscriber filtered by `RUST_LOG`,
//! falling back to [`DEFAULT_DIRECTIVE`] when it is unset:
//!
//! ```bash
//! # Only the interesting events
//! RUST_LOG=info cargo run
//!
//! # Every lock transition
//! RUST_LOG=actor_guard=debug cargo run
//! ```
//!
//! With `RUST_LOG=debug` a hand-off reads:
//!
//! ```text
//! DEBUG acquire{context=billing}: Queued behind current holder ticket=0 position=1
//! DEBUG Released, handed off context=order_7 next=billing
//! DEBUG acquire{context=billing}: Granted after wait
//! DEBUG acquire{context=billing}: Refreshing dirty owner state
//! ```

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or empty.
pub const DEFAULT_DIRECTIVE: &str = "actor_guard=info";

/// Initializes the global subscriber. Call once, at program start.
pub fn setup_tracing() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(filter_from(directives.as_deref()))
        .with_target(false)
        .compact()
        .init();
}

fn filter_from(directives: Option<&str>) -> EnvFilter {
    match directives.map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => EnvFilter::new(d),
        None => EnvFilter::new(DEFAULT_DIRECTIVE),
    }
}
