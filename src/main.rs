//! # Actor Guard Demo
//!
//! Runs two call chains against one guarded account actor:
//!
//! 1. `transfer_1` takes the turn, then calls back into the actor through
//!    `transfer_1:audit`, which re-enters without waiting.
//! 2. `deposit_2` arrives meanwhile and queues until `transfer_1` is done.
//!
//! The account starts stale and is marked stale again by the transfer, so
//! both top-level turns begin with a refresh.

use actor_guard::tracing::setup_tracing;
use actor_guard::{
    CallChain, ConcurrencyGuard, DirtyFlag, GuardConfig, GuardedOwner, RefreshError, RefreshFn,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

struct Account {
    balance: AtomicI64,
    dirty: DirtyFlag,
}

impl GuardedOwner for Account {
    fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    fn mark_fresh(&self) {
        self.dirty.mark_fresh();
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = GuardConfig::from_env().unwrap_or_else(|e| {
        error!(error = %e, "Ignoring invalid guard configuration");
        GuardConfig::default()
    });
    let account = Arc::new(Account {
        balance: AtomicI64::new(0),
        dirty: DirtyFlag::new(true),
    });
    let guard = Arc::new(ConcurrencyGuard::new(account, config));
    info!(
        mode = ?guard.config().mode,
        acquire_timeout = ?guard.config().acquire_timeout,
        "Starting account actor"
    );

    // Stands in for reloading the balance from storage
    let reload = Arc::new(RefreshFn::new(|account: Arc<Account>| async move {
        let stored = account.balance.load(Ordering::SeqCst);
        info!(balance = stored, "Reloaded account state");
        Ok::<_, RefreshError>(())
    }));

    let cancel = CancellationToken::new();
    let transfer = CallChain::new("transfer_1").map_err(|e| e.to_string())?;
    let deposit = CallChain::new("deposit_2").map_err(|e| e.to_string())?;

    let first = {
        let guard = guard.clone();
        let reload = reload.clone();
        let cancel = cancel.clone();
        tokio::spawn(
            async move {
                guard
                    .invoke(&transfer, Some(&*reload), &cancel, |account| {
                        let guard = guard.clone();
                        let transfer = transfer.clone();
                        let cancel = cancel.clone();
                        async move {
                            account.balance.fetch_sub(40, Ordering::SeqCst);
                            info!("Debited 40, auditing");

                            let audit = transfer.child("audit")?;
                            guard
                                .invoke(&audit, None, &cancel, |account| async move {
                                    info!(
                                        balance = account.balance.load(Ordering::SeqCst),
                                        "Audit re-entered the actor"
                                    );
                                })
                                .await?;

                            // Someone else wrote the store behind our back
                            account.dirty.mark_dirty();
                            Ok::<_, actor_guard::GuardError>(())
                        }
                    })
                    .await?
            }
            .instrument(tracing::info_span!("transfer")),
        )
    };

    let second = {
        let guard = guard.clone();
        let reload = reload.clone();
        let cancel = cancel.clone();
        tokio::spawn(
            async move {
                guard
                    .invoke(&deposit, Some(&*reload), &cancel, |account| async move {
                        account.balance.fetch_add(100, Ordering::SeqCst);
                        info!("Deposited 100");
                    })
                    .await
            }
            .instrument(tracing::info_span!("deposit")),
        )
    };

    for (name, handle) in [("transfer", first), ("deposit", second)] {
        match handle.await {
            Ok(Ok(())) => info!(call = name, "Call completed"),
            Ok(Err(e)) => error!(call = name, error = %e, "Call failed"),
            Err(e) => return Err(format!("Task failed: {e:?}")),
        }
    }

    info!(
        balance = guard.owner().balance.load(Ordering::SeqCst),
        idle = guard.current_context().is_none(),
        "Demo completed"
    );
    Ok(())
}
