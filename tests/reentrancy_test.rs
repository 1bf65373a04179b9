use actor_guard::mock::MockOwner;
use actor_guard::{
    CallChain, CancelReason, ConcurrencyGuard, GuardConfig, GuardError, ReentrancyMode,
};
use std::time::Duration;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn chain(s: &str) -> CallChain {
    CallChain::new(s).unwrap()
}

fn guard(mode: ReentrancyMode) -> ConcurrencyGuard<MockOwner> {
    ConcurrencyGuard::with_mode(Arc::new(MockOwner::default()), mode)
}

#[tokio::test]
async fn test_acquire_then_release_returns_to_idle() {
    let guard = guard(ReentrancyMode::LogicalCallContext);
    let cancel = CancellationToken::new();
    let root = chain("root");

    guard.acquire(&root, None, &cancel).await.unwrap();
    assert_eq!(guard.current_context(), Some(root.clone()));
    assert_eq!(guard.current_count(), 1);

    guard.release(&root).unwrap();
    assert_eq!(guard.current_context(), None);
    assert_eq!(guard.current_count(), 0);
}

/// Ten child calls, each acquired and released in turn, never queue.
#[tokio::test]
async fn test_repeated_child_calls_reenter_immediately() {
    let guard = guard(ReentrancyMode::LogicalCallContext);
    let cancel = CancellationToken::new();
    let root = chain("root");
    let child = chain("root:child1");

    guard.acquire(&root, None, &cancel).await.unwrap();
    assert_eq!(guard.current_count(), 1);

    for _ in 0..10 {
        guard.acquire(&child, None, &cancel).await.unwrap();
        assert_eq!(guard.current_count(), 2);
        assert_eq!(guard.waiter_count(), 0);

        guard.release(&child).unwrap();
        assert_eq!(guard.current_count(), 1);
        assert_eq!(guard.current_context(), Some(root.clone()));
    }

    guard.release(&root).unwrap();
    assert_eq!(guard.current_count(), 0);
    assert_eq!(guard.current_context(), None);
}

#[tokio::test]
async fn test_nested_count_tracks_unreleased_acquisitions() {
    let guard = guard(ReentrancyMode::LogicalCallContext);
    let cancel = CancellationToken::new();
    let root = chain("root");

    // root, root:1, root:1:2, ... five levels deep
    let mut chains = vec![root.clone()];
    for depth in 1..5 {
        let next = chains[depth - 1].child(&depth.to_string()).unwrap();
        chains.push(next);
    }

    for (i, c) in chains.iter().enumerate() {
        guard.acquire(c, None, &cancel).await.unwrap();
        assert_eq!(guard.current_count(), i + 1);
        assert_eq!(guard.current_context(), Some(root.clone()));
    }

    // Same token twice is two acquisitions
    guard.acquire(&chains[2], None, &cancel).await.unwrap();
    assert_eq!(guard.current_count(), 6);

    for (released, c) in chains.iter().rev().enumerate() {
        guard.release(c).unwrap();
        assert_eq!(guard.current_count(), 6 - released - 1);
        assert_eq!(guard.current_context(), Some(root.clone()));
    }

    guard.release(&chains[2]).unwrap();
    assert_eq!(guard.current_context(), None);
}

#[tokio::test]
async fn test_release_of_unissued_token_fails_without_side_effects() {
    let guard = guard(ReentrancyMode::LogicalCallContext);
    let cancel = CancellationToken::new();
    let root = chain("root");

    // Nothing held at all
    let err = guard.release(&root).unwrap_err();
    assert!(matches!(err, GuardError::InvalidReleaseContext { .. }));

    guard.acquire(&root, None, &cancel).await.unwrap();

    for bogus in ["other", "root:never", "ro"] {
        let err = guard.release(&chain(bogus)).unwrap_err();
        match err {
            GuardError::InvalidReleaseContext { context } => assert_eq!(context.as_str(), bogus),
            other => panic!("Expected InvalidReleaseContext, got {other:?}"),
        }
        assert_eq!(guard.current_count(), 1);
        assert_eq!(guard.current_context(), Some(root.clone()));
    }

    // A token can't be released more often than it was acquired
    guard.release(&root).unwrap();
    assert!(guard.release(&root).is_err());
}

#[tokio::test]
async fn test_disallowed_denies_the_holder_itself() {
    let guard = guard(ReentrancyMode::Disallowed);
    let cancel = CancellationToken::new();
    let root = chain("root");

    guard.acquire(&root, None, &cancel).await.unwrap();

    let err = guard.acquire(&root, None, &cancel).await.unwrap_err();
    match err {
        GuardError::ReentrancyDenied { context, holder } => {
            assert_eq!(context, root);
            assert_eq!(holder, root);
        }
        other => panic!("Expected ReentrancyDenied, got {other:?}"),
    }
    assert_eq!(guard.current_count(), 1);

    let err = guard.acquire(&chain("root:child"), None, &cancel).await.unwrap_err();
    assert!(matches!(err, GuardError::ReentrancyDenied { .. }));
    assert_eq!(guard.current_count(), 1);
    assert_eq!(guard.waiter_count(), 0);

    guard.release(&root).unwrap();
    assert_eq!(guard.current_context(), None);
}

#[tokio::test]
async fn test_disallowed_still_grants_idle_guard() {
    let guard = guard(ReentrancyMode::Disallowed);
    let cancel = CancellationToken::new();

    for name in ["a", "b", "a"] {
        let c = chain(name);
        guard.acquire(&c, None, &cancel).await.unwrap();
        assert_eq!(guard.current_context(), Some(c.clone()));
        guard.release(&c).unwrap();
    }
    assert_eq!(guard.mode(), ReentrancyMode::Disallowed);
}

/// A fired token only matters to callers that would have to wait.
#[tokio::test]
async fn test_fired_token_still_gets_immediate_grants() {
    let guard = guard(ReentrancyMode::LogicalCallContext);
    let fired = CancellationToken::new();
    fired.cancel();
    let root = chain("root");
    let child = chain("root:child");

    guard.acquire(&root, None, &fired).await.unwrap();
    assert_eq!(guard.current_context(), Some(root.clone()));

    guard.acquire(&child, None, &fired).await.unwrap();
    assert_eq!(guard.current_count(), 2);

    guard.release(&child).unwrap();
    guard.release(&root).unwrap();
    assert_eq!(guard.current_context(), None);
}

#[tokio::test]
async fn test_fired_token_is_rejected_when_it_would_queue() {
    let guard = guard(ReentrancyMode::LogicalCallContext);
    let root = chain("root");
    guard.acquire(&root, None, &CancellationToken::new()).await.unwrap();

    let fired = CancellationToken::new();
    fired.cancel();
    let err = guard.acquire(&chain("other"), None, &fired).await.unwrap_err();
    assert!(matches!(err, GuardError::OperationCancelled(CancelReason::Caller)));
    assert!(err.is_cancelled());
    assert_eq!(guard.waiter_count(), 0);
    assert_eq!(guard.current_context(), Some(root.clone()));
    assert_eq!(guard.current_count(), 1);

    guard.release(&root).unwrap();
    assert_eq!(guard.current_context(), None);
}

#[tokio::test]
async fn test_invoke_nests_and_releases() {
    let guard = Arc::new(guard(ReentrancyMode::LogicalCallContext));
    let cancel = CancellationToken::new();
    let root = chain("root");

    let inner = guard.clone();
    let inner_cancel = cancel.clone();
    let depth = guard
        .invoke(&root, None, &cancel, |_owner| async move {
            let child = chain("root:audit");
            inner
                .invoke(&child, None, &inner_cancel, |_owner| async { inner.current_count() })
                .await
                .unwrap()
        })
        .await
        .unwrap();

    assert_eq!(depth, 2);
    assert_eq!(guard.current_context(), None);
}

#[test]
fn test_guard_exposes_its_owner_and_config() {
    let owner = Arc::new(MockOwner::dirty());
    let config = GuardConfig::new(ReentrancyMode::Disallowed)
        .with_acquire_timeout(Duration::from_millis(500));
    let guard = ConcurrencyGuard::new(owner.clone(), config.clone());

    assert!(Arc::ptr_eq(guard.owner(), &owner));
    assert_eq!(guard.config(), &config);
    assert_eq!(guard.mode(), ReentrancyMode::Disallowed);
}
