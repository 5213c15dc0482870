use async_memo::{AsyncMemoCache, ReadError, Status, suspend};
use async_memo_test::ManualOperation;
use tokio::runtime::Handle;

use crate::{FetchUser, User, expect_suspend, user_cache};

#[tokio::test]
async fn test_fetch_user_scenario() {
    let cache = user_cache();
    let fetch_user = FetchUser::new("fetchUser");

    let handle = expect_suspend(cache.read(&fetch_user, (1,)));
    assert_eq!(fetch_user.call_keys(), ["fetchUser1"]);

    fetch_user.resolve(User { id: 1, name: "Ann" });
    handle.await;

    let user = cache.read(&fetch_user, (1,)).unwrap();
    assert_eq!(user, User { id: 1, name: "Ann" });
    assert_eq!(fetch_user.call_count(), 1);
}

#[tokio::test]
async fn test_key_determinism() {
    let cache = user_cache();
    let op = FetchUser::new("op");

    let first = expect_suspend(cache.read(&op, (1,)));
    let again = expect_suspend(cache.read(&op, (1,)));
    let other = expect_suspend(cache.read(&op, (2,)));

    assert!(first.same_computation(&again));
    assert!(!first.same_computation(&other));
    assert_eq!(op.call_keys(), ["op1", "op2"]);
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn test_mixed_arguments_key_determinism() {
    async_memo_test::setup();
    let cache = AsyncMemoCache::<u32, ()>::new("mixed", Handle::current());
    let op = ManualOperation::<(&str, u32), u32, ()>::new("op");

    let first = expect_suspend(cache.read(&op, ("a", 1)));
    let again = expect_suspend(cache.read(&op, ("a", 1)));
    let other = expect_suspend(cache.read(&op, ("a", 2)));

    assert!(first.same_computation(&again));
    assert!(!first.same_computation(&other));
    assert_eq!(op.call_keys(), ["opa,1", "opa,2"]);
}

#[tokio::test]
async fn test_terminal_stability() {
    let cache = user_cache();
    let fetch_user = FetchUser::new("fetchUser");

    let handle = expect_suspend(cache.read(&fetch_user, (7,)));
    fetch_user.resolve(User { id: 7, name: "Gus" });
    handle.await;

    for _ in 0..10 {
        assert_eq!(cache.read(&fetch_user, (7,)).unwrap().name, "Gus");
    }
    assert_eq!(fetch_user.call_count(), 1);
    assert_eq!(fetch_user.pending_count(), 0);
}

#[tokio::test]
async fn test_suspend_then_reject() {
    let cache = user_cache();
    let fetch_user = FetchUser::new("fetchUser");

    let handle = expect_suspend(cache.read(&fetch_user, (3,)));
    assert_eq!(cache.status(&fetch_user, &(3,)), Some(Status::Pending));

    fetch_user.reject("user 3 is gone".into());
    handle.await;

    match cache.read(&fetch_user, (3,)) {
        Err(ReadError::Failure(err)) => assert_eq!(err, "user 3 is gone"),
        other => panic!("expected a failure, got {other:?}"),
    }
    assert_eq!(
        cache.status(&fetch_user, &(3,)),
        Some(Status::Rejected("user 3 is gone".into()))
    );
    assert_eq!(fetch_user.call_count(), 1);
}

#[tokio::test]
async fn test_failure_is_not_retried() {
    let cache = user_cache();
    let fetch_user = FetchUser::new("fetchUser");

    let read = suspend(|| cache.read(&fetch_user, (4,)));
    tokio::pin!(read);
    tokio::select! {
        _ = &mut read => unreachable!("nothing was settled yet"),
        _ = tokio::task::yield_now() => {}
    }
    fetch_user.reject("offline".into());

    assert_eq!(read.await.unwrap_err(), "offline");
    assert_eq!(
        suspend(|| cache.read(&fetch_user, (4,))).await.unwrap_err(),
        "offline"
    );
    assert_eq!(fetch_user.call_count(), 1);
}

#[tokio::test]
async fn test_operations_with_same_arguments_do_not_share_entries() {
    let cache = user_cache();
    let fetch_user = FetchUser::new("fetchUser");
    let fetch_admin = FetchUser::new("fetchAdmin");

    let user = expect_suspend(cache.read(&fetch_user, (1,)));
    let admin = expect_suspend(cache.read(&fetch_admin, (1,)));
    assert!(!user.same_computation(&admin));

    fetch_admin.resolve(User { id: 1, name: "Root" });
    admin.await;
    assert!(cache.read(&fetch_user, (1,)).is_err());
    assert_eq!(cache.read(&fetch_admin, (1,)).unwrap().name, "Root");
}
