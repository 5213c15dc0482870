use std::sync::Arc;

use async_memo::{AsyncMemoCache, ReadError, suspend};
use async_memo_test::ManualOperation;
use futures::future::join_all;
use tokio::runtime::Handle;

use crate::{FetchUser, User, expect_suspend, user_cache};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_start_one_computation() {
    let cache = user_cache();
    let fetch_user = Arc::new(FetchUser::new("fetchUser"));

    let readers = (0..32).map(|_| {
        let cache = Arc::clone(&cache);
        let fetch_user = Arc::clone(&fetch_user);
        tokio::spawn(async move { suspend(|| cache.read(&fetch_user, (1,))).await })
    });
    let readers: Vec<_> = readers.collect();

    // wait until the first reader has started the computation
    while fetch_user.pending_count() == 0 {
        tokio::task::yield_now().await;
    }
    fetch_user.resolve(User { id: 1, name: "Ann" });

    for user in join_all(readers).await {
        assert_eq!(user.unwrap().unwrap(), User { id: 1, name: "Ann" });
    }
    assert_eq!(fetch_user.call_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_of_different_keys() {
    let cache = user_cache();
    let fetch_user = Arc::new(FetchUser::new("fetchUser"));

    let handles: Vec<_> = (0..8)
        .map(|id| expect_suspend(cache.read(&fetch_user, (id,))))
        .collect();
    assert_eq!(fetch_user.call_count(), 8);

    for id in 0..8 {
        fetch_user.resolve(User { id, name: "someone" });
    }
    join_all(handles).await;

    for id in 0..8 {
        assert_eq!(cache.read(&fetch_user, (id,)).unwrap().id, id);
    }
}

#[tokio::test]
async fn test_sentinel_like_values_are_resolved() {
    async_memo_test::setup();
    let cache = AsyncMemoCache::<Option<()>, ()>::new("sentinels", Handle::current());
    let op = ManualOperation::<(), Option<()>, ()>::new("nothing");

    let handle = expect_suspend(cache.read(&op, ()));
    op.resolve(None);
    handle.await;

    for _ in 0..3 {
        match cache.read(&op, ()) {
            Ok(value) => assert_eq!(value, None),
            Err(ReadError::Suspend(_)) => panic!("a resolved `None` must not suspend"),
            Err(ReadError::Failure(())) => panic!("a resolved `None` must not fail"),
        }
    }
    assert_eq!(op.call_count(), 1);
}
