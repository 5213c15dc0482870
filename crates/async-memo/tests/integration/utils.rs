use std::sync::Arc;

use async_memo::{AsyncMemoCache, ReadError, Suspend};
use async_memo_test::ManualOperation;
use tokio::runtime::Handle;

/// The user record the scenarios below are fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u32,
    pub name: &'static str,
}

pub type FetchUser = ManualOperation<(u32,), User, String>;

pub fn user_cache() -> Arc<AsyncMemoCache<User, String>> {
    async_memo_test::setup();
    Arc::new(AsyncMemoCache::new("users", Handle::current()))
}

/// Unwraps the suspension handle of a read that is expected to be pending.
#[track_caller]
pub fn expect_suspend<T: std::fmt::Debug, E: std::fmt::Debug>(
    result: Result<T, ReadError<E>>,
) -> Suspend {
    match result {
        Err(ReadError::Suspend(handle)) => handle,
        other => panic!("expected the read to suspend, got {other:?}"),
    }
}
