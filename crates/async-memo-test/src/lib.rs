//! Helpers for testing memoized computations.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - A [`ManualOperation`] never settles on its own. Every call waits until the test settles it
//!    with [`resolve`](ManualOperation::resolve) or [`reject`](ManualOperation::reject), which
//!    makes the pending phase of a computation observable for as long as the test needs.

use std::collections::VecDeque;
use std::future;
use std::sync::{Mutex, PoisonError};

use async_memo::{CacheKey, KeyArgs, Operation};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `async_memo` crates and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("async_memo=trace,memo_demo=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

struct Calls<T, E> {
    keys: Vec<CacheKey>,
    pending: VecDeque<oneshot::Sender<Result<T, E>>>,
}

/// An [`Operation`] that is settled by hand.
///
/// Calls are settled in the order they were made. Dropping the operation leaves all calls that
/// are still pending unsettled forever.
pub struct ManualOperation<A, T, E> {
    id: &'static str,
    calls: Mutex<Calls<T, E>>,
    _args: std::marker::PhantomData<fn(A)>,
}

impl<A, T, E> ManualOperation<A, T, E> {
    /// Creates an operation identified by `id`.
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            calls: Mutex::new(Calls {
                keys: Vec::new(),
                pending: VecDeque::new(),
            }),
            _args: std::marker::PhantomData,
        }
    }

    /// The number of times this operation was called.
    pub fn call_count(&self) -> usize {
        self.lock().keys.len()
    }

    /// The keys of all calls made so far, in order.
    pub fn call_keys(&self) -> Vec<String> {
        self.lock().keys.iter().map(|k| k.to_string()).collect()
    }

    /// The number of calls that have not been settled yet.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Resolves the oldest pending call with `value`.
    ///
    /// # Panics
    ///
    /// Panics if there is no pending call.
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value))
    }

    /// Rejects the oldest pending call with `error`.
    ///
    /// # Panics
    ///
    /// Panics if there is no pending call.
    pub fn reject(&self, error: E) {
        self.settle(Err(error))
    }

    fn settle(&self, outcome: Result<T, E>) {
        let sender = self
            .lock()
            .pending
            .pop_front()
            .expect("no pending call to settle");
        // the computation might have been dropped along with its runtime
        let _ = sender.send(outcome);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Calls<T, E>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A, T, E> Operation for ManualOperation<A, T, E>
where
    A: KeyArgs,
    T: Send + 'static,
    E: Send + 'static,
{
    type Args = A;
    type Output = T;
    type Error = E;

    fn id(&self) -> &str {
        self.id
    }

    fn call(&self, args: A) -> BoxFuture<'static, Result<T, E>> {
        let (sender, receiver) = oneshot::channel();
        let mut calls = self.lock();
        calls.keys.push(CacheKey::for_operation(self.id, &args));
        calls.pending.push_back(sender);

        async move {
            match receiver.await {
                Ok(outcome) => outcome,
                Err(_) => future::pending().await,
            }
        }
        .boxed()
    }
}
