use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::CacheKey;

/// The outcome of a memoized computation, as far as it is known.
///
/// A computation starts out [`Pending`](Self::Pending) and settles exactly once, into either
/// [`Resolved`](Self::Resolved) or [`Rejected`](Self::Rejected). It never leaves a settled state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status<T, E> {
    /// The computation is still running.
    Pending,
    /// The computation resolved to a value.
    Resolved(T),
    /// The computation failed.
    Rejected(E),
}

impl<T, E> Status<T, E> {
    /// Returns `true` once the computation has either resolved or been rejected.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved(_) => "resolved",
            Self::Rejected(_) => "rejected",
        }
    }
}

/// A handle to an in-flight computation.
///
/// The handle is a future that completes once the computation has settled and its outcome has
/// been recorded in the cache, so reading the same key afterwards no longer suspends. All
/// handles for one computation are clones of each other, which can be checked with
/// [`same_computation`](Self::same_computation).
///
/// Awaiting the handle does not drive the computation, it runs in the background regardless.
#[derive(Clone)]
pub struct Suspend {
    key: CacheKey,
    settled: Shared<BoxFuture<'static, ()>>,
}

impl Suspend {
    pub(crate) fn new(key: CacheKey, settled: Shared<BoxFuture<'static, ()>>) -> Self {
        Self { key, settled }
    }

    /// The key of the computation this handle belongs to.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Returns `true` if the computation has settled already.
    pub fn is_settled(&self) -> bool {
        self.settled.peek().is_some()
    }

    /// Returns `true` if both handles refer to the very same computation.
    pub fn same_computation(&self, other: &Suspend) -> bool {
        self.settled.ptr_eq(&other.settled)
    }
}

impl Future for Suspend {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().settled.poll_unpin(cx)
    }
}

impl fmt::Debug for Suspend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspend")
            .field("key", &self.key)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// The cache's record of one computation.
#[derive(Debug)]
pub(crate) struct CacheEntry<T, E> {
    /// Distinguishes this entry from earlier ones that were stored under the same key.
    pub generation: u64,
    pub status: Status<T, E>,
    pub handle: Suspend,
}
