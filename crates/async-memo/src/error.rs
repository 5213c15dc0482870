use thiserror::Error;

use crate::Suspend;

/// The reasons why [`AsyncMemoCache::read`](crate::AsyncMemoCache::read) did not return a value.
#[derive(Debug, Error)]
pub enum ReadError<E> {
    /// The computation has not settled yet.
    ///
    /// This is not a failure. The caller is expected to await the attached handle and then read
    /// again from scratch.
    #[error("computation `{}` has not settled yet", .0.key())]
    Suspend(Suspend),
    /// The computation was rejected with the attached error.
    ///
    /// Rejections are memoized just like values, reading again yields the same error.
    #[error("computation failed: {0}")]
    Failure(E),
}

impl<E> ReadError<E> {
    /// Returns the suspension handle, if the computation is still running.
    pub fn suspended(&self) -> Option<&Suspend> {
        match self {
            Self::Suspend(handle) => Some(handle),
            Self::Failure(_) => None,
        }
    }

    /// Returns the error the computation failed with.
    pub fn failure(&self) -> Option<&E> {
        match self {
            Self::Suspend(_) => None,
            Self::Failure(err) => Some(err),
        }
    }

    /// Maps the error of a failed computation.
    pub fn map_failure<F, U>(self, f: F) -> ReadError<U>
    where
        F: FnOnce(E) -> U,
    {
        match self {
            Self::Suspend(handle) => ReadError::Suspend(handle),
            Self::Failure(err) => ReadError::Failure(f(err)),
        }
    }
}
