use std::borrow::Cow;

use crate::{ReadError, Suspend};

/// Drives a synchronous `read` to completion.
///
/// The `read` is retried from scratch every time it suspends, after the handle it suspended on
/// has settled. A failure ends the loop and is returned as is.
///
/// ```
/// # async fn demo(cache: &async_memo::AsyncMemoCache<u32, String>) -> Result<(), String> {
/// use async_memo::{operation_fn, suspend};
///
/// let answer = operation_fn("answer", |()| async { Ok(42) });
/// let value = suspend(|| cache.read(&answer, ())).await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub async fn suspend<T, E, F>(mut read: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, ReadError<E>>,
{
    loop {
        match read() {
            Ok(value) => return Ok(value),
            Err(ReadError::Suspend(handle)) => {
                tracing::trace!(key = %handle.key(), "Suspended");
                handle.await;
            }
            Err(ReadError::Failure(err)) => return Err(err),
        }
    }
}

/// What a single read has to show.
#[derive(Debug)]
pub enum View<T, E> {
    /// The data is still loading.
    Loading(Suspend),
    /// Loading the data failed.
    Failed(E),
    /// The data is available.
    Ready(T),
}

impl<T, E> View<T, E> {
    /// Returns the handle to wait on before reading again, if still loading.
    pub fn pending(&self) -> Option<&Suspend> {
        match self {
            Self::Loading(handle) => Some(handle),
            _ => None,
        }
    }
}

impl<T, E> From<Result<T, ReadError<E>>> for View<T, E> {
    fn from(result: Result<T, ReadError<E>>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(ReadError::Suspend(handle)) => Self::Loading(handle),
            Err(ReadError::Failure(err)) => Self::Failed(err),
        }
    }
}

/// Fallback content for reads that are not ready.
///
/// This combines an error boundary with a suspense fallback: while the data is loading, the
/// `loading` content is shown; if loading failed, the `error` content replaces it. The error
/// itself is logged but never shown.
#[derive(Debug, Clone)]
pub struct Boundary {
    loading: Cow<'static, str>,
    error: Cow<'static, str>,
}

impl Boundary {
    /// Creates a boundary with the given fallbacks.
    pub fn new(loading: impl Into<Cow<'static, str>>, error: impl Into<Cow<'static, str>>) -> Self {
        Self {
            loading: loading.into(),
            error: error.into(),
        }
    }

    /// Renders `view`, using `render` for data that is ready.
    pub fn render<T, E, F>(&self, view: &View<T, E>, render: F) -> String
    where
        E: std::fmt::Display,
        F: FnOnce(&T) -> String,
    {
        match view {
            View::Loading(_) => self.loading.to_string(),
            View::Failed(err) => {
                tracing::debug!(error = %err, "Rendering error fallback");
                self.error.to_string()
            }
            View::Ready(value) => render(value),
        }
    }
}

impl Default for Boundary {
    fn default() -> Self {
        Self::new("loading...", "error!")
    }
}
