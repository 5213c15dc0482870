use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::Operation;

/// The state of a [`DataLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadState<T, E> {
    /// The data of the last successful fetch.
    ///
    /// This is kept around while reloading and when a later fetch fails.
    pub data: Option<T>,
    /// Whether a fetch is currently running.
    pub is_loading: bool,
    /// The error of the last fetch, if it failed.
    pub error: Option<E>,
}

impl<T, E> Default for LoadState<T, E> {
    fn default() -> Self {
        Self {
            data: None,
            is_loading: true,
            error: None,
        }
    }
}

/// Loads data with an injected [`Operation`] and tracks its loading state.
///
/// Unlike the [`AsyncMemoCache`](crate::AsyncMemoCache), nothing is memoized here: every
/// [`update`](Self::update) invokes the operation again. Updates are not sequenced, when several
/// of them overlap the one that settles last determines the state.
pub struct DataLoader<O: Operation> {
    operation: O,
    args: O::Args,
    state: watch::Sender<LoadState<O::Output, O::Error>>,
}

impl<O: Operation> std::fmt::Debug for DataLoader<O>
where
    O::Output: std::fmt::Debug,
    O::Error: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("operation", &self.operation.id())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl<O> DataLoader<O>
where
    O: Operation + Send + Sync + 'static,
    O::Args: Clone + Send + Sync,
    O::Output: Clone + Send + Sync,
    O::Error: Clone + Send + Sync,
{
    /// Creates a loader that fetches with `args` unless told otherwise.
    ///
    /// The loader starts out in the loading state, but does not fetch anything until
    /// [`update`](Self::update) is called. See [`mount`](Self::mount) for a loader that fetches
    /// right away.
    pub fn new(operation: O, args: O::Args) -> Self {
        let (state, _) = watch::channel(LoadState::default());
        Self {
            operation,
            args,
            state,
        }
    }

    /// Creates a loader and immediately starts the initial fetch on `runtime`.
    pub fn mount(operation: O, args: O::Args, runtime: &Handle) -> Arc<Self> {
        let loader = Arc::new(Self::new(operation, args));
        let mounted = Arc::clone(&loader);
        runtime.spawn(async move { mounted.update(None).await });
        loader
    }

    /// Fetches the data again, with `args` or the arguments the loader was created with.
    ///
    /// The loader switches to loading and forgets the previous error right away. Once the fetch
    /// settles, either the data or the error is updated.
    pub async fn update(&self, args: Option<O::Args>) {
        let args = args.unwrap_or_else(|| self.args.clone());
        tracing::debug!(operation = self.operation.id(), "Loading data");

        self.state.send_modify(|state| {
            state.is_loading = true;
            state.error = None;
        });

        let result = self.operation.call(args).await;

        self.state.send_modify(|state| {
            match result {
                Ok(data) => state.data = Some(data),
                Err(err) => state.error = Some(err),
            }
            state.is_loading = false;
        });
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> LoadState<O::Output, O::Error> {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<LoadState<O::Output, O::Error>> {
        self.state.subscribe()
    }

    /// Waits until no fetch is running and returns the state at that point.
    pub async fn settled(&self) -> LoadState<O::Output, O::Error> {
        let mut state = self.subscribe();
        match state.wait_for(|state| !state.is_loading).await {
            Ok(state) => state.clone(),
            // the sender lives in `self`, so this cannot happen
            Err(_) => self.state(),
        }
    }
}
