use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::entry::CacheEntry;
use crate::{CacheKey, Operation, ReadError, Status, Suspend};

type Entries<T, E> = Mutex<HashMap<CacheKey, CacheEntry<T, E>>>;

/// An in-memory cache of async computations with a synchronous read.
///
/// Every computation is identified by a [`CacheKey`] derived from the [`Operation`] id and its
/// arguments. The first [`read`](Self::read) of a key starts the computation in the background
/// and suspends. Every read afterwards observes the same computation: it suspends while the
/// computation is running, and returns the very same value or error once it has settled.
///
/// Entries are never evicted. They live until the cache is dropped or [`clear`](Self::clear)ed.
///
/// Computations run on the tokio runtime the cache was created with. They are never cancelled,
/// even if nobody reads their key anymore.
pub struct AsyncMemoCache<T, E> {
    name: Arc<str>,
    runtime: Handle,
    entries: Arc<Entries<T, E>>,
    generations: AtomicU64,
}

impl<T, E> fmt::Debug for AsyncMemoCache<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("AsyncMemoCache");
        debug.field("name", &self.name);
        match self.entries.try_lock() {
            Ok(entries) => debug.field("entries", &entries.len()),
            Err(TryLockError::Poisoned(entries)) => {
                debug.field("entries", &entries.into_inner().len())
            }
            Err(TryLockError::WouldBlock) => debug.field("entries", &format_args!("<locked>")),
        };
        debug.finish()
    }
}

/// A key that has been reserved by a read, but whose computation has not been started yet.
struct Reservation {
    key: CacheKey,
    generation: u64,
    settled: oneshot::Sender<()>,
    handle: Suspend,
}

impl<T, E> AsyncMemoCache<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates a new cache that spawns its computations onto `runtime`.
    ///
    /// The `name` is used to tag metrics and logs.
    pub fn new(name: impl Into<Arc<str>>, runtime: Handle) -> Self {
        Self {
            name: name.into(),
            runtime,
            entries: Default::default(),
            generations: AtomicU64::new(0),
        }
    }

    /// The name this cache was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads the outcome of calling `operation` with `args`.
    ///
    /// - If this is the first read for the key, the computation is started and the read
    ///   suspends.
    /// - While the computation is running, the read returns [`ReadError::Suspend`] with a handle
    ///   that completes once the computation has settled.
    /// - Once resolved, the value is returned.
    /// - Once rejected, [`ReadError::Failure`] is returned with the error.
    ///
    /// The key is reserved under the cache's lock, so concurrent readers of a key never start
    /// more than one computation. The operation itself is called after the lock is released and
    /// may use this cache.
    ///
    /// # Panics
    ///
    /// If [`Operation::call`] panics, the reservation is dropped and the panic is resumed.
    pub fn read<O>(&self, operation: &O, args: O::Args) -> Result<T, ReadError<E>>
    where
        O: Operation<Output = T, Error = E> + ?Sized,
    {
        let key = CacheKey::for_operation(operation.id(), &args);

        let reservation = {
            let mut entries = self.lock();
            let entries_count = entries.len();

            match entries.entry(key) {
                Entry::Occupied(entry) => {
                    let entry = entry.get();
                    metric!(
                        counter("memo.read") += 1,
                        "cache" => &self.name,
                        "status" => entry.status.label(),
                    );
                    return match &entry.status {
                        Status::Pending => Err(ReadError::Suspend(entry.handle.clone())),
                        Status::Resolved(value) => Ok(value.clone()),
                        Status::Rejected(err) => Err(ReadError::Failure(err.clone())),
                    };
                }
                Entry::Vacant(entry) => {
                    let (reservation, pending) = self.reserve(entry.key().clone());
                    entry.insert(pending);
                    metric!(
                        counter("memo.read") += 1,
                        "cache" => &self.name,
                        "status" => "pending",
                    );
                    metric!(
                        gauge("memo.entries") = entries_count as u64 + 1,
                        "cache" => &self.name,
                    );
                    reservation
                }
            }
        };

        let handle = self.start(operation, args, reservation);
        Err(ReadError::Suspend(handle))
    }

    /// Returns the current status for calling `operation` with `args`, without starting it.
    pub fn status<O>(&self, operation: &O, args: &O::Args) -> Option<Status<T, E>>
    where
        O: Operation<Output = T, Error = E> + ?Sized,
    {
        let key = CacheKey::for_operation(operation.id(), args);
        self.lock().get(&key).map(|entry| entry.status.clone())
    }

    /// The number of computations this cache knows about, settled or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no computation has been started yet.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forgets all entries.
    ///
    /// Computations that are still running keep running, but their outcome is discarded. Reads
    /// after this start over with fresh computations.
    pub fn clear(&self) {
        let mut entries = self.lock();
        tracing::debug!(cache = %self.name, entries = entries.len(), "Clearing memo cache");
        entries.clear();
        metric!(gauge("memo.entries") = 0u64, "cache" => &self.name);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry<T, E>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the pending entry for `key`.
    ///
    /// The entry's handle completes once the returned reservation's sender fires or is dropped.
    fn reserve(&self, key: CacheKey) -> (Reservation, CacheEntry<T, E>) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        let settled = receiver.map(|_| ()).boxed().shared();

        let entry = CacheEntry {
            generation,
            status: Status::Pending,
            handle: Suspend::new(key.clone(), settled),
        };
        let reservation = Reservation {
            key,
            generation,
            settled: sender,
            handle: entry.handle.clone(),
        };
        (reservation, entry)
    }

    /// Calls `operation` for a reserved key and spawns the resulting computation.
    ///
    /// Must not be called with the entries lock held.
    fn start<O>(&self, operation: &O, args: O::Args, reservation: Reservation) -> Suspend
    where
        O: Operation<Output = T, Error = E> + ?Sized,
    {
        let Reservation {
            key,
            generation,
            settled,
            handle,
        } = reservation;
        let name = Arc::clone(&self.name);

        metric!(counter("memo.computation") += 1, "cache" => &name);
        tracing::trace!(cache = %name, key = %key, "Starting computation");

        let computation = match panic::catch_unwind(AssertUnwindSafe(|| operation.call(args))) {
            Ok(computation) => computation,
            Err(payload) => {
                tracing::error!(cache = %name, key = %key, "Starting computation panicked");
                forget(&self.entries, &key, generation);
                panic::resume_unwind(payload);
            }
        };

        let entries = Arc::downgrade(&self.entries);
        let task_handle = handle.clone();

        self.runtime.spawn(async move {
            let start = Instant::now();
            let outcome = AssertUnwindSafe(computation).catch_unwind().await;
            metric!(
                timer("memo.computation.duration") = start.elapsed(),
                "cache" => &name,
            );
            settle(&entries, &name, &key, generation, outcome);
            // nobody might be waiting anymore
            let _ = settled.send(());
            // completes the shared handle, so that `Suspend::is_settled` sees it
            task_handle.await;
        });

        handle
    }
}

/// Removes the entry for `key` if it still belongs to `generation`.
fn forget<T, E>(entries: &Entries<T, E>, key: &CacheKey, generation: u64) {
    let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
    if entries.get(key).is_some_and(|entry| entry.generation == generation) {
        entries.remove(key);
    }
}

/// Records the `outcome` of a computation in its entry.
///
/// Nothing is written if the entry has been cleared or replaced in the meantime. A computation
/// that panicked removes its entry, so that the key can be computed again.
fn settle<T, E>(
    entries: &Weak<Entries<T, E>>,
    name: &str,
    key: &CacheKey,
    generation: u64,
    outcome: std::thread::Result<Result<T, E>>,
) {
    let Some(entries) = entries.upgrade() else {
        return;
    };
    let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
    match entries.get(key) {
        Some(entry) if entry.generation == generation => {}
        Some(_) => {
            tracing::trace!(cache = name, key = %key, "Discarding outcome of replaced computation");
            return;
        }
        None => {
            tracing::trace!(cache = name, key = %key, "Discarding outcome of cleared computation");
            return;
        }
    }

    let status = match outcome {
        Ok(Ok(value)) => Status::Resolved(value),
        Ok(Err(err)) => Status::Rejected(err),
        Err(_) => {
            tracing::error!(cache = name, key = %key, "Computation panicked");
            entries.remove(key);
            return;
        }
    };
    tracing::trace!(
        cache = name,
        key = %key,
        status = status.label(),
        "Computation settled",
    );
    if let Some(entry) = entries.get_mut(key) {
        entry.status = status;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::time::{self, Duration};

    use super::*;
    use crate::{operation_fn, suspend};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test]
    async fn test_resolves_after_suspend() {
        let cache = AsyncMemoCache::new("test", Handle::current());
        let calls = counter();
        let op = {
            let calls = Arc::clone(&calls);
            operation_fn("double", move |(n,): (u32,)| {
                calls.fetch_add(1, Ordering::Relaxed);
                async move { Ok::<_, String>(n * 2) }
            })
        };

        let handle = match cache.read(&op, (21,)) {
            Err(ReadError::Suspend(handle)) => handle,
            other => panic!("expected suspension, got {other:?}"),
        };
        assert_eq!(handle.key().as_str(), "double21");
        handle.await;

        assert_eq!(cache.read(&op, (21,)).unwrap(), 42);
        assert_eq!(cache.read(&op, (21,)).unwrap(), 42);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_memoized() {
        let cache = AsyncMemoCache::<u32, String>::new("test", Handle::current());
        let calls = counter();
        let op = {
            let calls = Arc::clone(&calls);
            operation_fn("fail", move |()| {
                calls.fetch_add(1, Ordering::Relaxed);
                async { Err("boom".to_owned()) }
            })
        };

        cache.read(&op, ()).unwrap_err().suspended().unwrap().clone().await;

        for _ in 0..3 {
            let err = cache.read(&op, ()).unwrap_err();
            assert_eq!(err.failure().map(String::as_str), Some("boom"));
        }
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unit_value_is_resolved() {
        let cache = AsyncMemoCache::<(), ()>::new("test", Handle::current());
        let op = operation_fn("noop", |()| async { Ok(()) });

        assert!(cache.read(&op, ()).is_err());
        assert_eq!(cache.status(&op, &()), Some(Status::Pending));

        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(cache.status(&op, &()), Some(Status::Resolved(())));
        assert!(matches!(cache.read(&op, ()), Ok(())));
    }

    #[tokio::test]
    async fn test_none_value_is_resolved() {
        let cache = AsyncMemoCache::<Option<u32>, ()>::new("test", Handle::current());
        let op = operation_fn("nothing", |()| async { Ok(None) });

        cache.read(&op, ()).unwrap_err().suspended().unwrap().clone().await;
        assert_eq!(cache.read(&op, ()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_status_does_not_start() {
        let cache = AsyncMemoCache::<u32, ()>::new("test", Handle::current());
        let op = operation_fn("lazy", |()| async { Ok(1) });

        assert_eq!(cache.status(&op, &()), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_handles_share_computation() {
        time::pause();
        let cache = AsyncMemoCache::<u32, ()>::new("test", Handle::current());
        let op = operation_fn("slow", |()| async {
            time::sleep(Duration::from_secs(1)).await;
            Ok(1)
        });

        let first = cache.read(&op, ()).unwrap_err().suspended().cloned().unwrap();
        let second = cache.read(&op, ()).unwrap_err().suspended().cloned().unwrap();
        assert!(first.same_computation(&second));
        assert!(!first.is_settled());

        second.await;
        assert!(first.is_settled());
        assert_eq!(cache.read(&op, ()).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_discards_running_computation() {
        time::pause();
        let cache = AsyncMemoCache::<u32, ()>::new("test", Handle::current());
        let calls = counter();
        let op = {
            let calls = Arc::clone(&calls);
            operation_fn("slow", move |()| {
                let call = calls.fetch_add(1, Ordering::Relaxed) as u32;
                async move {
                    // the first call takes longer than the second one
                    time::sleep(Duration::from_secs(10 - call as u64 * 5)).await;
                    Ok(call)
                }
            })
        };

        let stale = cache.read(&op, ()).unwrap_err().suspended().cloned().unwrap();
        cache.clear();
        assert_eq!(cache.len(), 0);

        let fresh = cache.read(&op, ()).unwrap_err().suspended().cloned().unwrap();
        assert!(!stale.same_computation(&fresh));

        fresh.await;
        assert_eq!(cache.read(&op, ()).unwrap(), 1);

        stale.await;
        assert_eq!(cache.read(&op, ()).unwrap(), 1);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_panicking_computation_can_be_retried() {
        let cache = AsyncMemoCache::<u32, ()>::new("test", Handle::current());
        let calls = counter();
        let op = {
            let calls = Arc::clone(&calls);
            operation_fn("flaky", move |()| {
                let call = calls.fetch_add(1, Ordering::Relaxed);
                async move {
                    if call == 0 {
                        panic!("first call panics");
                    }
                    Ok(7)
                }
            })
        };

        let handle = cache.read(&op, ()).unwrap_err().suspended().cloned().unwrap();
        handle.await;
        assert!(cache.is_empty());

        cache.read(&op, ()).unwrap_err().suspended().cloned().unwrap().await;
        assert_eq!(cache.read(&op, ()).unwrap(), 7);
    }

    #[tokio::test]
    async fn test_operation_can_use_cache_while_starting() {
        let cache = Arc::new(AsyncMemoCache::<usize, ()>::new("test", Handle::current()));
        let outer = {
            let cache = Arc::clone(&cache);
            operation_fn("outer", move |()| {
                let inner = operation_fn("inner", |()| async { Ok(0) });
                assert_eq!(cache.status(&inner, &()), None);
                assert!(cache.read(&inner, ()).is_err());
                let entries = cache.len();
                async move { Ok(entries) }
            })
        };

        let entries = suspend(|| cache.read(&outer, ())).await.unwrap();
        assert_eq!(entries, 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_call_releases_key() {
        let cache = AsyncMemoCache::<u32, ()>::new("test", Handle::current());
        let calls = counter();
        let op = {
            let calls = Arc::clone(&calls);
            operation_fn("eager", move |()| {
                if calls.fetch_add(1, Ordering::Relaxed) == 0 {
                    panic!("first call panics before returning a future");
                }
                async { Ok(3) }
            })
        };

        let read = std::panic::catch_unwind(AssertUnwindSafe(|| cache.read(&op, ())));
        assert!(read.is_err());
        assert!(cache.is_empty());

        assert_eq!(suspend(|| cache.read(&op, ())).await, Ok(3));
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_handle_does_not_drive_computation() {
        time::pause();
        let cache = AsyncMemoCache::<u32, ()>::new("test", Handle::current());
        let op = operation_fn("slow", |()| async {
            time::sleep(Duration::from_secs(1)).await;
            Ok(1)
        });

        let handle = cache.read(&op, ()).unwrap_err().suspended().cloned().unwrap();
        time::sleep(Duration::from_secs(2)).await;

        // settled in the background, without anyone awaiting the handle
        assert!(handle.is_settled());
        assert_eq!(cache.read(&op, ()).unwrap(), 1);
    }

    #[test]
    fn test_debug_while_locked() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let cache = AsyncMemoCache::<u32, ()>::new("test", runtime.handle().clone());

        assert_eq!(
            format!("{cache:?}"),
            r#"AsyncMemoCache { name: "test", entries: 0 }"#
        );
        let _entries = cache.lock();
        assert_eq!(
            format!("{cache:?}"),
            r#"AsyncMemoCache { name: "test", entries: <locked> }"#
        );
    }
}
