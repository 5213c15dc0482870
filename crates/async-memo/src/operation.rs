use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::KeyArgs;

/// An async computation that can be memoized.
///
/// The operation is responsible for providing the actual computation, as well as a stable `id`
/// that together with the arguments forms the [`CacheKey`](crate::CacheKey).
pub trait Operation {
    /// Arguments the operation is invoked with.
    type Args: KeyArgs;
    /// The value the operation resolves to.
    type Output;
    /// The error the operation rejects with.
    type Error;

    /// A stable identifier of this operation.
    ///
    /// Two operations with the same id are considered to be the same computation.
    fn id(&self) -> &str;

    /// Starts a new computation for `args`.
    fn call(&self, args: Self::Args) -> BoxFuture<'static, Result<Self::Output, Self::Error>>;
}

impl<O: Operation + ?Sized> Operation for &O {
    type Args = O::Args;
    type Output = O::Output;
    type Error = O::Error;

    fn id(&self) -> &str {
        (**self).id()
    }

    fn call(&self, args: Self::Args) -> BoxFuture<'static, Result<Self::Output, Self::Error>> {
        (**self).call(args)
    }
}

impl<O: Operation + ?Sized> Operation for std::sync::Arc<O> {
    type Args = O::Args;
    type Output = O::Output;
    type Error = O::Error;

    fn id(&self) -> &str {
        (**self).id()
    }

    fn call(&self, args: Self::Args) -> BoxFuture<'static, Result<Self::Output, Self::Error>> {
        (**self).call(args)
    }
}

/// An [`Operation`] backed by a closure, see [`operation_fn`].
pub struct FnOperation<F, A> {
    id: Cow<'static, str>,
    f: F,
    _args: PhantomData<fn(A)>,
}

impl<F, A> std::fmt::Debug for FnOperation<F, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnOperation").field("id", &self.id).finish()
    }
}

/// Turns an async closure into an [`Operation`] identified by `id`.
///
/// ```
/// use async_memo::{operation_fn, Operation};
///
/// let double = operation_fn("double", |(n,): (u32,)| async move { Ok::<_, ()>(n * 2) });
/// assert_eq!(double.id(), "double");
/// ```
pub fn operation_fn<F, A, Fut, T, E>(id: impl Into<Cow<'static, str>>, f: F) -> FnOperation<F, A>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    A: KeyArgs,
{
    FnOperation {
        id: id.into(),
        f,
        _args: PhantomData,
    }
}

impl<F, A, Fut, T, E> Operation for FnOperation<F, A>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    A: KeyArgs,
{
    type Args = A;
    type Output = T;
    type Error = E;

    fn id(&self) -> &str {
        &self.id
    }

    fn call(&self, args: A) -> BoxFuture<'static, Result<T, E>> {
        (self.f)(args).boxed()
    }
}
