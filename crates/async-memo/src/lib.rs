//! Memoization primitives for async computations that are read synchronously.
//!
//! The central type is the [`AsyncMemoCache`]. It starts each keyed computation at most once
//! and lets callers read its outcome without awaiting: a read either returns the resolved value,
//! returns the failure, or hands out a [`Suspend`] handle that the caller awaits before reading
//! again.
//!
//! Around it sit the collaborators that make such a cache usable:
//!
//! - [`suspend`], [`View`] and [`Boundary`] drive reads to completion and map the
//!   loading/failure states to fallback content.
//! - [`DataLoader`] keeps a "loading / error / data" state for an injected [`Operation`] and
//!   re-fetches on demand.

#![warn(missing_docs)]

#[macro_use]
pub mod metrics;

mod cache;
mod entry;
mod error;
mod key;
mod loader;
mod operation;
mod suspense;

pub use cache::*;
pub use entry::*;
pub use error::*;
pub use key::*;
pub use loader::*;
pub use operation::*;
pub use suspense::*;
