//! Fail-fast, order-preserving aggregation of concurrently running computations.
//!
//! This library lets a thread hand out many independent computations, running on whatever threads
//! they like, and get their results back as a single ordered list, or the first error any of them
//! reports.
//!
//! # Overview
//!
//! The building block is [`Promise`]: a one-shot slot that some thread settles with either a value
//! or an error. The connected [`PromiseHandle`] retrieves that outcome, by blocking
//! ([`PromiseHandle::block`]), by `await`ing ([`PromiseHandle::wait`]), or by registering observers
//! that run as soon as it is available ([`PromiseHandle::observe`]).
//!
//! [`all`] combines a collection of [`PromiseHandle`]s (and plain values, see [`Child`]) into one
//! [`PromiseHandle`] that:
//!
//! - is fulfilled with a [`Vec`] of every value **in input order**, no matter in which order the
//!   computations finish;
//! - is rejected with the **first** error any computation reports, without waiting for the rest;
//! - never blocks, spawns, or cancels anything itself. Computations that finish after the
//!   aggregate has been settled are left alone, and their outcomes are dropped.
//!
//! [`AggregateBuilder`] configures names for logging and the [`Strategy`] used to store values.
//!
//! [`Pool`] is an owned set of threads that run jobs and report their results through
//! [`Promise`]s, which makes it a convenient source of computations to aggregate. Like every
//! thread in this library, its threads are joined when the [`Pool`] is dropped, and panics are
//! forwarded to the owner.
//!
//! # Usage
//!
//! Run jobs on a [`Pool`] and collect their results in order:
//!
//! ```
//! use std::{thread, time::Duration};
//! use fanin::{all, Pool};
//!
//! let mut pool = Pool::builder().name("fetch").spawn(3).unwrap();
//!
//! let handles: Vec<_> = [30, 10, 20]
//!     .into_iter()
//!     .map(|ms| {
//!         pool.submit(move || {
//!             thread::sleep(Duration::from_millis(ms));
//!             Ok::<_, String>(ms)
//!         })
//!     })
//!     .collect();
//!
//! // `block` only fails if a job's promise was dropped (for example, because it panicked).
//! let results = all(handles).unwrap().block().unwrap();
//! assert_eq!(results, Ok(vec![30, 10, 20]));
//! ```
//!
//! The first error wins:
//!
//! ```
//! use fanin::{all, Child, PromiseHandle};
//!
//! let aggregate = all([
//!     Child::ready(1),
//!     Child::pending(PromiseHandle::rejected("broken")),
//!     Child::pending(PromiseHandle::fulfilled(3)),
//! ])
//! .unwrap();
//!
//! assert_eq!(aggregate.block().unwrap(), Err("broken"));
//! ```

mod aggregate;
mod drop;
mod input;
mod ledger;
mod pool;
mod promise;
pub mod sync;
#[cfg(test)]
mod test;

pub use aggregate::{all, AggregateBuilder, Strategy};
pub use input::{Child, InputShapeError, IntoChild};
pub use pool::{Pool, PoolBuilder};
pub use promise::{promise, Promise, PromiseDropped, PromiseHandle};
