//! Fail-fast, order-preserving aggregation of many promises into one.
//!
//! [`all`] takes a collection of [`Child`]ren and returns a single [`PromiseHandle`] that is
//! fulfilled with every child's value, in input order, once all of them are available, or
//! rejected with the first error any child reports.
//!
//! The aggregate is driven entirely by the children: nothing is spawned and nothing blocks.
//! Observers are attached to every pending child, and whichever thread settles the last child
//! (or the first failing one) also settles the aggregate.
//!
//! Children are never cancelled. A child that completes after the aggregate has settled runs to
//! completion on its own, and its outcome is dropped.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use crate::{
    input::{normalize, Child, InputShapeError, IntoChild},
    ledger::{KeyedMap, Ledger, SlotArray},
    promise,
    sync::Mutex,
    Promise, PromiseHandle,
};

/// How an aggregate stores child values until it is fulfilled.
///
/// Both strategies behave identically from the outside.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// One slot per input position, with an atomic countdown of outstanding children.
    #[default]
    Slots,
    /// A map from input position to value, with a completion counter, under a single lock.
    Keyed,
}

/// A builder object that can be used to configure and launch an aggregate.
///
/// For the default configuration, use the freestanding [`all`] function.
#[derive(Debug, Clone, Default)]
pub struct AggregateBuilder {
    name: Option<String>,
    strategy: Strategy,
}

impl AggregateBuilder {
    /// Creates a new [`AggregateBuilder`] with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name used when logging the aggregate's progress.
    ///
    /// Unnamed aggregates don't log anything.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Selects how child values are stored. Defaults to [`Strategy::Slots`].
    #[inline]
    pub fn strategy(self, strategy: Strategy) -> Self {
        Self { strategy, ..self }
    }

    /// Launches an aggregate over `items`.
    ///
    /// See [`all`] for details.
    pub fn all<T, E, I>(self, items: I) -> Result<PromiseHandle<Vec<T>, E>, InputShapeError>
    where
        T: Send + 'static,
        E: Send + 'static,
        I: IntoIterator,
        I::Item: IntoChild<Value = T, Error = E>,
    {
        let children = normalize(items)?;
        if children.is_empty() {
            return Ok(PromiseHandle::fulfilled(Vec::new()));
        }

        Ok(match self.strategy {
            Strategy::Slots => launch::<T, E, SlotArray<T>>(children, self.name),
            Strategy::Keyed => launch::<T, E, KeyedMap<T>>(children, self.name),
        })
    }
}

/// Combines `items` into a single [`PromiseHandle`] that resolves to all of their values.
///
/// Each item is either a [`Child`] or a [`PromiseHandle`] (which becomes a [`Child::Pending`]).
/// The returned handle:
///
/// - is fulfilled with a [`Vec`] holding every child's value at its input position, once the last
///   child is fulfilled, regardless of the order in which they complete;
/// - is rejected with the error of the first child to be rejected, without waiting for the
///   others. If several children fail at the same time, which error is reported is unspecified;
/// - reports [`PromiseDropped`][crate::PromiseDropped] if a child's promise is dropped without
///   being settled (so the aggregate can never complete), once no other child can fail it.
///
/// An empty input results in an already-fulfilled handle.
///
/// # Errors
///
/// Returns an [`InputShapeError`] if `items` is not a finite collection: its iterator must report
/// an upper bound on its length, and must not yield more than that. In that case, no observer has
/// been registered on any child.
///
/// # Examples
///
/// ```
/// use std::{thread, time::Duration};
/// use fanin::{all, promise, Child};
///
/// let (slow, slow_handle) = promise::<u32, String>();
/// let (fast, fast_handle) = promise();
///
/// let aggregate = all([
///     Child::pending(slow_handle),
///     Child::ready(2),
///     Child::pending(fast_handle),
/// ])
/// .unwrap();
///
/// let t = thread::spawn(move || {
///     fast.fulfill(3);
///     thread::sleep(Duration::from_millis(10));
///     slow.fulfill(1);
/// });
///
/// assert_eq!(aggregate.block().unwrap(), Ok(vec![1, 2, 3]));
/// t.join().unwrap();
/// ```
pub fn all<T, E, I>(items: I) -> Result<PromiseHandle<Vec<T>, E>, InputShapeError>
where
    T: Send + 'static,
    E: Send + 'static,
    I: IntoIterator,
    I::Item: IntoChild<Value = T, Error = E>,
{
    AggregateBuilder::new().all(items)
}

fn launch<T, E, L>(children: Vec<Child<T, E>>, name: Option<String>) -> PromiseHandle<Vec<T>, E>
where
    T: Send + 'static,
    E: Send + 'static,
    L: Ledger<T> + 'static,
{
    if let Some(name) = &name {
        log::trace!("aggregate '{name}' launching {} children", children.len());
    }

    let (promise, handle) = promise();
    let resolver = Arc::new(Resolver::new(L::with_size(children.len()), promise, name));
    for (index, child) in children.into_iter().enumerate() {
        match child {
            Child::Ready(value) => resolver.child_fulfilled(index, value),
            Child::Pending(pending) => {
                let on_fulfilled = resolver.clone();
                let on_rejected = resolver.clone();
                pending.observe(
                    move |value| on_fulfilled.child_fulfilled(index, value),
                    move |error| on_rejected.child_rejected(index, error),
                );
            }
        }
    }
    handle
}

const UNSETTLED: u8 = 0;
const FULFILLED: u8 = 1;
const FAILED: u8 = 2;

/// Settlement state of an aggregate. Only [`Settlement::Unsettled`] is ever left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Unsettled,
    Fulfilled,
    Failed,
}

/// Shared state of one aggregate, referenced by the observers of all of its children.
///
/// Settles the aggregate's [`Promise`] exactly once.
struct Resolver<T, E, L> {
    ledger: L,
    settled: AtomicU8,
    /// Taken by whichever child wins the settlement.
    promise: Mutex<Option<Promise<Vec<T>, E>>>,
    name: Option<String>,
}

impl<T, E, L: Ledger<T>> Resolver<T, E, L> {
    fn new(ledger: L, promise: Promise<Vec<T>, E>, name: Option<String>) -> Self {
        Self {
            ledger,
            settled: AtomicU8::new(UNSETTLED),
            promise: Mutex::new(Some(promise)),
            name,
        }
    }

    fn settlement(&self) -> Settlement {
        match self.settled.load(Ordering::Acquire) {
            UNSETTLED => Settlement::Unsettled,
            FULFILLED => Settlement::Fulfilled,
            _ => Settlement::Failed,
        }
    }

    /// Moves the aggregate out of [`Settlement::Unsettled`]. Returns `false` if it had already
    /// left it, in which case the caller's outcome must be dropped.
    fn transition(&self, to: u8) -> bool {
        self.settled
            .compare_exchange(UNSETTLED, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn take_promise(&self) -> Option<Promise<Vec<T>, E>> {
        self.promise.lock().take()
    }

    fn child_fulfilled(&self, index: usize, value: T) {
        if self.settlement() != Settlement::Unsettled {
            return;
        }

        if !self.ledger.record(index, value) || !self.transition(FULFILLED) {
            return;
        }

        let values = self.ledger.drain();
        if let Some(name) = &self.name {
            log::trace!("aggregate '{name}' fulfilled by child {index}");
        }
        // The lock is released before settling, since observers of the aggregate run inline.
        if let Some(promise) = self.take_promise() {
            promise.fulfill(values);
        }
    }

    fn child_rejected(&self, index: usize, error: E) {
        if !self.transition(FAILED) {
            return;
        }

        if let Some(name) = &self.name {
            log::trace!("aggregate '{name}' failed by child {index}");
        }
        if let Some(promise) = self.take_promise() {
            promise.reject(error);
        }
    }
}

impl<T, E, L> Drop for Resolver<T, E, L> {
    fn drop(&mut self) {
        if *self.settled.get_mut() == UNSETTLED {
            // A child promise was dropped; the aggregate's own promise goes with us.
            if let Some(name) = &self.name {
                log::trace!("aggregate '{name}' abandoned before settling");
            }
        }
    }
}
