use std::{
    convert::Infallible,
    fmt,
    future::Future,
    mem,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use thiserror::Error;

use crate::sync::{Condvar, Mutex};

/// Creates a connected pair of [`Promise`] and [`PromiseHandle`].
///
/// `E` is the type the computation fails with. Promises that cannot fail can use
/// [`Infallible`], which is also the default for the [`Promise`] and [`PromiseHandle`] types.
pub fn promise<T, E>() -> (Promise<T, E>, PromiseHandle<T, E>) {
    let inner = Arc::new(PromiseInner {
        state: Mutex::new(PromiseState::Empty),
        condvar: Condvar::new(),
    });
    (
        Promise {
            inner: inner.clone(),
            settled: false,
        },
        PromiseHandle { inner },
    )
}

type Observer<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

enum PromiseState<T, E> {
    Empty,
    /// An async task is waiting in [`PromiseHandle::wait`].
    Waiting(Waker),
    /// Observers registered via [`PromiseHandle::observe`], run by whoever settles the promise.
    Observed(Observer<T, E>),
    Settled(Result<T, E>),
    /// The outcome has been handed to the [`PromiseHandle`] side.
    Consumed,
    Dropped,
}

impl<T, E> PromiseState<T, E> {
    /// Takes the outcome out of a settled or dropped state, or returns [`None`] if there is no
    /// outcome yet.
    fn take(&mut self) -> Option<Result<Result<T, E>, PromiseDropped>> {
        match self {
            PromiseState::Settled(_) => match mem::replace(self, PromiseState::Consumed) {
                PromiseState::Settled(result) => Some(Ok(result)),
                _ => unreachable!(),
            },
            PromiseState::Dropped => Some(Err(PromiseDropped { _priv: () })),
            PromiseState::Empty | PromiseState::Waiting(_) => None,
            PromiseState::Observed(_) | PromiseState::Consumed => {
                unreachable!("promise outcome taken twice")
            }
        }
    }
}

struct PromiseInner<T, E> {
    state: Mutex<PromiseState<T, E>>,
    condvar: Condvar,
}

/// An empty slot that can be settled with either a `T` or an `E`.
///
/// Settling a [`Promise`] lets the connected [`PromiseHandle`] retrieve the outcome. A connected
/// pair of [`Promise`] and [`PromiseHandle`] can be created by calling [`promise`].
///
/// Dropping a [`Promise`] without settling it is reported to the [`PromiseHandle`] as
/// [`PromiseDropped`].
pub struct Promise<T, E = Infallible> {
    inner: Arc<PromiseInner<T, E>>,
    settled: bool,
}

impl<T, E> Drop for Promise<T, E> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let mut state = self.inner.state.lock();
        let prev = mem::replace(&mut *state, PromiseState::Dropped);
        drop(state);
        self.inner.condvar.notify_one();

        // Dropped observers may own other promises, so this has to happen outside the lock.
        match prev {
            PromiseState::Waiting(waker) => waker.wake(),
            PromiseState::Observed(observer) => drop(observer),
            _ => {}
        }
    }
}

impl<T, E> Promise<T, E> {
    /// Fulfills the promise with a value, consuming it.
    ///
    /// Equivalent to `self.settle(Ok(value))`.
    pub fn fulfill(self, value: T) {
        self.settle(Ok(value));
    }

    /// Rejects the promise with an error, consuming it.
    ///
    /// Equivalent to `self.settle(Err(error))`.
    pub fn reject(self, error: E) {
        self.settle(Err(error));
    }

    /// Settles the promise with an outcome, consuming it.
    ///
    /// If observers were registered with [`PromiseHandle::observe`], the matching one runs on the
    /// calling thread before this method returns. Otherwise, a thread blocked in
    /// [`PromiseHandle::block`] or a task waiting in [`PromiseHandle::wait`] is woken up.
    ///
    /// This method does not block or fail. If the connected [`PromiseHandle`] was dropped, the
    /// outcome is dropped and nothing happens.
    pub fn settle(mut self, result: Result<T, E>) {
        // Set first, so that a panicking observer doesn't make `Drop` report us as dropped.
        self.settled = true;

        let mut state = self.inner.state.lock();
        match mem::replace(&mut *state, PromiseState::Consumed) {
            PromiseState::Observed(observer) => {
                drop(state);
                observer(result);
            }
            PromiseState::Waiting(waker) => {
                *state = PromiseState::Settled(result);
                drop(state);
                waker.wake();
            }
            PromiseState::Empty => {
                *state = PromiseState::Settled(result);
                drop(state);
                self.inner.condvar.notify_one();
            }
            PromiseState::Settled(_) | PromiseState::Consumed | PromiseState::Dropped => {
                unreachable!("promise settled twice")
            }
        }
    }
}

/// A handle connected to a [`Promise`] that will eventually be settled with a `T` or an `E`.
///
/// A connected pair of [`Promise`] and [`PromiseHandle`] can be created by calling [`promise`].
///
/// The outcome can be retrieved exactly once, in one of three ways: by blocking the current
/// thread ([`PromiseHandle::block`]), by awaiting it ([`PromiseHandle::wait`]), or by
/// registering observers that are called once it is available ([`PromiseHandle::observe`]).
pub struct PromiseHandle<T, E = Infallible> {
    inner: Arc<PromiseInner<T, E>>,
}

impl<T, E> PromiseHandle<T, E> {
    /// Creates a [`PromiseHandle`] that is already fulfilled with `value`.
    pub fn fulfilled(value: T) -> Self {
        let (promise, handle) = promise();
        promise.fulfill(value);
        handle
    }

    /// Creates a [`PromiseHandle`] that is already rejected with `error`.
    pub fn rejected(error: E) -> Self {
        let (promise, handle) = promise();
        promise.reject(error);
        handle
    }

    /// Blocks the calling thread until the connected [`Promise`] is settled, and returns its
    /// outcome.
    ///
    /// If the [`Promise`] is dropped without being settled, a [`PromiseDropped`] error is returned
    /// instead. This typically means that the code holding the [`Promise`] has panicked (for
    /// example, a job running on a [`Pool`][crate::Pool]).
    pub fn block(self) -> Result<Result<T, E>, PromiseDropped> {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(outcome) = state.take() {
                return outcome;
            }
            state = self.inner.condvar.wait(state);
        }
    }

    /// Asynchronously waits for the connected [`Promise`] to be settled, and returns its outcome.
    ///
    /// This works with any executor. Like [`PromiseHandle::block`], it returns a
    /// [`PromiseDropped`] error if the [`Promise`] is dropped without being settled.
    pub async fn wait(self) -> Result<Result<T, E>, PromiseDropped> {
        struct Waiter<T, E>(PromiseHandle<T, E>);

        impl<T, E> Future for Waiter<T, E> {
            type Output = Result<Result<T, E>, PromiseDropped>;

            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
                let mut state = self.0.inner.state.lock();
                if let Some(outcome) = state.take() {
                    return Poll::Ready(outcome);
                }

                *state = PromiseState::Waiting(cx.waker().clone());
                Poll::Pending
            }
        }

        Waiter(self).await
    }

    /// Registers a pair of observers that are called when the connected [`Promise`] is settled.
    ///
    /// This never blocks. If the [`Promise`] is already settled, the matching observer is called
    /// immediately, on the calling thread. Otherwise it will be called on whichever thread
    /// settles the [`Promise`].
    ///
    /// If the [`Promise`] is dropped without being settled, neither observer is called, and both
    /// are dropped.
    pub fn observe<F, R>(self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + Send + 'static,
        R: FnOnce(E) + Send + 'static,
    {
        let observer: Observer<T, E> = Box::new(move |result| match result {
            Ok(value) => on_fulfilled(value),
            Err(error) => on_rejected(error),
        });

        let mut state = self.inner.state.lock();
        match mem::replace(&mut *state, PromiseState::Consumed) {
            PromiseState::Settled(result) => {
                drop(state);
                observer(result);
            }
            PromiseState::Dropped => {
                *state = PromiseState::Dropped;
                drop(state);
                drop(observer);
            }
            PromiseState::Empty | PromiseState::Waiting(_) => {
                *state = PromiseState::Observed(observer);
            }
            PromiseState::Observed(_) | PromiseState::Consumed => {
                unreachable!("promise outcome taken twice")
            }
        }
    }

    /// Tests whether a call to [`PromiseHandle::block`] will block or return immediately.
    ///
    /// If this returns `false`, calling [`PromiseHandle::block`] on `self` will return immediately,
    /// without blocking.
    pub fn will_block(&self) -> bool {
        // Settling or dropping the `Promise` releases its reference, so if the count is still 2
        // the outcome isn't there yet.
        Arc::strong_count(&self.inner) == 2
    }
}

impl<T, E> fmt::Debug for PromiseHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseHandle")
            .field("will_block", &self.will_block())
            .finish_non_exhaustive()
    }
}

/// An error returned by [`PromiseHandle`] indicating that the connected [`Promise`] object was
/// dropped without being settled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("promise was dropped without being settled")]
pub struct PromiseDropped {
    _priv: (),
}
