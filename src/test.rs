//! Internal unit test utilities.

use std::{
    future::Future,
    pin::pin,
    sync::Arc,
    task::{Context, Poll, Wake, Waker},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    promise,
    sync::{Condvar, Mutex},
    PromiseHandle,
};

/// Polls a future to completion, returning its result.
pub fn block_on<R, F: Future<Output = R>>(fut: F) -> R {
    #[derive(Default)]
    struct ThreadWaker {
        /// Wakeups are signaled by incrementing this number and notifying the `Condvar`.
        wakeups: Mutex<u64>,
        condvar: Condvar,
    }
    impl Wake for ThreadWaker {
        fn wake(self: Arc<Self>) {
            *self.wakeups.lock() += 1;
            self.condvar.notify_one();
        }
    }

    let arc = Arc::new(ThreadWaker::default());
    let waker = Waker::from(arc.clone());
    let mut cx = Context::from_waker(&waker);

    let mut fut = pin!(fut);
    loop {
        // Snapshot before polling, so a wakeup that arrives during `poll` isn't missed.
        let seen = *arc.wakeups.lock();
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(value) => return value,
            Poll::Pending => {
                let guard = arc.wakeups.lock();
                drop(arc.condvar.wait_while(guard, |n| *n == seen));
            }
        }
    }
}

/// Settles a fresh promise with `result` on a separate thread after `delay`.
///
/// The returned [`JoinHandle`] yields the instant the promise was settled at.
pub fn settle_after<T, E>(
    delay: Duration,
    result: Result<T, E>,
) -> (PromiseHandle<T, E>, JoinHandle<Instant>)
where
    T: Send + 'static,
    E: Send + 'static,
{
    let (promise, handle) = promise();
    let thread = thread::spawn(move || {
        thread::sleep(delay);
        promise.settle(result);
        Instant::now()
    });
    (handle, thread)
}
