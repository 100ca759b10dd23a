//! An owned thread pool whose jobs report back through [`Promise`][crate::Promise]s.

use std::{
    io,
    panic::{self, resume_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::Sender;

use crate::{drop::defer, promise, PromiseHandle};

type Job = Box<dyn FnOnce() + Send>;

/// A builder object that can be used to configure and spawn a [`Pool`].
#[derive(Debug, Clone, Default)]
pub struct PoolBuilder {
    name: Option<String>,
}

impl PoolBuilder {
    /// Sets the base name of the [`Pool`] threads.
    ///
    /// Each thread spawned will be named according to this base name and its index.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Spawns a [`Pool`] of `count` threads.
    ///
    /// # Panics
    ///
    /// This method will panic if `count` is 0.
    pub fn spawn(self, count: usize) -> io::Result<Pool> {
        assert_ne!(count, 0, "count must be at least 1");

        let panic_flag = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(count);
        let (sender, recv) = crossbeam_channel::bounded::<Job>(0);
        for i in 0..count {
            let mut builder = thread::Builder::new();
            let name = self.name.as_ref().map(|name| format!("{name}-{i}"));
            if let Some(name) = name.clone() {
                builder = builder.name(name);
            }
            let recv = recv.clone();
            let panic_flag = panic_flag.clone();
            let handle = builder.spawn(move || {
                let _guard;
                if let Some(name) = name {
                    log::trace!("pool thread '{name}' starting");
                    _guard = defer(move || log::trace!("pool thread '{name}' exiting"));
                }

                let res = panic::catch_unwind(AssertUnwindSafe(|| {
                    for job in recv {
                        job();
                    }
                }));
                if let Err(payload) = res {
                    panic_flag.store(true, Ordering::Relaxed);
                    resume_unwind(payload);
                }
            })?;
            handles.push(handle);
        }

        Ok(Pool {
            sender: Some(sender),
            handles,
            panic_flag,
        })
    }
}

/// An owned set of threads that run submitted jobs and settle a [`Promise`][crate::Promise] with
/// each job's outcome.
///
/// The [`PromiseHandle`]s returned by [`Pool::submit`] can be passed straight to
/// [`all`][crate::all], which makes the jobs run in parallel while their results are collected in
/// submission order.
///
/// If a job panics, its promise is dropped, so its [`PromiseHandle`] reports
/// [`PromiseDropped`][crate::PromiseDropped]. The panic itself is propagated to the owning thread
/// on the next call to [`Pool::submit`], or when the [`Pool`] is dropped. If more than one job
/// has panicked, the payload of one of them is propagated.
///
/// Dropping a [`Pool`] joins all of its threads, which waits for all running jobs to finish.
///
/// # Examples
///
/// ```
/// use fanin::{all, Pool};
///
/// let mut pool = Pool::builder().name("square").spawn(4).unwrap();
/// let handles: Vec<_> = (1..=8u64)
///     .map(|i| pool.submit(move || Ok::<_, String>(i * i)))
///     .collect();
///
/// let squares = all(handles).unwrap().block().unwrap();
/// assert_eq!(squares, Ok(vec![1, 4, 9, 16, 25, 36, 49, 64]));
/// ```
pub struct Pool {
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
    /// Set to `true` when any thread panics.
    panic_flag: Arc<AtomicBool>,
}

impl Drop for Pool {
    fn drop(&mut self) {
        // Close the channel to signal the threads to exit.
        drop(self.sender.take());

        self.wait_for_exit();
    }
}

impl Pool {
    /// Returns a builder that can be used to configure and spawn a [`Pool`].
    #[inline]
    pub fn builder() -> PoolBuilder {
        PoolBuilder { name: None }
    }

    fn wait_for_exit(&mut self) {
        // Wait for all threads to exit and propagate a panic if one of them panicked.
        let mut payload = None;
        for handle in self.handles.drain(..) {
            if let Err(pl) = handle.join() {
                payload = Some(pl);
            }
        }
        if let Some(payload) = payload {
            if !thread::panicking() {
                resume_unwind(payload);
            }
        }
    }

    /// Runs `job` on one of the threads in this pool, and returns a handle to its outcome.
    ///
    /// If no thread is available to take the job, this will block until one is.
    ///
    /// If a previously submitted job has panicked, this will propagate the panic to the calling
    /// thread instead.
    pub fn submit<T, E, F>(&mut self, job: F) -> PromiseHandle<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let (promise, handle) = promise();
        self.send(Box::new(move || promise.settle(job())));
        handle
    }

    fn send(&mut self, job: Job) {
        if self.panic_flag.load(Ordering::Relaxed) {
            // A thread has panicked. Close the channel to signal all threads to exit.
            drop(self.sender.take());
            self.wait_for_exit();
            unreachable!("should have propagated panic");
        }

        let sent = match &self.sender {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        };
        if !sent {
            // All threads have panicked.
            self.wait_for_exit();
            unreachable!("should have propagated panic");
        }
    }
}
