//! Locking primitives that do not poison themselves.
//!
//! [`std::sync::Mutex`] poisons itself when a thread panics while holding the lock, and every
//! later `lock` returns an error that is usually unwrapped. In this crate, panics are already
//! forwarded to the owner of a concurrent operation by [`Pool`][crate::Pool], and a panicking
//! job simply drops its [`Promise`][crate::Promise]. Poisoning would only add knock-on panics in
//! the observers and waiters of unrelated promises, hiding the root cause.
//!
//! These are low-level building blocks. Prefer [`Promise`][crate::Promise] and
//! [`all`][crate::all] where they fit.

use std::{
    error::Error,
    fmt,
    ops::{Deref, DerefMut},
    sync,
};

pub type TryLockResult<Guard> = Result<Guard, TryLockError>;

#[derive(Default)]
pub struct Mutex<T: ?Sized> {
    inner: sync::Mutex<T>,
}

impl<T> Mutex<T> {
    pub const fn new(t: T) -> Mutex<T> {
        Self {
            inner: sync::Mutex::new(t),
        }
    }

    pub fn into_inner(self) -> T {
        match self.inner.into_inner() {
            Ok(inner) => inner,
            Err(poison) => poison.into_inner(),
        }
    }
}

impl<T: ?Sized> Mutex<T> {
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };

        MutexGuard { inner: guard }
    }

    pub fn try_lock(&self) -> TryLockResult<MutexGuard<'_, T>> {
        let guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(sync::TryLockError::Poisoned(poison)) => poison.into_inner(),
            Err(sync::TryLockError::WouldBlock) => return Err(TryLockError),
        };

        Ok(MutexGuard { inner: guard })
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Mutex");
        match self.try_lock() {
            Ok(val) => s.field("data", &&*val),
            Err(TryLockError) => s.field("data", &"<locked>"),
        }
        .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct MutexGuard<'a, T: ?Sized + 'a> {
    inner: sync::MutexGuard<'a, T>,
}

impl<'a, T: ?Sized + 'a> Deref for MutexGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'a, T: ?Sized + 'a> DerefMut for MutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TryLockError;

impl Error for TryLockError {}

impl fmt::Display for TryLockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("`try_lock` failed because the operation would block")
    }
}

#[derive(Debug, Default)]
pub struct Condvar {
    inner: sync::Condvar,
}

impl Condvar {
    pub const fn new() -> Condvar {
        Self {
            inner: sync::Condvar::new(),
        }
    }

    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let guard = match self.inner.wait(guard.inner) {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };
        MutexGuard { inner: guard }
    }

    pub fn wait_while<'a, T, F>(&self, guard: MutexGuard<'a, T>, condition: F) -> MutexGuard<'a, T>
    where
        F: FnMut(&mut T) -> bool,
    {
        let guard = match self.inner.wait_while(guard.inner, condition) {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };
        MutexGuard { inner: guard }
    }

    pub fn notify_one(&self) {
        self.inner.notify_one();
    }

    pub fn notify_all(&self) {
        self.inner.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{panic, sync::Arc, thread};

    use super::*;

    #[test]
    fn lock_survives_panicking_holder() {
        let mutex = Arc::new(Mutex::new(0));
        let mutex2 = mutex.clone();
        let res = thread::spawn(move || {
            let mut guard = mutex2.lock();
            *guard = 1;
            panic::resume_unwind(Box::new("holder panic"));
        })
        .join();
        assert!(res.is_err());

        // A `std` mutex would be poisoned now.
        assert_eq!(*mutex.lock(), 1);
    }

    #[test]
    fn try_lock_would_block() {
        let mutex = Mutex::new(());
        let _guard = mutex.lock();
        assert_eq!(mutex.try_lock().unwrap_err(), TryLockError);
        assert_eq!(format!("{mutex:?}"), "Mutex { data: \"<locked>\", .. }");
    }
}
