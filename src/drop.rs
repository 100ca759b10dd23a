//! Drop guards.

/// Guard returned by [`defer`], running its closure when it goes out of scope.
///
/// The closure also runs during unwinding, which is what makes this useful for logging the exit
/// of a thread whose job has panicked.
#[must_use = "`Defer` should be assigned to a variable, or it will be dropped immediately"]
pub struct Defer<F: FnOnce()> {
    cb: Option<F>,
}

impl<F: FnOnce()> Drop for Defer<F> {
    fn drop(&mut self) {
        if let Some(cb) = self.cb.take() {
            cb();
        }
    }
}

/// Returns a guard that runs `cb` when dropped.
pub fn defer<F: FnOnce()>(cb: F) -> Defer<F> {
    Defer { cb: Some(cb) }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, panic};

    use super::*;

    #[test]
    fn runs_on_scope_exit() {
        let ran = Cell::new(false);
        {
            let _guard = defer(|| ran.set(true));
            assert!(!ran.get());
        }
        assert!(ran.get());
    }

    #[test]
    fn runs_while_unwinding() {
        let ran = Cell::new(false);
        let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            let _guard = defer(|| ran.set(true));
            panic::resume_unwind(Box::new("unwind"));
        }));
        assert!(res.is_err());
        assert!(ran.get());
    }
}
