//! Per-position result storage for aggregates.
//!
//! A [`Ledger`] stores the value of each child by its input index and tracks how many children
//! are still outstanding. Settlement itself is not decided here; see `aggregate::Resolver`.

use std::{
    collections::BTreeMap,
    mem,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::sync::Mutex;

pub(crate) trait Ledger<T>: Send + Sync {
    fn with_size(size: usize) -> Self
    where
        Self: Sized;

    /// Stores the value of the child at `index`.
    ///
    /// Returns `true` for exactly one call: the one that stores the last outstanding value. Every
    /// index must be recorded at most once.
    fn record(&self, index: usize, value: T) -> bool;

    /// Moves all stored values out, in index order.
    ///
    /// Only meaningful after [`Ledger::record`] has returned `true`.
    fn drain(&self) -> Vec<T>;

    /// Number of children that have not been recorded yet.
    fn pending(&self) -> usize;
}

/// Index-addressed slots with an atomic countdown of outstanding children.
///
/// Every child writes to its own slot, so the slot locks are never contended. The countdown is
/// what orders those writes before the final [`Ledger::drain`].
pub(crate) struct SlotArray<T> {
    slots: Box<[Mutex<Option<T>>]>,
    pending: AtomicUsize,
}

impl<T: Send> Ledger<T> for SlotArray<T> {
    fn with_size(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| Mutex::new(None)).collect(),
            pending: AtomicUsize::new(size),
        }
    }

    fn record(&self, index: usize, value: T) -> bool {
        let prev = self.slots[index].lock().replace(value);
        debug_assert!(prev.is_none(), "slot {index} recorded twice");

        // `AcqRel` publishes our slot write to whichever thread performs the final decrement, and
        // makes all other slot writes visible to us if that thread is us.
        self.pending.fetch_sub(1, Ordering::AcqRel) == 1
    }

    fn drain(&self) -> Vec<T> {
        let values: Vec<T> = self
            .slots
            .iter()
            .filter_map(|slot| slot.lock().take())
            .collect();
        debug_assert_eq!(values.len(), self.slots.len(), "drained an incomplete ledger");
        values
    }

    fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// A key→value map with a separate completion counter, all behind a single lock.
///
/// Completions are serialized by the lock instead of coordinated through atomics. Values come out
/// in key order, which is input order, no matter in which order they were recorded.
pub(crate) struct KeyedMap<T> {
    size: usize,
    inner: Mutex<Keyed<T>>,
}

struct Keyed<T> {
    values: BTreeMap<usize, T>,
    completed: usize,
}

impl<T: Send> Ledger<T> for KeyedMap<T> {
    fn with_size(size: usize) -> Self {
        Self {
            size,
            inner: Mutex::new(Keyed {
                values: BTreeMap::new(),
                completed: 0,
            }),
        }
    }

    fn record(&self, index: usize, value: T) -> bool {
        let mut inner = self.inner.lock();
        let prev = inner.values.insert(index, value);
        debug_assert!(prev.is_none(), "key {index} recorded twice");
        inner.completed += 1;
        inner.completed == self.size
    }

    fn drain(&self) -> Vec<T> {
        let values = mem::take(&mut self.inner.lock().values);
        values.into_values().collect()
    }

    fn pending(&self) -> usize {
        self.size - self.inner.lock().completed
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Barrier},
        thread,
    };

    use super::*;

    fn out_of_order<L: Ledger<&'static str>>() {
        let ledger = L::with_size(3);
        assert_eq!(ledger.pending(), 3);
        assert!(!ledger.record(2, "c"));
        assert!(!ledger.record(0, "a"));
        assert_eq!(ledger.pending(), 1);
        assert!(ledger.record(1, "b"));
        assert_eq!(ledger.pending(), 0);
        assert_eq!(ledger.drain(), ["a", "b", "c"]);
    }

    #[test]
    fn slot_array_out_of_order() {
        out_of_order::<SlotArray<_>>();
    }

    #[test]
    fn keyed_map_out_of_order() {
        out_of_order::<KeyedMap<_>>();
    }

    /// Many threads record at once; exactly one of them must see the ledger complete.
    fn single_completion<L: Ledger<usize> + 'static>() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 64;

        let ledger = Arc::new(L::with_size(THREADS * PER_THREAD));
        let barrier = Arc::new(Barrier::new(THREADS));
        let threads: Vec<_> = (0..THREADS)
            .map(|t| {
                let ledger = ledger.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    (0..PER_THREAD)
                        .map(|i| i * THREADS + t)
                        .filter(|&index| ledger.record(index, index))
                        .count()
                })
            })
            .collect();

        let completions: usize = threads.into_iter().map(|t| t.join().unwrap()).sum();
        assert_eq!(completions, 1);
        assert_eq!(ledger.pending(), 0);
        let values = ledger.drain();
        assert_eq!(values, (0..THREADS * PER_THREAD).collect::<Vec<_>>());
    }

    #[test]
    fn slot_array_single_completion() {
        single_completion::<SlotArray<_>>();
    }

    #[test]
    fn keyed_map_single_completion() {
        single_completion::<KeyedMap<_>>();
    }
}
