//! Validation and classification of the inputs handed to [`all`][crate::all].

use thiserror::Error;

use crate::PromiseHandle;

/// One input to an aggregate: either a value that is already available, or a handle to a
/// computation that will settle on its own schedule.
///
/// [`PromiseHandle`]s convert into [`Child::Pending`] (see [`IntoChild`]), so a collection of
/// handles can be passed to [`all`][crate::all] directly.
#[derive(Debug)]
pub enum Child<T, E> {
    Ready(T),
    Pending(PromiseHandle<T, E>),
}

impl<T, E> Child<T, E> {
    #[inline]
    pub fn ready(value: T) -> Self {
        Child::Ready(value)
    }

    #[inline]
    pub fn pending(handle: PromiseHandle<T, E>) -> Self {
        Child::Pending(handle)
    }
}

impl<T, E> From<PromiseHandle<T, E>> for Child<T, E> {
    fn from(handle: PromiseHandle<T, E>) -> Self {
        Child::Pending(handle)
    }
}

/// Conversion into a [`Child`].
///
/// This is what [`all`][crate::all] accepts as items. It is implemented for [`Child`] itself and
/// for [`PromiseHandle`].
pub trait IntoChild {
    type Value;
    type Error;

    fn into_child(self) -> Child<Self::Value, Self::Error>;
}

impl<T, E> IntoChild for Child<T, E> {
    type Value = T;
    type Error = E;

    #[inline]
    fn into_child(self) -> Child<T, E> {
        self
    }
}

impl<T, E> IntoChild for PromiseHandle<T, E> {
    type Value = T;
    type Error = E;

    #[inline]
    fn into_child(self) -> Child<T, E> {
        Child::Pending(self)
    }
}

/// The input to an aggregate was not a finite, ordered collection.
///
/// This is reported before any observer is registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputShapeError {
    /// The iterator did not report an upper bound on its length, so it may never end.
    #[error("input has no upper bound on its length")]
    Unbounded,
    /// The iterator yielded more items than the upper bound it reported.
    #[error("input yielded more than its reported bound of {bound} items")]
    Overrun { bound: usize },
}

/// Collects `items` into index-ordered children.
///
/// Nothing is observed or scheduled here; on error, everything collected so far is dropped.
pub(crate) fn normalize<T, E, I>(items: I) -> Result<Vec<Child<T, E>>, InputShapeError>
where
    I: IntoIterator,
    I::Item: IntoChild<Value = T, Error = E>,
{
    let iter = items.into_iter();
    let (lower, upper) = iter.size_hint();
    let bound = upper.ok_or(InputShapeError::Unbounded)?;

    let mut children = Vec::with_capacity(lower);
    for item in iter {
        if children.len() == bound {
            return Err(InputShapeError::Overrun { bound });
        }
        children.push(item.into_child());
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use std::iter;

    use super::*;

    /// An iterator whose `size_hint` claims fewer items than it yields.
    struct Liar(u32);

    impl Iterator for Liar {
        type Item = Child<u32, ()>;

        fn next(&mut self) -> Option<Self::Item> {
            self.0 += 1;
            (self.0 <= 3).then(|| Child::Ready(self.0))
        }

        fn size_hint(&self) -> (usize, Option<usize>) {
            (0, Some(1))
        }
    }

    fn indices<T: Copy, E>(children: &[Child<T, E>]) -> Vec<Option<T>> {
        children
            .iter()
            .map(|child| match child {
                Child::Ready(v) => Some(*v),
                Child::Pending(_) => None,
            })
            .collect()
    }

    #[test]
    fn keeps_input_order_and_kind() {
        let children = normalize::<_, (), _>(vec![
            Child::ready(1),
            Child::pending(PromiseHandle::fulfilled(2)),
            Child::ready(3),
        ])
        .unwrap();
        assert_eq!(indices(&children), [Some(1), None, Some(3)]);
    }

    #[test]
    fn empty() {
        let children = normalize::<u8, (), _>(Vec::<Child<u8, ()>>::new()).unwrap();
        assert!(children.is_empty());
    }

    #[test]
    fn handles_convert_to_pending() {
        let handles = (0..4).map(PromiseHandle::<i32, ()>::fulfilled);
        let children = normalize::<i32, (), _>(handles).unwrap();
        assert_eq!(children.len(), 4);
        assert!(children.iter().all(|c| matches!(c, Child::Pending(_))));
    }

    #[test]
    fn filtered_input_is_accepted() {
        // `filter` reports `(0, Some(n))`, which is still finite.
        let children =
            normalize::<_, (), _>((0..10).filter(|i| i % 3 == 0).map(Child::ready)).unwrap();
        assert_eq!(indices(&children), [Some(0), Some(3), Some(6), Some(9)]);
    }

    #[test]
    fn unbounded_input_is_rejected() {
        let err = normalize::<_, (), _>(iter::repeat(1).map(Child::ready)).unwrap_err();
        assert_eq!(err, InputShapeError::Unbounded);
        assert_eq!(err.to_string(), "input has no upper bound on its length");
    }

    #[test]
    fn overrunning_input_is_rejected() {
        let err = normalize::<u32, (), _>(Liar(0)).unwrap_err();
        assert_eq!(err, InputShapeError::Overrun { bound: 1 });
    }
}
