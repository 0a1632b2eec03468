//! A fixed number of deferred slots, each settled by index.
//!
//! # Examples
//!
//! ```
//! use promise_kit::Barrier;
//! use futures::executor::block_on;
//! use std::thread;
//! let barrier: Barrier<&str> = Barrier::new(2).unwrap();
//! barrier.resolve(0, "x").unwrap();
//! let all = barrier.all();
//! let task = thread::spawn(move || block_on(all));
//! barrier.resolve(1, "y").unwrap();
//! assert_eq!(task.join().unwrap(), Ok(vec!["x", "y"]));
//! ```
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::deferred::{Consumer, Producer};
use crate::{Error, Promise};

#[derive(Debug)]
pub struct Barrier<T, E = Infallible> {
    producers: Vec<Producer<T, E>>,
    slots: Vec<Consumer<T, E>>,
}

impl<T, E> Barrier<T, E>
where
    T: Clone,
    E: Clone,
{
    /// Creates a barrier of `length` pending slots.
    ///
    /// Fails with [`Error::InvalidArgument`] if `length` is negative or does
    /// not fit in a `usize`.
    pub fn new<N>(length: N) -> Result<Self, Error>
    where
        N: TryInto<usize> + fmt::Display + Copy,
    {
        let len: usize = match length.try_into() {
            Ok(len) => len,
            Err(_) => {
                tracing::debug!(%length, "rejected barrier length");
                return Err(Error::InvalidArgument(format!(
                    "barrier length must be a non-negative integer, got {length}"
                )));
            }
        };
        let (producers, slots) = (0..len)
            .map(|_| <Producer<T, E> as Promise>::new())
            .unzip();
        Ok(Self { producers, slots })
    }

    /// Fulfills slot `index` with `value`.
    ///
    /// Returns `Ok(false)` if the slot was already settled.
    pub fn resolve<N>(&self, index: N, value: T) -> Result<bool, Error>
    where
        N: TryInto<usize> + fmt::Display + Copy,
    {
        let (index, producer) = self.producer(index)?;
        let settled = producer.resolve(value);
        tracing::trace!(index, settled, "barrier slot resolved");
        Ok(settled)
    }

    /// Rejects slot `index` with `err`.
    ///
    /// Returns `Ok(false)` if the slot was already settled.
    pub fn reject<N>(&self, index: N, err: E) -> Result<bool, Error>
    where
        N: TryInto<usize> + fmt::Display + Copy,
    {
        let (index, producer) = self.producer(index)?;
        let settled = producer.reject(err);
        tracing::trace!(index, settled, "barrier slot rejected");
        Ok(settled)
    }

    /// A waiter on a single slot.
    pub fn slot<N>(&self, index: N) -> Result<Consumer<T, E>, Error>
    where
        N: TryInto<usize> + fmt::Display + Copy,
    {
        let (_, producer) = self.producer(index)?;
        Ok(producer.consumer())
    }

    /// Resolves with every slot's value in index order once all are
    /// fulfilled, or with the earliest rejection as soon as any slot rejects.
    ///
    /// An empty barrier resolves immediately with an empty vector.
    pub fn all(&self) -> All<T, E> {
        All {
            slots: self.slots.clone(),
            values: self.slots.iter().map(|_| None).collect(),
        }
    }

    /// Settles like whichever slot settles first.
    ///
    /// An empty barrier has no slot that could win, so its race never
    /// completes.
    pub fn race(&self) -> Race<T, E> {
        Race {
            slots: self.slots.clone(),
        }
    }

    fn producer<N>(&self, index: N) -> Result<(usize, &Producer<T, E>), Error>
    where
        N: TryInto<usize> + fmt::Display + Copy,
    {
        index
            .try_into()
            .ok()
            .and_then(|i: usize| self.producers.get(i).map(|producer| (i, producer)))
            .ok_or_else(|| {
                tracing::debug!(%index, length = self.len(), "rejected barrier index");
                Error::InvalidArgument(format!(
                    "slot index {index} out of range for barrier of length {}",
                    self.len()
                ))
            })
    }
}

impl<T, E> Barrier<T, E> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Future returned by [`Barrier::all`].
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct All<T, E> {
    slots: Vec<Consumer<T, E>>,
    values: Vec<Option<T>>,
}

// `All` never pins its fields; buffered values live on the heap.
impl<T, E> Unpin for All<T, E> {}

impl<T: Clone, E: Clone> Future for All<T, E> {
    type Output = Result<Vec<T>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut rejected: Option<(u64, E)> = None;
        let mut pending = false;
        for (slot, value) in this.slots.iter_mut().zip(this.values.iter_mut()) {
            if value.is_some() {
                continue;
            }
            match slot.poll_settled(cx) {
                Poll::Ready((seq, settled)) => match &*settled {
                    Ok(fulfilled) => *value = Some(fulfilled.clone()),
                    Err(err) => {
                        if rejected.as_ref().map_or(true, |(earliest, _)| seq < *earliest) {
                            rejected = Some((seq, err.clone()));
                        }
                    }
                },
                Poll::Pending => pending = true,
            }
        }
        if let Some((_, err)) = rejected {
            return Poll::Ready(Err(err));
        }
        if pending {
            return Poll::Pending;
        }
        Poll::Ready(Ok(this.values.iter_mut().filter_map(Option::take).collect()))
    }
}

/// Future returned by [`Barrier::race`].
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Race<T, E> {
    slots: Vec<Consumer<T, E>>,
}

impl<T: Clone, E: Clone> Future for Race<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut first: Option<(u64, Arc<Result<T, E>>)> = None;
        for slot in &mut self.get_mut().slots {
            if let Poll::Ready((seq, value)) = slot.poll_settled(cx) {
                if first.as_ref().map_or(true, |(earliest, _)| seq < *earliest) {
                    first = Some((seq, value));
                }
            }
        }
        match first {
            Some((_, value)) => Poll::Ready((*value).clone()),
            None => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use futures::task::noop_waker_ref;
    use futures::FutureExt;
    use std::task::Context;
    use std::thread;

    use super::Barrier;
    use crate::Error;

    #[test]
    fn test_invalid_length() {
        assert!(matches!(
            Barrier::<u8>::new(-1),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Barrier::<u8>::new(i64::MIN),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(Barrier::<u8>::new(0u8).map(|b| b.len()), Ok(0));
    }

    #[test]
    fn test_empty_barrier() {
        let barrier = Barrier::<u8>::new(0).unwrap();
        assert!(barrier.is_empty());
        assert_eq!(barrier.all().now_or_never(), Some(Ok(vec![])));
        // Nothing can win a race without slots.
        assert_eq!(barrier.race().now_or_never(), None);
    }

    #[test]
    fn test_all_follows_slot_order() {
        let barrier = Barrier::<char>::new(3).unwrap();
        let all = barrier.all();
        barrier.resolve(2, 'c').unwrap();
        barrier.resolve(0, 'a').unwrap();
        assert!(barrier.all().now_or_never().is_none());
        barrier.resolve(1, 'b').unwrap();
        assert_eq!(block_on(all), Ok(vec!['a', 'b', 'c']));
    }

    #[test]
    fn test_all_fails_fast() {
        let barrier = Barrier::<u8, &str>::new(3).unwrap();
        let all = barrier.all();
        barrier.reject(1, "slot 1 failed").unwrap();
        assert_eq!(block_on(all), Err("slot 1 failed"));
        barrier.resolve(0, 0).unwrap();
        barrier.resolve(2, 2).unwrap();
        assert_eq!(block_on(barrier.all()), Err("slot 1 failed"));
    }

    #[test]
    fn test_invalid_index_leaves_slots_untouched() {
        let barrier = Barrier::<u8, ()>::new(2).unwrap();
        assert!(matches!(barrier.resolve(2, 9), Err(Error::InvalidArgument(_))));
        assert!(matches!(barrier.resolve(-1, 9), Err(Error::InvalidArgument(_))));
        assert!(matches!(barrier.reject(7, ()), Err(Error::InvalidArgument(_))));
        assert!(matches!(barrier.slot(2), Err(Error::InvalidArgument(_))));
        for i in 0..2 {
            assert!(!barrier.slot(i).unwrap().is_settled());
        }
    }

    #[test]
    fn test_resolve_twice_is_ignored() {
        let barrier = Barrier::<u8, ()>::new(1).unwrap();
        assert_eq!(barrier.resolve(0, 1), Ok(true));
        assert_eq!(barrier.resolve(0, 2), Ok(false));
        assert_eq!(barrier.reject(0, ()), Ok(false));
        assert_eq!(block_on(barrier.all()), Ok(vec![1]));
    }

    #[test]
    fn test_race_mirrors_first_settled() {
        let barrier = Barrier::<&str, &str>::new(3).unwrap();
        let race = barrier.race();
        barrier.resolve(2, "late index, first in time").unwrap();
        barrier.reject(0, "second").unwrap();
        assert_eq!(block_on(race), Ok("late index, first in time"));

        let barrier = Barrier::<&str, &str>::new(2).unwrap();
        barrier.reject(1, "boom").unwrap();
        assert_eq!(block_on(barrier.race()), Err("boom"));
    }

    #[test]
    fn test_waits_are_independent() {
        let barrier = Barrier::<u8>::new(2).unwrap();
        let first = barrier.all();
        let second = barrier.all();
        barrier.resolve(0, 1).unwrap();
        barrier.resolve(1, 2).unwrap();
        assert_eq!(block_on(first), Ok(vec![1, 2]));
        assert_eq!(block_on(second), Ok(vec![1, 2]));
        assert_eq!(block_on(barrier.race()), Ok(1));
    }

    #[test]
    fn test_all_across_threads() {
        let barrier = Barrier::<usize>::new(4).unwrap();
        let all = barrier.all();
        let waiter = thread::spawn(move || block_on(all));
        thread::scope(|s| {
            for i in 0..4 {
                let barrier = &barrier;
                s.spawn(move || barrier.resolve(i, i * 10));
            }
        });
        assert_eq!(
            waiter.join().expect("The waiter thread has panicked"),
            Ok(vec![0, 10, 20, 30])
        );
    }

    #[test]
    fn test_all_fails_fast_large() {
        for length in [3, 30, 31, 64] {
            let barrier = Barrier::<u8, &str>::new(length).unwrap();
            barrier.reject(length - 1, "last failed").unwrap();
            assert_eq!(barrier.all().now_or_never(), Some(Err("last failed")));
        }

        let barrier = Barrier::<usize, &str>::new(64).unwrap();
        let all = barrier.all();
        for i in (0..64).rev().step_by(2) {
            barrier.resolve(i, i).unwrap();
        }
        barrier.reject(40, "slot 40").unwrap();
        assert_eq!(block_on(all), Err("slot 40"));
    }

    #[test]
    fn test_all_large_keeps_slot_order() {
        let barrier = Barrier::<usize>::new(64).unwrap();
        let all = barrier.all();
        for i in (0..64).rev() {
            barrier.resolve(i, i * 2).unwrap();
        }
        assert_eq!(block_on(all), Ok((0..64).map(|i| i * 2).collect::<Vec<_>>()));
    }

    #[test]
    fn test_all_reports_first_rejection_in_time() {
        let barrier = Barrier::<u8, &str>::new(3).unwrap();
        barrier.reject(2, "slot 2 first").unwrap();
        barrier.reject(0, "slot 0 second").unwrap();
        assert_eq!(barrier.all().now_or_never(), Some(Err("slot 2 first")));

        // Same once a wait is already in progress.
        let barrier = Barrier::<u8, &str>::new(4).unwrap();
        let mut all = barrier.all();
        let mut cx = Context::from_waker(noop_waker_ref());
        assert!(all.poll_unpin(&mut cx).is_pending());
        barrier.resolve(1, 1).unwrap();
        barrier.reject(3, "slot 3 first").unwrap();
        barrier.reject(0, "slot 0 second").unwrap();
        assert_eq!(block_on(all), Err("slot 3 first"));
    }

    #[test]
    fn test_abandoned_waits_release_slots() {
        let barrier = Barrier::<u8>::new(2).unwrap();
        let mut cx = Context::from_waker(noop_waker_ref());
        for _ in 0..16 {
            assert!(barrier.race().poll_unpin(&mut cx).is_pending());
            assert!(barrier.all().poll_unpin(&mut cx).is_pending());
        }
        for i in 0..2 {
            assert_eq!(barrier.slot(i).unwrap().registered_wakers(), 0);
        }
    }
}
