//! A deferred promise separates creating a future from deciding its outcome.
//! The `Producer` may be cloned and handed to whoever gets to settle it; the
//! first settle wins and every later one is ignored. The `Consumer` may be
//! cloned as well, and every clone observes the same outcome.
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::Promise;

/// Orders settlements across all promises so that combinators can tell which
/// slot settled first even when several are ready by the time they are polled.
static SETTLE_SEQ: AtomicU64 = AtomicU64::new(0);

type Callback<T, E> = Box<dyn FnOnce(&Result<T, E>) + Send>;

/// The settling half. Every clone shares the same promise.
///
/// # Examples
///
/// ```
/// use promise_kit::{Promise, deferred::Producer};
/// use futures::executor::block_on;
/// let (op, op_a) = Producer::<String, ()>::new();
/// let other = op.clone();
/// assert!(op.resolve(String::from("🍓")));
/// assert!(!other.resolve(String::from("🍌")));
/// assert_eq!(block_on(op_a), Ok(String::from("🍓")));
/// ```
pub struct Producer<T, E> {
    promise: Arc<Mutex<Inner<T, E>>>,
}

/// The waiting half. Resolves to a clone of the settled `Result<T, E>`.
///
/// A consumer dropped while pending takes its waker registration with it.
pub struct Consumer<T, E> {
    promise: Arc<Mutex<Inner<T, E>>>,
    waiter: Option<u64>,
}

struct Settled<T, E> {
    seq: u64,
    value: Arc<Result<T, E>>,
}

struct Inner<T, E> {
    value: Option<Settled<T, E>>,
    // One entry per polled consumer, keyed so a dropped consumer can leave.
    wakers: Vec<(u64, Waker)>,
    next_waiter: u64,
    callbacks: Vec<Callback<T, E>>,
}

fn lock<T, E>(promise: &Mutex<Inner<T, E>>) -> MutexGuard<'_, Inner<T, E>> {
    // Inner is consistent between statements, so a panicking holder leaves
    // nothing half written.
    promise.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T, E> Producer<T, E> {
    /// Settles the promise with `outcome`.
    ///
    /// Returns `true` if this call settled it. Continuations run on the
    /// calling thread before waiting tasks are woken.
    pub fn settle(&self, outcome: Result<T, E>) -> bool {
        let (value, wakers, callbacks) = {
            let mut promise = lock(&self.promise);
            if promise.value.is_some() {
                tracing::debug!("ignoring settle of an already settled promise");
                return false;
            }
            let value = Arc::new(outcome);
            promise.value = Some(Settled {
                seq: SETTLE_SEQ.fetch_add(1, Ordering::Relaxed),
                value: value.clone(),
            });
            (
                value,
                std::mem::take(&mut promise.wakers),
                std::mem::take(&mut promise.callbacks),
            )
        };
        tracing::trace!(
            fulfilled = value.is_ok(),
            waiters = wakers.len(),
            continuations = callbacks.len(),
            "promise settled"
        );
        for callback in callbacks {
            callback(&value);
        }
        for (_, waker) in wakers {
            waker.wake()
        }
        true
    }

    /// Returns another waiter on this promise.
    pub fn consumer(&self) -> Consumer<T, E> {
        Consumer {
            promise: self.promise.clone(),
            waiter: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        lock(&self.promise).value.is_some()
    }
}

impl<T, E> Promise for Producer<T, E>
where
    T: Clone,
    E: Clone,
{
    type Output = T;
    type Error = E;
    type Waiter = Consumer<T, E>;

    fn new() -> (Self, Self::Waiter) {
        let producer = Self {
            promise: Arc::new(Mutex::new(Inner {
                value: None,
                wakers: vec![],
                next_waiter: 0,
                callbacks: vec![],
            })),
        };
        let consumer = producer.consumer();
        (producer, consumer)
    }

    fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    fn reject(&self, err: E) -> bool {
        self.settle(Err(err))
    }
}

impl<T, E> Consumer<T, E> {
    pub fn is_settled(&self) -> bool {
        lock(&self.promise).value.is_some()
    }

    /// Registers a continuation for the outcome.
    ///
    /// If the promise is already settled `f` runs right away on the calling
    /// thread, otherwise it runs once, from whichever call settles it.
    pub fn on_settled<F>(&self, f: F)
    where
        F: FnOnce(&Result<T, E>) + Send + 'static,
    {
        let value = {
            let mut promise = lock(&self.promise);
            match promise.value {
                Some(ref settled) => settled.value.clone(),
                None => {
                    promise.callbacks.push(Box::new(f));
                    return;
                }
            }
        };
        f(&value)
    }

    /// Polls for the outcome along with its settlement sequence number.
    pub(crate) fn poll_settled(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<(u64, Arc<Result<T, E>>)> {
        let mut promise = lock(&self.promise);
        if let Some(ref settled) = promise.value {
            return Poll::Ready((settled.seq, settled.value.clone()));
        }
        let registered = self
            .waiter
            .and_then(|key| promise.wakers.iter().position(|(k, _)| *k == key));
        match registered {
            Some(i) => {
                let waker = &mut promise.wakers[i].1;
                if !waker.will_wake(cx.waker()) {
                    *waker = cx.waker().clone();
                }
            }
            None => {
                let key = promise.next_waiter;
                promise.next_waiter += 1;
                promise.wakers.push((key, cx.waker().clone()));
                self.waiter = Some(key);
            }
        }
        Poll::Pending
    }

    #[cfg(test)]
    pub(crate) fn registered_wakers(&self) -> usize {
        lock(&self.promise).wakers.len()
    }
}

impl<T: Clone, E: Clone> Consumer<T, E> {
    /// The outcome, if settled.
    pub fn outcome(&self) -> Option<Result<T, E>> {
        lock(&self.promise)
            .value
            .as_ref()
            .map(|settled| (*settled.value).clone())
    }
}

impl<T: Clone, E: Clone> Future for Consumer<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut()
            .poll_settled(cx)
            .map(|(_, value)| (*value).clone())
    }
}

impl<T, E> Clone for Producer<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> Clone for Consumer<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            waiter: None,
        }
    }
}

impl<T, E> Drop for Consumer<T, E> {
    fn drop(&mut self) {
        if let Some(key) = self.waiter {
            lock(&self.promise).wakers.retain(|(k, _)| *k != key);
        }
    }
}

impl<T, E> fmt::Debug for Inner<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.value {
            None => "pending",
            Some(ref settled) if settled.value.is_ok() => "fulfilled",
            Some(_) => "rejected",
        };
        f.debug_struct("Inner")
            .field("state", &state)
            .field("wakers", &self.wakers.len())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl<T, E> fmt::Debug for Producer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("promise", &*lock(&self.promise))
            .finish()
    }
}

impl<T, E> fmt::Debug for Consumer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("promise", &*lock(&self.promise))
            .finish()
    }
}
