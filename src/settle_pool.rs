//! A registry of in-flight promises that prunes itself as they settle.
//!
//! The pool only observes what it tracks. Each entry removes itself the
//! moment its promise settles, whether or not anyone is waiting on the pool,
//! so the registry never holds more than the operations still in flight.
//!
//! # Examples
//!
//! ```
//! use promise_kit::{Promise, SettlePool, deferred::Producer};
//! use futures::executor::block_on;
//! let pool = SettlePool::new();
//! let (ok, waiter) = Producer::<u8, String>::new();
//! pool.add(waiter);
//! let (failed, waiter) = Producer::new();
//! pool.add(waiter);
//!
//! let settled = pool.all_settled();
//! ok.resolve(1);
//! failed.reject("💥".to_string());
//! assert_eq!(block_on(settled), vec![Ok(1), Err("💥".to_string())]);
//! assert!(pool.is_empty());
//! ```
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{join_all, JoinAll, Then};
use futures::FutureExt;

use crate::deferred::{Consumer, Producer};
use crate::Promise;

#[derive(Debug)]
pub struct SettlePool<T, E> {
    registry: Arc<Mutex<Registry<T, E>>>,
}

#[derive(Debug)]
struct Registry<T, E> {
    next_key: u64,
    // Keys only grow, so iteration order is insertion order.
    pending: BTreeMap<u64, Consumer<T, E>>,
}

fn lock<T, E>(registry: &Mutex<Registry<T, E>>) -> MutexGuard<'_, Registry<T, E>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T, E> SettlePool<T, E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_key: 0,
                pending: BTreeMap::new(),
            })),
        }
    }

    /// Number of tracked promises that have not settled yet.
    pub fn len(&self) -> usize {
        lock(&self.registry).pending.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.registry).pending.is_empty()
    }
}

// Settled outcomes are shared behind an `Arc`, and the pruning continuation
// carries the registry across threads, so both halves must be `Sync`.
impl<T, E> SettlePool<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Starts tracking `promise` until it settles.
    pub fn add(&self, promise: Consumer<T, E>) {
        let key = {
            let mut registry = lock(&self.registry);
            let key = registry.next_key;
            registry.next_key += 1;
            registry.pending.insert(key, promise.clone());
            key
        };
        tracing::trace!(key, "tracking promise");

        // Already settled promises run this right away and never linger.
        let registry = Arc::downgrade(&self.registry);
        promise.on_settled(move |outcome| {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            if lock(&registry).pending.remove(&key).is_some() {
                tracing::trace!(key, fulfilled = outcome.is_ok(), "promise left the pool");
            }
        });
    }

    /// Tracks an arbitrary future.
    ///
    /// The entry is registered immediately. The returned future drives `fut`,
    /// settles the entry with its outcome and passes that outcome through.
    /// The pool never polls anything itself, so if the returned future is
    /// dropped unfinished the entry stays pending.
    pub fn track<F>(&self, fut: F) -> impl Future<Output = Result<T, E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let (producer, consumer) = <Producer<T, E> as Promise>::new();
        self.add(consumer);
        async move {
            let outcome = fut.await;
            producer.settle(outcome.clone());
            outcome
        }
    }

    /// Resolves with the outcome of every promise pending right now, in the
    /// order they were added. Never fails: rejections are reported as `Err`
    /// entries.
    ///
    /// Promises added after this call are not waited for.
    pub fn all_settled(&self) -> JoinAll<Consumer<T, E>> {
        let snapshot: Vec<_> = lock(&self.registry).pending.values().cloned().collect();
        tracing::trace!(pending = snapshot.len(), "waiting for pool to settle");
        join_all(snapshot)
    }

    /// Like [`all_settled`](Self::all_settled), then hands the outcomes to
    /// `on_settled`, whose future becomes the result.
    pub fn all_settled_then<F, Fut>(&self, on_settled: F) -> Then<JoinAll<Consumer<T, E>>, Fut, F>
    where
        F: FnOnce(Vec<Result<T, E>>) -> Fut,
        Fut: Future,
    {
        self.all_settled().then(on_settled)
    }
}

impl<T, E> Default for SettlePool<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for SettlePool<T, E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}
