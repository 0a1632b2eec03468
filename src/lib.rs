//! Promises that are settled from the outside, and the two coordination
//! primitives built on top of them.
//!
//! - [`deferred`]: a [`Producer`](deferred::Producer) / [`Consumer`](deferred::Consumer)
//!   pair. Any holder of the producer may resolve or reject; every consumer
//!   observes the same outcome.
//! - [`barrier`]: a fixed number of deferred slots settled by index, with
//!   joint `all` and `race` waits.
//! - [`settle_pool`]: a self-pruning registry of in-flight operations with an
//!   `all_settled` wait over the ones pending at call time.
//!
//! The remaining modules are small synchronous helpers.
//!
//! # Examples
//!
//! ```
//! use promise_kit::{Promise, deferred::Producer};
//! use futures::executor::block_on;
//! use std::thread;
//! let (promise, consumer) = Producer::<String, String>::new();
//! let task = thread::spawn(move || block_on(consumer));
//! promise.resolve("Hi".into());
//! assert_eq!(task.join().unwrap(), Ok("Hi".to_string()));
//! ```
use std::future::Future;
use thiserror::Error;

pub mod barrier;
pub mod commons;
pub mod deferred;
pub mod math;
pub mod sequence;
pub mod settle_pool;

pub use barrier::Barrier;
pub use deferred::{Consumer, Producer};
pub use settle_pool::SettlePool;

/// Errors raised synchronously at the call site.
///
/// A rejected promise never produces one of these; rejections travel as the
/// caller's own error type inside `Result<T, E>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotAnInteger(String),
    #[error("{0}")]
    OutOfRange(String),
}

/// The settling side of a promise.
pub trait Promise {
    type Output;
    type Error;
    type Waiter: Future<Output = Result<Self::Output, Self::Error>>;

    /// Creates an unsettled promise and a waiter for it.
    fn new() -> (Self, Self::Waiter)
    where
        Self: Sized;

    /// Fulfills the promise. Returns `false` if it was already settled.
    fn resolve(&self, value: Self::Output) -> bool;

    /// Rejects the promise. Returns `false` if it was already settled.
    fn reject(&self, err: Self::Error) -> bool;
}
