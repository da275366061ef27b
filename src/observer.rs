//! Observer trait and implementations
//!
//! The Observer trait defines the consumer of data in the reactive pattern.
//! It provides three methods: `on_next` (for values), `on_error` (for errors),
//! and `on_completed` (for stream completion).
//!
//! Unlike classic Rx observers, `on_next` returns an [`Ack`]. The producer
//! waits for it before sending the next value; this is the back-pressure
//! contract every component of the crate honours.

use std::sync::Arc;

use crate::{ack::Ack, error::RxError};

// ============================================================================
// Observer Trait
// ============================================================================

/// Observer trait: the consumer of data in reactive programming.
///
/// Observers are shared between threads, so every method takes `&self`.
/// Callers guarantee that after `Stop` was returned, or after `on_error` /
/// `on_completed` was delivered, no further `on_next` arrives from the same
/// production cycle.
pub trait Observer<Item>: Send + Sync {
  /// Receive the next value. The returned ack gates the next call.
  fn on_next(&self, item: Item) -> Ack;

  /// Receive a terminal error.
  fn on_error(&self, err: RxError);

  /// Receive the terminal completion.
  fn on_completed(&self);
}

/// The observer handle passed through subscriptions.
pub type SharedObserver<Item> = Arc<dyn Observer<Item>>;

impl<Item, O> Observer<Item> for Arc<O>
where
  O: Observer<Item> + ?Sized,
{
  #[inline]
  fn on_next(&self, item: Item) -> Ack { (**self).on_next(item) }

  #[inline]
  fn on_error(&self, err: RxError) { (**self).on_error(err) }

  #[inline]
  fn on_completed(&self) { (**self).on_completed() }
}

// ============================================================================
// AnonymousObserver - Closure adapter
// ============================================================================

type ErrorFn = Box<dyn Fn(RxError) + Send + Sync>;
type CompletedFn = Box<dyn Fn() + Send + Sync>;

/// An observer assembled from closures. Errors and completion are ignored
/// unless handlers are attached.
pub struct AnonymousObserver<F> {
  next: F,
  error: Option<ErrorFn>,
  completed: Option<CompletedFn>,
}

impl<F> AnonymousObserver<F> {
  pub fn new(next: F) -> Self { AnonymousObserver { next, error: None, completed: None } }

  pub fn with_error(mut self, f: impl Fn(RxError) + Send + Sync + 'static) -> Self {
    self.error = Some(Box::new(f));
    self
  }

  pub fn with_completed(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
    self.completed = Some(Box::new(f));
    self
  }
}

impl<Item, F> Observer<Item> for AnonymousObserver<F>
where
  F: Fn(Item) -> Ack + Send + Sync,
{
  #[inline]
  fn on_next(&self, item: Item) -> Ack { (self.next)(item) }

  fn on_error(&self, err: RxError) {
    match &self.error {
      Some(f) => f(err),
      None => tracing::debug!(%err, "error reached an observer without an error handler"),
    }
  }

  fn on_completed(&self) {
    if let Some(f) = &self.completed {
      f();
    }
  }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
  use parking_lot::Mutex;

  use super::*;

  #[test]
  fn closure_as_observer() {
    let sum = Arc::new(Mutex::new(0));
    let done = Arc::new(Mutex::new(false));
    let (c_sum, c_done) = (sum.clone(), done.clone());

    let observer: SharedObserver<i32> = Arc::new(
      AnonymousObserver::new(move |v: i32| {
        *c_sum.lock() += v;
        Ack::Continue
      })
      .with_completed(move || *c_done.lock() = true),
    );

    assert!(observer.on_next(10).is_continue());
    assert!(observer.on_next(20).is_continue());
    observer.on_completed();
    assert_eq!(*sum.lock(), 30);
    assert!(*done.lock());
  }

  #[test]
  fn error_handler() {
    let seen = Arc::new(Mutex::new(None));
    let c_seen = seen.clone();
    let observer =
      AnonymousObserver::new(|_: ()| Ack::Stop).with_error(move |e| *c_seen.lock() = Some(e));
    Observer::<()>::on_error(&observer, RxError::msg("bad"));
    assert_eq!(*seen.lock(), Some(RxError::msg("bad")));
  }
}
