//! Test doubles for observers and sources.
//!
//! [`TestObserver`] records what it receives and answers with a configurable
//! ack; [`TestSource`] hands the subscribed observer back to the test so it
//! can push items by hand and inspect the acks it gets.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

use crate::{
  ack::{Ack, AsyncAck, Signal},
  disposable::{BooleanDisposable, BoxedDisposable, Disposable},
  error::RxError,
  observable::Observable,
  observer::{Observer, SharedObserver},
  scheduler::SharedScheduler,
};

// ==================== TestObserver ====================

/// How a [`TestObserver`] answers `on_next`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckMode {
  Continue,
  /// `Continue` until `n` items arrived, then `Stop`.
  StopAfter(usize),
  /// A pending ack per item, settled by [`TestObserver::resolve_next`].
  Manual,
}

struct Record<T> {
  items: Vec<T>,
  error: Option<RxError>,
  completed: bool,
  terminals: usize,
  pending: VecDeque<AsyncAck>,
}

/// A recording observer. Clones share the same record.
pub struct TestObserver<T> {
  record: Arc<Mutex<Record<T>>>,
  mode: AckMode,
}

impl<T> Clone for TestObserver<T> {
  fn clone(&self) -> Self { TestObserver { record: self.record.clone(), mode: self.mode } }
}

impl<T> Default for TestObserver<T> {
  fn default() -> Self { Self::with_mode(AckMode::Continue) }
}

impl<T> TestObserver<T> {
  pub fn new() -> Self { Self::default() }

  pub fn stop_after(n: usize) -> Self { Self::with_mode(AckMode::StopAfter(n)) }

  pub fn manual() -> Self { Self::with_mode(AckMode::Manual) }

  pub fn with_mode(mode: AckMode) -> Self {
    let record = Record {
      items: vec![],
      error: None,
      completed: false,
      terminals: 0,
      pending: VecDeque::new(),
    };
    TestObserver { record: Arc::new(Mutex::new(record)), mode }
  }

  pub fn items(&self) -> Vec<T>
  where
    T: Clone,
  {
    self.record.lock().items.clone()
  }

  pub fn item_count(&self) -> usize { self.record.lock().items.len() }

  pub fn error(&self) -> Option<RxError> { self.record.lock().error.clone() }

  pub fn is_completed(&self) -> bool { self.record.lock().completed }

  /// Number of `on_error` plus `on_completed` calls received.
  pub fn terminal_count(&self) -> usize { self.record.lock().terminals }

  /// Unsettled acks handed out in [`AckMode::Manual`].
  pub fn pending_count(&self) -> usize { self.record.lock().pending.len() }

  /// Settle the oldest pending ack. Returns `false` when none is pending.
  pub fn resolve_next(&self, signal: Signal) -> bool {
    let ack = self.record.lock().pending.pop_front();
    match ack {
      Some(ack) => {
        ack.resolve(signal);
        true
      }
      None => false,
    }
  }
}

impl<T: Send> Observer<T> for TestObserver<T> {
  fn on_next(&self, item: T) -> Ack {
    let mut record = self.record.lock();
    record.items.push(item);
    match self.mode {
      AckMode::Continue => Ack::Continue,
      AckMode::StopAfter(n) if record.items.len() >= n => Ack::Stop,
      AckMode::StopAfter(_) => Ack::Continue,
      AckMode::Manual => {
        let ack = AsyncAck::new();
        record.pending.push_back(ack.clone());
        Ack::Pending(ack)
      }
    }
  }

  fn on_error(&self, err: RxError) {
    let mut record = self.record.lock();
    record.error = Some(err);
    record.terminals += 1;
  }

  fn on_completed(&self) {
    let mut record = self.record.lock();
    record.completed = true;
    record.terminals += 1;
  }
}

// ==================== TestSource ====================

struct SourceState<T> {
  observer: Option<SharedObserver<T>>,
  subscriptions: usize,
}

/// An observable driven by the test. Only the latest subscriber is kept.
pub struct TestSource<T> {
  state: Arc<Mutex<SourceState<T>>>,
  disposed: BooleanDisposable,
}

impl<T> Clone for TestSource<T> {
  fn clone(&self) -> Self { TestSource { state: self.state.clone(), disposed: self.disposed.clone() } }
}

impl<T> Default for TestSource<T> {
  fn default() -> Self {
    TestSource {
      state: Arc::new(Mutex::new(SourceState { observer: None, subscriptions: 0 })),
      disposed: BooleanDisposable::new(),
    }
  }
}

impl<T> TestSource<T> {
  pub fn new() -> Self { Self::default() }

  fn observer(&self) -> Option<SharedObserver<T>> { self.state.lock().observer.clone() }

  /// Push an item; `Stop` when nobody is subscribed.
  pub fn on_next(&self, item: T) -> Ack {
    match self.observer() {
      Some(observer) => observer.on_next(item),
      None => Ack::Stop,
    }
  }

  pub fn on_error(&self, err: RxError) {
    if let Some(observer) = self.observer() {
      observer.on_error(err);
    }
  }

  pub fn on_completed(&self) {
    if let Some(observer) = self.observer() {
      observer.on_completed();
    }
  }

  pub fn is_subscribed(&self) -> bool { self.state.lock().observer.is_some() }

  pub fn subscription_count(&self) -> usize { self.state.lock().subscriptions }

  /// Whether the subscription handle was disposed.
  pub fn is_disposed(&self) -> bool { self.disposed.is_disposed() }
}

impl<T: Send + 'static> Observable for TestSource<T> {
  type Item = T;

  fn unsafe_subscribe(
    &self, observer: SharedObserver<T>, _: &SharedScheduler, _: &SharedScheduler,
  ) -> BoxedDisposable {
    let mut state = self.state.lock();
    state.observer = Some(observer);
    state.subscriptions += 1;
    Box::new(self.disposed.clone())
  }
}
