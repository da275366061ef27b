use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Ack, AsyncAck, Signal};

/// A countdown latch that resolves an acknowledgment once every acquired
/// permit has been counted down.
///
/// Fan-out code starts with one permit for itself, acquires one per pending
/// downstream ack and counts down as they settle. The final `countdown` of the
/// initial permit closes the latch.
pub struct PromiseCounter {
  value: Signal,
  counter: AtomicUsize,
  promise: AsyncAck,
}

impl PromiseCounter {
  pub fn new(value: Signal, initial: usize) -> Self {
    let promise = AsyncAck::new();
    if initial == 0 {
      promise.resolve(value);
    }
    PromiseCounter { value, counter: AtomicUsize::new(initial), promise }
  }

  pub fn acquire(&self) { self.counter.fetch_add(1, Ordering::AcqRel); }

  pub fn countdown(&self) {
    if self.counter.fetch_sub(1, Ordering::AcqRel) == 1 {
      self.promise.resolve(self.value);
    }
  }

  /// The ack that settles when the count reaches zero.
  pub fn ack(&self) -> Ack {
    match self.promise.settled() {
      Some(signal) => signal.into(),
      None => Ack::Pending(self.promise.clone()),
    }
  }
}
