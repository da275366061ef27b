//! Zip operator implementation
//!
//! Zip combines items from two observables strictly pairwise: the n-th item of
//! the left source is combined with the n-th item of the right source. Each
//! side holds at most one unpaired item; the side that arrives first gets a
//! pending ack that settles with the downstream ack of the pair it joins.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
  ack::{Ack, AsyncAck, Signal},
  disposable::{BoxedDisposable, CompositeDisposable, Disposable},
  error::RxError,
  observable::Observable,
  observer::{Observer, SharedObserver},
  scheduler::SharedScheduler,
};

// ==================== Zip2 Operator ====================

/// Zip operator, see [`ObservableExt::zip2`](crate::observable::ObservableExt).
///
/// Emissions are strictly ordered: a pair is only pushed downstream once the
/// ack of the previous pair settled to `Continue`. Completing a side while
/// its own item is still unpaired completes the output right after that item
/// is paired.
pub struct Zip2<L, R, F> {
  left: L,
  right: R,
  selector: Arc<F>,
}

impl<L, R, F> Zip2<L, R, F> {
  pub(crate) fn new(left: L, right: R, selector: F) -> Self {
    Zip2 { left, right, selector: Arc::new(selector) }
  }
}

impl<L: Clone, R: Clone, F> Clone for Zip2<L, R, F> {
  fn clone(&self) -> Self {
    Zip2 { left: self.left.clone(), right: self.right.clone(), selector: self.selector.clone() }
  }
}

impl<L, R, F, Out> Observable for Zip2<L, R, F>
where
  L: Observable,
  R: Observable,
  F: Fn(L::Item, R::Item) -> Result<Out, RxError> + Send + Sync + 'static,
  Out: Send + 'static,
{
  type Item = Out;

  fn unsafe_subscribe(
    &self, observer: SharedObserver<Out>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> BoxedDisposable {
    let core = Arc::new(ZipCore {
      observer,
      selector: self.selector.clone(),
      scheduler: scheduler.clone(),
      state: Mutex::new(ZipState {
        slot: Slot::Empty,
        left_completed: false,
        right_completed: false,
        completing: false,
        done: false,
        last_ack: Ack::Continue,
      }),
      upstreams: CompositeDisposable::new(),
    });

    let left = self.left.unsafe_subscribe(
      Arc::new(ZipLeft(core.clone())),
      scheduler,
      subscribe_scheduler,
    );
    core.upstreams.add(left);
    let right = self.right.unsafe_subscribe(
      Arc::new(ZipRight(core.clone())),
      scheduler,
      subscribe_scheduler,
    );
    core.upstreams.add(right);
    Box::new(core.upstreams.clone())
  }
}

// ==================== Shared State ====================

/// The unpaired item, with the ack its producer is waiting on.
enum Slot<L, R> {
  Empty,
  Left(L, AsyncAck),
  Right(R, AsyncAck),
}

enum Arrival<L, R> {
  Left(L),
  Right(R),
}

struct ZipState<L, R> {
  slot: Slot<L, R>,
  left_completed: bool,
  right_completed: bool,
  /// A side completed; the pairs already formed are still delivered.
  completing: bool,
  /// Terminated or cancelled.
  done: bool,
  /// Ack of the most recent pair; the next pair is emitted after it.
  last_ack: Ack,
}

struct ZipCore<L, R, F, Out> {
  observer: SharedObserver<Out>,
  selector: Arc<F>,
  scheduler: SharedScheduler,
  state: Mutex<ZipState<L, R>>,
  upstreams: CompositeDisposable,
}

impl<L, R, F, Out> ZipCore<L, R, F, Out>
where
  L: Send + 'static,
  R: Send + 'static,
  F: Fn(L, R) -> Result<Out, RxError> + Send + Sync + 'static,
  Out: Send + 'static,
{
  fn on_arrival(self: &Arc<Self>, arrival: Arrival<L, R>) -> Ack {
    let mut state = self.state.lock();
    if state.done || state.completing {
      return Ack::Stop;
    }

    let held = std::mem::replace(&mut state.slot, Slot::Empty);
    let (left, right, wait, complete_after) = match (held, arrival) {
      (Slot::Empty, Arrival::Left(left)) => {
        let wait = AsyncAck::new();
        state.slot = Slot::Left(left, wait.clone());
        return Ack::Pending(wait);
      }
      (Slot::Empty, Arrival::Right(right)) => {
        let wait = AsyncAck::new();
        state.slot = Slot::Right(right, wait.clone());
        return Ack::Pending(wait);
      }
      (Slot::Right(right, wait), Arrival::Left(left)) => {
        (left, right, wait, state.right_completed)
      }
      (Slot::Left(left, wait), Arrival::Right(right)) => {
        (left, right, wait, state.left_completed)
      }
      (held, _) => {
        state.slot = held;
        drop(state);
        self
          .scheduler
          .report_failure(RxError::Protocol("zip source emitted before its previous item was paired"));
        self.cancel();
        return Ack::Stop;
      }
    };

    let out = AsyncAck::new();
    let prev = std::mem::replace(&mut state.last_ack, Ack::Pending(out.clone()));
    drop(state);

    let replies = [out.clone(), wait];
    match prev.settled() {
      Some(Signal::Continue) => self.push_pair(left, right, replies, complete_after),
      Some(Signal::Stop) => resolve_all(replies, Signal::Stop),
      None => {
        let this = self.clone();
        prev.on_settled_scheduled(&self.scheduler, move |signal| match signal {
          Signal::Continue => this.push_pair(left, right, replies, complete_after),
          Signal::Stop => resolve_all(replies, Signal::Stop),
        });
      }
    }
    Ack::Pending(out)
  }

  fn push_pair(self: &Arc<Self>, left: L, right: R, replies: [AsyncAck; 2], complete_after: bool) {
    if self.state.lock().done {
      resolve_all(replies, Signal::Stop);
      return;
    }

    let value = match (self.selector)(left, right) {
      Ok(value) => value,
      Err(err) => {
        resolve_all(replies, Signal::Stop);
        self.fail(err);
        return;
      }
    };

    let ack = self.observer.on_next(value);
    if complete_after {
      let completes = {
        let mut state = self.state.lock();
        !std::mem::replace(&mut state.done, true)
      };
      resolve_all(replies, Signal::Stop);
      if completes && !ack.is_stop() {
        tracing::trace!("zip completed after pairing the last held item");
        self.observer.on_completed();
      }
      self.upstreams.dispose();
      return;
    }

    let this = self.clone();
    ack.on_settled(move |signal| {
      resolve_all(replies, signal);
      if signal == Signal::Stop {
        this.cancel();
      }
    });
  }

  fn on_side_completed(self: &Arc<Self>, left_side: bool) {
    let mut state = self.state.lock();
    if state.done || state.completing {
      return;
    }
    if left_side {
      state.left_completed = true;
    } else {
      state.right_completed = true;
    }
    let own_item_held = matches!(
      (&state.slot, left_side),
      (Slot::Left(..), true) | (Slot::Right(..), false)
    );
    if own_item_held {
      return;
    }

    state.completing = true;
    let held = std::mem::replace(&mut state.slot, Slot::Empty);
    let last = state.last_ack.clone();
    drop(state);

    if let Slot::Left(_, wait) | Slot::Right(_, wait) = held {
      wait.resolve(Signal::Stop);
    }
    // `last` belongs to the newest pair, which may still wait to be emitted.
    let this = self.clone();
    last.on_settled(move |signal| {
      let completes = !std::mem::replace(&mut this.state.lock().done, true);
      if completes && signal == Signal::Continue {
        this.observer.on_completed();
      }
      this.upstreams.dispose();
    });
  }

  fn fail(&self, err: RxError) {
    if !self.shut_down() {
      return;
    }
    self.observer.on_error(err);
    self.upstreams.dispose();
  }

  /// The downstream stopped, or the subscription broke; no terminal
  /// notification is sent.
  fn cancel(&self) {
    self.shut_down();
    self.upstreams.dispose();
  }

  /// Mark the zip done and release the held producer. Returns `false` if it
  /// already was.
  fn shut_down(&self) -> bool {
    let held = {
      let mut state = self.state.lock();
      if std::mem::replace(&mut state.done, true) {
        return false;
      }
      std::mem::replace(&mut state.slot, Slot::Empty)
    };
    if let Slot::Left(_, wait) | Slot::Right(_, wait) = held {
      wait.resolve(Signal::Stop);
    }
    true
  }
}

fn resolve_all(replies: [AsyncAck; 2], signal: Signal) {
  for reply in replies {
    reply.resolve(signal);
  }
}

// ==================== Observer Structs ====================

struct ZipLeft<L, R, F, Out>(Arc<ZipCore<L, R, F, Out>>);

struct ZipRight<L, R, F, Out>(Arc<ZipCore<L, R, F, Out>>);

impl<L, R, F, Out> Observer<L> for ZipLeft<L, R, F, Out>
where
  L: Send + 'static,
  R: Send + 'static,
  F: Fn(L, R) -> Result<Out, RxError> + Send + Sync + 'static,
  Out: Send + 'static,
{
  fn on_next(&self, item: L) -> Ack { self.0.on_arrival(Arrival::Left(item)) }

  fn on_error(&self, err: RxError) { self.0.fail(err); }

  fn on_completed(&self) { self.0.on_side_completed(true); }
}

impl<L, R, F, Out> Observer<R> for ZipRight<L, R, F, Out>
where
  L: Send + 'static,
  R: Send + 'static,
  F: Fn(L, R) -> Result<Out, RxError> + Send + Sync + 'static,
  Out: Send + 'static,
{
  fn on_next(&self, item: R) -> Ack { self.0.on_arrival(Arrival::Right(item)) }

  fn on_error(&self, err: RxError) { self.0.fail(err); }

  fn on_completed(&self) { self.0.on_side_completed(false); }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    observable::{from_iter, repeat_value, ObservableExt},
    scheduler::{TestScheduler, TrampolineScheduler},
    testing::{TestObserver, TestSource},
  };

  fn trampoline() -> SharedScheduler { Arc::new(TrampolineScheduler::new()) }

  fn sources() -> (TestSource<i32>, TestSource<i32>) { (TestSource::new(), TestSource::new()) }

  #[test]
  fn pairs_in_arrival_order() {
    let sch = trampoline();
    let (left, right) = sources();
    let observer = TestObserver::new();
    left.clone().zip2(right.clone()).subscribe(observer.clone(), &sch, &sch);

    let first = left.on_next(1);
    assert_eq!(first.settled(), None);
    assert!(right.on_next(2).is_continue());
    assert!(first.is_continue());

    // Right leads this time.
    let second = right.on_next(4);
    assert!(left.on_next(3).is_continue());
    assert!(second.is_continue());

    assert_eq!(observer.items(), vec![(1, 2), (3, 4)]);
  }

  #[test]
  fn pending_ack_gates_next_pair() {
    let sch = trampoline();
    let (left, right) = sources();
    let observer = TestObserver::manual();
    left.clone().zip2(right.clone()).subscribe(observer.clone(), &sch, &sch);

    left.on_next(1);
    let ack = right.on_next(2);
    assert_eq!(ack.settled(), None);
    assert_eq!(observer.items(), vec![(1, 2)]);

    // Even if both sides push again, nothing is emitted before the ack.
    left.on_next(3);
    right.on_next(4);
    assert_eq!(observer.items(), vec![(1, 2)]);

    observer.resolve_next(Signal::Continue);
    assert!(ack.is_continue());
    assert_eq!(observer.items(), vec![(1, 2), (3, 4)]);

    observer.resolve_next(Signal::Stop);
    assert!(left.is_disposed() && right.is_disposed());
    assert!(left.on_next(5).is_stop());
    assert_eq!(observer.items().len(), 2);
  }

  #[test]
  fn completion_waits_for_held_item() {
    let sch = trampoline();
    let (left, right) = sources();
    let observer = TestObserver::new();
    left.clone().zip2(right.clone()).subscribe(observer.clone(), &sch, &sch);

    left.on_next(1);
    left.on_completed();
    assert!(!observer.is_completed());

    assert!(right.on_next(2).is_stop());
    assert_eq!(observer.items(), vec![(1, 2)]);
    assert!(observer.is_completed());
  }

  #[test]
  fn completion_drops_other_sides_item() {
    let sch = trampoline();
    let (left, right) = sources();
    let observer = TestObserver::new();
    left.clone().zip2(right.clone()).subscribe(observer.clone(), &sch, &sch);

    let held = right.on_next(2);
    left.on_completed();
    assert!(held.is_stop());
    assert!(observer.items().is_empty());
    assert!(observer.is_completed());
    assert!(right.is_disposed());
  }

  #[test]
  fn completion_waits_for_last_ack() {
    let sch = trampoline();
    let (left, right) = sources();
    let observer = TestObserver::manual();
    left.clone().zip2(right.clone()).subscribe(observer.clone(), &sch, &sch);

    left.on_next(1);
    right.on_next(2);
    right.on_completed();
    assert!(!observer.is_completed());

    observer.resolve_next(Signal::Continue);
    assert!(observer.is_completed());
  }

  #[test]
  fn completion_waits_for_deferred_pair() {
    let sch = trampoline();
    let (left, right) = sources();
    let observer = TestObserver::manual();
    left.clone().zip2(right.clone()).subscribe(observer.clone(), &sch, &sch);

    left.on_next(1);
    right.on_next(2);
    left.on_next(3);
    let deferred = right.on_next(4);
    left.on_completed();
    assert_eq!(observer.items(), vec![(1, 2)]);
    assert!(!observer.is_completed());

    while observer.resolve_next(Signal::Continue) {}
    assert_eq!(observer.items(), vec![(1, 2), (3, 4)]);
    assert!(deferred.is_continue());
    assert!(observer.is_completed());
    assert_eq!(observer.terminal_count(), 1);
    assert!(right.is_disposed());
  }

  #[test]
  fn completion_after_stop_is_dropped() {
    let sch = trampoline();
    let (left, right) = sources();
    let observer = TestObserver::manual();
    left.clone().zip2(right.clone()).subscribe(observer.clone(), &sch, &sch);

    left.on_next(1);
    right.on_next(2);
    observer.resolve_next(Signal::Stop);
    right.on_completed();
    assert_eq!(observer.terminal_count(), 0);
  }

  #[test]
  fn error_terminates() {
    let sch = trampoline();
    let (left, right) = sources();
    let observer = TestObserver::new();
    left.clone().zip2(right.clone()).subscribe(observer.clone(), &sch, &sch);

    let held = left.on_next(1);
    right.on_error(RxError::msg("right failed"));
    assert!(held.is_stop());
    assert_eq!(observer.error(), Some(RxError::msg("right failed")));
    assert!(left.is_disposed());

    assert!(right.on_next(9).is_stop());
    left.on_completed();
    assert_eq!(observer.terminal_count(), 1);
  }

  #[test]
  fn selector_error_becomes_on_error() {
    let sch = trampoline();
    let (left, right) = sources();
    let observer = TestObserver::new();
    left
      .clone()
      .zip2_with(right.clone(), |l: i32, r: i32| {
        if r == 0 { Err(RxError::msg("division by zero")) } else { Ok(l / r) }
      })
      .subscribe(observer.clone(), &sch, &sch);

    left.on_next(6);
    assert!(right.on_next(3).is_continue());
    left.on_next(1);
    assert!(right.on_next(0).is_stop());
    assert_eq!(observer.items(), vec![2]);
    assert_eq!(observer.error(), Some(RxError::msg("division by zero")));
    assert!(left.is_disposed());
  }

  #[test]
  fn double_emission_is_reported() {
    let test_scheduler = TestScheduler::new();
    let sch: SharedScheduler = Arc::new(test_scheduler.clone());
    let (left, right) = sources();
    let observer = TestObserver::new();
    left.clone().zip2(right.clone()).unsafe_subscribe(Arc::new(observer.clone()), &sch, &sch);

    let first = left.on_next(1);
    assert!(left.on_next(2).is_stop());
    assert!(first.is_stop());
    assert!(test_scheduler.failures()[0].is_protocol_violation());
    assert!(right.is_disposed());
  }

  #[tracing_test::traced_test]
  #[test]
  fn double_emission_is_logged() {
    let sch = trampoline();
    let (left, right) = sources();
    left.clone().zip2(right).subscribe(TestObserver::new(), &sch, &sch);

    left.on_next(1);
    left.on_next(2);
    assert!(logs_contain("unhandled failure"));
    assert!(logs_contain("zip source emitted before its previous item was paired"));
  }

  #[test]
  fn iterator_against_repeated_value() {
    let sch = trampoline();
    let observer = TestObserver::new();
    from_iter(vec![1, 2, 3].into_iter().cycle().take(10))
      .zip2(repeat_value('x'))
      .subscribe(observer.clone(), &sch, &sch);

    let expected: Vec<_> = (0..10).map(|i| ([1, 2, 3][i % 3], 'x')).collect();
    assert_eq!(observer.items(), expected);
    assert!(observer.is_completed());
  }
}
