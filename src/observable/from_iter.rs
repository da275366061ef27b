use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
  ack::{Ack, Signal},
  disposable::{BooleanDisposable, BoxedDisposable, Disposable},
  observable::Observable,
  observer::SharedObserver,
  scheduler::SharedScheduler,
};

/// Creates an observable that produces values from an iterator.
///
/// Every subscription iterates its own clone of `iter`. Items are pushed
/// synchronously while the observer keeps answering `Continue`; a pending
/// ack suspends the loop until it settles, and long runs yield to the
/// scheduler according to its execution model.
///
/// ```
/// use std::sync::Arc;
/// use rxbackpressure::prelude::*;
///
/// let scheduler: SharedScheduler = Arc::new(TrampolineScheduler::new());
/// let observer = TestObserver::new();
/// observable::from_iter(vec![1, 2, 3]).subscribe(observer.clone(), &scheduler, &scheduler);
/// assert_eq!(observer.items(), vec![1, 2, 3]);
/// assert!(observer.is_completed());
/// ```
pub fn from_iter<I>(iter: I) -> FromIter<I>
where
  I: IntoIterator,
{
  FromIter(iter)
}

/// Emits `value` forever.
pub fn repeat_value<T: Clone>(value: T) -> FromIter<std::iter::Repeat<T>> {
  from_iter(std::iter::repeat(value))
}

/// Emits `value` once, then completes.
pub fn just<T: Clone>(value: T) -> FromIter<std::iter::Once<T>> { from_iter(std::iter::once(value)) }

#[derive(Clone)]
pub struct FromIter<I>(I);

impl<I> Observable for FromIter<I>
where
  I: IntoIterator + Clone + Send + Sync,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
{
  type Item = I::Item;

  fn unsafe_subscribe(
    &self, observer: SharedObserver<Self::Item>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> BoxedDisposable {
    let feed = IteratorFeed::new(self.0.clone().into_iter(), observer, scheduler.clone());
    let handle = feed.handle();
    subscribe_scheduler.schedule(Box::new(move || feed.start()));
    Box::new(handle)
  }
}

// ==================== Feed ====================

/// Pushes an iterator into an observer, honouring acknowledgments.
///
/// One element of lookahead lets the last element be followed by
/// `on_completed` without waiting for its ack.
pub(crate) struct IteratorFeed<I: Iterator> {
  iter: Mutex<Option<I>>,
  observer: SharedObserver<I::Item>,
  scheduler: SharedScheduler,
  disposed: BooleanDisposable,
}

impl<I> IteratorFeed<I>
where
  I: Iterator + Send + 'static,
  I::Item: Send + 'static,
{
  pub(crate) fn new(iter: I, observer: SharedObserver<I::Item>, scheduler: SharedScheduler) -> Arc<Self> {
    Arc::new(IteratorFeed {
      iter: Mutex::new(Some(iter)),
      observer,
      scheduler,
      disposed: BooleanDisposable::new(),
    })
  }

  /// Disposing the handle stops the feed before its next item.
  pub(crate) fn handle(&self) -> BooleanDisposable { self.disposed.clone() }

  pub(crate) fn start(self: Arc<Self>) {
    if self.disposed.is_disposed() {
      self.finish();
      return;
    }
    match self.pull() {
      Some(first) => self.fast_loop(first, 0),
      None => {
        self.observer.on_completed();
        self.finish();
      }
    }
  }

  fn pull(&self) -> Option<I::Item> { self.iter.lock().as_mut()?.next() }

  fn fast_loop(self: Arc<Self>, mut item: I::Item, mut frame: usize) {
    let execution_model = self.scheduler.execution_model();
    loop {
      if self.disposed.is_disposed() {
        self.finish();
        return;
      }

      let next = self.pull();
      let ack = self.observer.on_next(item);
      let Some(next) = next else {
        if !ack.is_stop() {
          self.observer.on_completed();
        }
        self.finish();
        return;
      };
      item = next;

      match ack.settled() {
        Some(Signal::Continue) => {
          frame = execution_model.next_frame_index(frame);
          if frame == 0 {
            let scheduler = self.scheduler.clone();
            scheduler.schedule(Box::new(move || self.fast_loop(item, 0)));
            return;
          }
        }
        Some(Signal::Stop) => {
          self.finish();
          return;
        }
        None => {
          self.resume_on(ack, item);
          return;
        }
      }
    }
  }

  fn resume_on(self: Arc<Self>, ack: Ack, item: I::Item) {
    let scheduler = self.scheduler.clone();
    ack.on_settled_scheduled(&scheduler, move |signal| match signal {
      Signal::Continue => self.fast_loop(item, 0),
      Signal::Stop => self.finish(),
    });
  }

  fn finish(&self) {
    self.disposed.dispose();
    let iter = self.iter.lock().take();
    drop(iter);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    scheduler::{ExecutionModel, TestScheduler, TrampolineScheduler},
    testing::TestObserver,
  };

  fn trampoline() -> SharedScheduler { Arc::new(TrampolineScheduler::new()) }

  #[test]
  fn from_range() {
    let scheduler = trampoline();
    let observer = TestObserver::new();
    from_iter(0..100).subscribe(observer.clone(), &scheduler, &scheduler);

    assert_eq!(observer.items().len(), 100);
    assert!(observer.is_completed());
    assert_eq!(observer.terminal_count(), 1);
  }

  #[test]
  fn empty_iterator_completes() {
    let scheduler = trampoline();
    let observer = TestObserver::<i32>::new();
    from_iter(vec![]).subscribe(observer.clone(), &scheduler, &scheduler);
    assert!(observer.items().is_empty());
    assert!(observer.is_completed());
  }

  #[test]
  fn stop_ends_the_feed() {
    let scheduler = trampoline();
    let observer = TestObserver::stop_after(3);
    repeat_value(7).subscribe(observer.clone(), &scheduler, &scheduler);

    assert_eq!(observer.items(), vec![7, 7, 7]);
    assert!(!observer.is_completed());
  }

  #[test]
  fn waits_for_pending_ack() {
    let scheduler = trampoline();
    let observer = TestObserver::manual();
    from_iter(1..=3).subscribe(observer.clone(), &scheduler, &scheduler);
    assert_eq!(observer.items(), vec![1]);

    assert!(observer.resolve_next(Signal::Continue));
    assert_eq!(observer.items(), vec![1, 2]);
    assert!(!observer.is_completed());

    assert!(observer.resolve_next(Signal::Continue));
    assert_eq!(observer.items(), vec![1, 2, 3]);
    assert!(observer.is_completed());
  }

  #[test]
  fn last_item_completes_without_waiting() {
    let scheduler = trampoline();
    let observer = TestObserver::manual();
    just("only").subscribe(observer.clone(), &scheduler, &scheduler);
    assert_eq!(observer.items(), vec!["only"]);
    assert!(observer.is_completed());
  }

  #[test]
  fn dispose_between_items() {
    let scheduler = trampoline();
    let observer = TestObserver::manual();
    let handle = from_iter(0..10).subscribe(observer.clone(), &scheduler, &scheduler);
    assert_eq!(observer.items(), vec![0]);

    handle.dispose();
    observer.resolve_next(Signal::Continue);
    assert_eq!(observer.items(), vec![0]);
    assert!(!observer.is_completed());
  }

  #[test]
  fn yields_every_batch() {
    let test_scheduler = TestScheduler::with_execution_model(ExecutionModel::Batched(4));
    let scheduler: SharedScheduler = Arc::new(test_scheduler.clone());
    let observer = TestObserver::new();
    from_iter(0..10).unsafe_subscribe(Arc::new(observer.clone()), &scheduler, &scheduler);
    assert!(observer.items().is_empty());

    test_scheduler.run_next();
    assert_eq!(observer.items().len(), 4);
    test_scheduler.run_next();
    assert_eq!(observer.items().len(), 8);
    test_scheduler.run_next();
    assert_eq!(observer.items(), (0..10).collect::<Vec<_>>());
    assert!(observer.is_completed());
    assert!(test_scheduler.is_empty());
  }
}
