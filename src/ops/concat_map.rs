//! ConcatMap operator
//!
//! Every outer item is mapped to an inner observable. Only one inner
//! observable is subscribed at a time: the outer producer is acknowledged
//! with the ack of the last inner item once the inner observable completed,
//! so the next outer item, and with it the next inner subscription, cannot
//! arrive earlier.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
  ack::{Ack, AsyncAck, Signal},
  disposable::{BoxedDisposable, CompositeDisposable, Disposable, SingleAssignmentDisposable},
  error::RxError,
  observable::Observable,
  observer::{Observer, SharedObserver},
  scheduler::SharedScheduler,
};

/// ConcatMap operator, see
/// [`ObservableExt::concat_map`](crate::observable::ObservableExt).
pub struct ConcatMap<S, F> {
  source: S,
  selector: Arc<F>,
}

impl<S, F> ConcatMap<S, F> {
  pub(crate) fn new(source: S, selector: F) -> Self { ConcatMap { source, selector: Arc::new(selector) } }
}

impl<S: Clone, F> Clone for ConcatMap<S, F> {
  fn clone(&self) -> Self { ConcatMap { source: self.source.clone(), selector: self.selector.clone() } }
}

impl<S, F, Inner> Observable for ConcatMap<S, F>
where
  S: Observable,
  F: Fn(S::Item) -> Inner + Send + Sync + 'static,
  Inner: Observable + 'static,
{
  type Item = Inner::Item;

  fn unsafe_subscribe(
    &self, observer: SharedObserver<Inner::Item>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> BoxedDisposable {
    let core = Arc::new(ConcatCore {
      observer,
      selector: self.selector.clone(),
      scheduler: scheduler.clone(),
      subscribe_scheduler: subscribe_scheduler.clone(),
      state: Mutex::new(ConcatState { phase: Phase::WaitOnNextChild(Ack::Continue), reply: None }),
      subscription: CompositeDisposable::new(),
    });
    let outer = self.source.unsafe_subscribe(
      Arc::new(OuterObserver(core.clone())),
      scheduler,
      subscribe_scheduler,
    );
    core.subscription.add(outer);
    Box::new(core.subscription.clone())
  }
}

// ==================== State Machine ====================

enum Phase {
  /// Idle; holds the last ack of the previous child.
  WaitOnNextChild(Ack),
  /// An outer item arrived, its child is being subscribed.
  WaitOnActiveChild,
  /// A child is attached.
  Active,
  /// The outer source terminated, the active child drains first.
  WaitComplete(Option<RxError>),
  Cancelled,
}

struct ConcatState {
  phase: Phase,
  /// The ack handed to the outer producer for the running child.
  reply: Option<AsyncAck>,
}

struct ConcatCore<F, T> {
  observer: SharedObserver<T>,
  selector: Arc<F>,
  scheduler: SharedScheduler,
  subscribe_scheduler: SharedScheduler,
  state: Mutex<ConcatState>,
  subscription: CompositeDisposable,
}

impl<F, T> ConcatCore<F, T>
where
  T: Send + 'static,
{
  fn on_outer_next<Item, Inner>(self: &Arc<Self>, item: Item) -> Ack
  where
    F: Fn(Item) -> Inner + Send + Sync + 'static,
    Inner: Observable<Item = T>,
  {
    let reply = AsyncAck::new();
    {
      let mut state = self.state.lock();
      if matches!(state.phase, Phase::WaitComplete(_) | Phase::Cancelled) {
        return Ack::Stop;
      }
      if matches!(state.phase, Phase::WaitOnActiveChild | Phase::Active) {
        drop(state);
        self
          .scheduler
          .report_failure(RxError::Protocol("concat_map received an item while a child was running"));
        self.cancel();
        return Ack::Stop;
      }
      state.phase = Phase::WaitOnActiveChild;
      state.reply = Some(reply.clone());
    }

    let child = (self.selector)(item);
    let handle = SingleAssignmentDisposable::new();
    let Some(id) = self.subscription.add(handle.clone()) else {
      return Ack::Stop;
    };
    let child_observer = ChildObserver { core: self.clone(), id, last_ack: Mutex::new(Ack::Continue) };
    handle.set(child.unsafe_subscribe(
      Arc::new(child_observer),
      &self.scheduler,
      &self.subscribe_scheduler,
    ));

    let mut state = self.state.lock();
    if matches!(state.phase, Phase::WaitOnActiveChild) {
      state.phase = Phase::Active;
    }
    Ack::Pending(reply)
  }

  fn on_child_completed(&self, id: usize, last_ack: Ack) {
    let (previous, reply) = {
      let mut state = self.state.lock();
      let next = match &state.phase {
        Phase::Cancelled => return,
        Phase::WaitOnNextChild(_) => {
          tracing::debug!("concat_map child completed twice");
          return;
        }
        Phase::WaitComplete(_) => Phase::Cancelled,
        Phase::WaitOnActiveChild | Phase::Active => Phase::WaitOnNextChild(last_ack.clone()),
      };
      (std::mem::replace(&mut state.phase, next), state.reply.take())
    };
    self.subscription.remove(id);

    match previous {
      Phase::WaitOnActiveChild | Phase::Active => {
        if let Some(reply) = reply {
          last_ack.connect(reply);
        }
      }
      Phase::WaitComplete(err) => self.finish_after(last_ack, err),
      Phase::WaitOnNextChild(_) | Phase::Cancelled => {}
    }
  }

  fn on_outer_terminal(&self, err: Option<RxError>) {
    let mut state = self.state.lock();
    match std::mem::replace(&mut state.phase, Phase::Cancelled) {
      Phase::WaitOnNextChild(last_ack) => {
        drop(state);
        self.finish_after(last_ack, err);
      }
      Phase::WaitOnActiveChild | Phase::Active => {
        tracing::trace!("concat_map outer terminated, waiting for the active child");
        state.phase = Phase::WaitComplete(err);
      }
      previous @ (Phase::WaitComplete(_) | Phase::Cancelled) => state.phase = previous,
    }
  }

  /// Send the terminal notification once the last emission was accepted.
  fn finish_after(&self, last_ack: Ack, err: Option<RxError>) {
    let observer = self.observer.clone();
    let subscription = self.subscription.clone();
    last_ack.on_settled(move |signal| {
      if signal == Signal::Continue {
        match err {
          Some(err) => observer.on_error(err),
          None => observer.on_completed(),
        }
      }
      subscription.dispose();
    });
  }

  fn on_child_error(&self, err: RxError) {
    if self.shut_down() {
      self.observer.on_error(err);
      self.subscription.dispose();
    }
  }

  fn cancel(&self) {
    self.shut_down();
    self.subscription.dispose();
  }

  /// Enter `Cancelled` and stop the outer producer. Returns `false` if the
  /// operator was already cancelled.
  fn shut_down(&self) -> bool {
    let reply = {
      let mut state = self.state.lock();
      if matches!(state.phase, Phase::Cancelled) {
        return false;
      }
      state.phase = Phase::Cancelled;
      state.reply.take()
    };
    if let Some(reply) = reply {
      reply.resolve(Signal::Stop);
    }
    true
  }
}

// ==================== Observers ====================

struct OuterObserver<F, T>(Arc<ConcatCore<F, T>>);

impl<Item, F, Inner, T> Observer<Item> for OuterObserver<F, T>
where
  F: Fn(Item) -> Inner + Send + Sync + 'static,
  Inner: Observable<Item = T>,
  T: Send + 'static,
{
  fn on_next(&self, item: Item) -> Ack { self.0.on_outer_next(item) }

  fn on_error(&self, err: RxError) { self.0.on_outer_terminal(Some(err)); }

  fn on_completed(&self) { self.0.on_outer_terminal(None); }
}

struct ChildObserver<F, T> {
  core: Arc<ConcatCore<F, T>>,
  id: usize,
  last_ack: Mutex<Ack>,
}

impl<F, T> Observer<T> for ChildObserver<F, T>
where
  F: Send + Sync + 'static,
  T: Send + 'static,
{
  fn on_next(&self, item: T) -> Ack {
    if matches!(self.core.state.lock().phase, Phase::Cancelled) {
      return Ack::Stop;
    }
    let ack = self.core.observer.on_next(item);
    let core = self.core.clone();
    ack.on_settled(move |signal| {
      if signal == Signal::Stop {
        core.cancel();
      }
    });
    *self.last_ack.lock() = ack.clone();
    ack
  }

  fn on_error(&self, err: RxError) { self.core.on_child_error(err); }

  fn on_completed(&self) {
    let last_ack = self.last_ack.lock().clone();
    self.core.on_child_completed(self.id, last_ack);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    observable::{from_iter, ObservableExt},
    scheduler::TrampolineScheduler,
    testing::{TestObserver, TestSource},
  };

  fn trampoline() -> SharedScheduler { Arc::new(TrampolineScheduler::new()) }

  /// A selector handing out hand-driven children, kept for the test.
  fn recorded_children() -> (Arc<Mutex<Vec<TestSource<i32>>>>, impl Fn(i32) -> TestSource<i32>) {
    let children = Arc::new(Mutex::new(vec![]));
    let c_children = children.clone();
    (children, move |_| {
      let child = TestSource::new();
      c_children.lock().push(child.clone());
      child
    })
  }

  #[test]
  fn flattens_in_order() {
    let sch = trampoline();
    let observer = TestObserver::new();
    from_iter(vec![1usize, 2, 3])
      .concat_map(|x| from_iter(vec![x; x]))
      .subscribe(observer.clone(), &sch, &sch);

    assert_eq!(observer.items(), vec![1, 2, 2, 3, 3, 3]);
    assert!(observer.is_completed());
  }

  #[test]
  fn next_child_waits_for_completion() {
    let sch = trampoline();
    let outer = TestSource::new();
    let (children, selector) = recorded_children();
    let observer = TestObserver::new();
    outer.clone().concat_map(selector).subscribe(observer.clone(), &sch, &sch);

    let first = outer.on_next(1);
    assert_eq!(children.lock().len(), 1);
    assert_eq!(first.settled(), None);

    let child = children.lock()[0].clone();
    assert!(child.on_next(10).is_continue());
    assert_eq!(first.settled(), None);
    child.on_completed();
    assert!(first.is_continue());

    outer.on_next(2);
    assert_eq!(children.lock().len(), 2);
    assert_eq!(observer.items(), vec![10]);
  }

  #[test]
  fn outer_completion_waits_for_child() {
    let sch = trampoline();
    let outer = TestSource::new();
    let (children, selector) = recorded_children();
    let observer = TestObserver::new();
    outer.clone().concat_map(selector).subscribe(observer.clone(), &sch, &sch);

    outer.on_next(1);
    outer.on_completed();
    assert!(!observer.is_completed());

    let child = children.lock()[0].clone();
    child.on_next(7);
    child.on_completed();
    assert_eq!(observer.items(), vec![7]);
    assert!(observer.is_completed());
  }

  #[test]
  fn outer_error_is_delivered_after_child() {
    let sch = trampoline();
    let outer = TestSource::new();
    let (children, selector) = recorded_children();
    let observer = TestObserver::new();
    outer.clone().concat_map(selector).subscribe(observer.clone(), &sch, &sch);

    outer.on_next(1);
    outer.on_error(RxError::msg("outer"));
    assert_eq!(observer.error(), None);

    let child = children.lock()[0].clone();
    assert!(child.on_next(3).is_continue());
    child.on_completed();
    assert_eq!(observer.items(), vec![3]);
    assert_eq!(observer.error(), Some(RxError::msg("outer")));
  }

  #[test]
  fn child_error_terminates() {
    let sch = trampoline();
    let outer = TestSource::new();
    let (children, selector) = recorded_children();
    let observer = TestObserver::new();
    outer.clone().concat_map(selector).subscribe(observer.clone(), &sch, &sch);

    let ack = outer.on_next(1);
    children.lock()[0].on_error(RxError::msg("child"));
    assert!(ack.is_stop());
    assert_eq!(observer.error(), Some(RxError::msg("child")));
    assert!(outer.is_disposed());
  }

  #[test]
  fn downstream_stop_cancels() {
    let sch = trampoline();
    let observer = TestObserver::stop_after(2);
    from_iter(vec![1usize, 2, 3])
      .concat_map(|x| from_iter(vec![x; 2]))
      .subscribe(observer.clone(), &sch, &sch);

    assert_eq!(observer.items(), vec![1, 1]);
    assert_eq!(observer.terminal_count(), 0);
  }

  #[test]
  fn empty_outer_completes() {
    let sch = trampoline();
    let observer = TestObserver::<i32>::new();
    from_iter(Vec::<i32>::new())
      .concat_map(|x| from_iter(vec![x]))
      .subscribe(observer.clone(), &sch, &sch);
    assert!(observer.is_completed());
  }
}
