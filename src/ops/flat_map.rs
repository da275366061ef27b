//! FlatMap operator
//!
//! Every outer item is mapped to an inner observable which is subscribed
//! right away; the outer producer is acknowledged immediately, so several
//! inner observables can run at once. Their items are merged in arrival
//! order and delivered one at a time: an item that arrives while another is
//! in flight downstream is queued, and its producer waits for its own ack.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

use crate::{
  ack::{Ack, AsyncAck, Signal},
  disposable::{BoxedDisposable, CompositeDisposable, Disposable, SingleAssignmentDisposable},
  error::RxError,
  observable::Observable,
  observer::{Observer, SharedObserver},
  scheduler::SharedScheduler,
};

/// FlatMap operator, see
/// [`ObservableExt::flat_map`](crate::observable::ObservableExt).
pub struct FlatMap<S, F> {
  source: S,
  selector: Arc<F>,
}

impl<S, F> FlatMap<S, F> {
  pub(crate) fn new(source: S, selector: F) -> Self { FlatMap { source, selector: Arc::new(selector) } }
}

impl<S: Clone, F> Clone for FlatMap<S, F> {
  fn clone(&self) -> Self { FlatMap { source: self.source.clone(), selector: self.selector.clone() } }
}

impl<S, F, Inner> Observable for FlatMap<S, F>
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
    let core = Arc::new(FlatCore {
      observer,
      selector: self.selector.clone(),
      scheduler: scheduler.clone(),
      subscribe_scheduler: subscribe_scheduler.clone(),
      state: Mutex::new(FlatState {
        queue: VecDeque::new(),
        emitting: false,
        subscribed: 0,
        outside_completed: false,
        error: None,
        done: false,
      }),
      subscription: CompositeDisposable::new(),
    });
    let outer = self.source.unsafe_subscribe(
      Arc::new(OutsideObserver(core.clone())),
      scheduler,
      subscribe_scheduler,
    );
    core.subscription.add(outer);
    Box::new(core.subscription.clone())
  }
}

// ==================== Shared State ====================

struct FlatState<T> {
  /// Items waiting for the downstream, with the ack their producer holds.
  queue: VecDeque<(T, AsyncAck)>,
  /// An item is in flight downstream; only its owner may emit.
  emitting: bool,
  /// Running inner subscriptions.
  subscribed: usize,
  outside_completed: bool,
  error: Option<RxError>,
  done: bool,
}

enum Finish {
  Completed,
  Errored(RxError),
}

impl<T> FlatState<T> {
  /// The terminal notification that is due now, if any. Marks the state done.
  fn take_finish(&mut self) -> Option<Finish> {
    if self.done || self.emitting || !self.queue.is_empty() {
      return None;
    }
    let finish = match self.error.take() {
      Some(err) => Finish::Errored(err),
      None if self.outside_completed && self.subscribed == 0 => Finish::Completed,
      None => return None,
    };
    self.done = true;
    Some(finish)
  }
}

struct FlatCore<F, T> {
  observer: SharedObserver<T>,
  selector: Arc<F>,
  scheduler: SharedScheduler,
  subscribe_scheduler: SharedScheduler,
  state: Mutex<FlatState<T>>,
  subscription: CompositeDisposable,
}

impl<F, T> FlatCore<F, T>
where
  F: Send + Sync + 'static,
  T: Send + 'static,
{
  fn subscribe_inner<Item, Inner>(self: &Arc<Self>, item: Item) -> Ack
  where
    F: Fn(Item) -> Inner,
    Inner: Observable<Item = T>,
  {
    {
      let mut state = self.state.lock();
      if state.done || state.error.is_some() {
        return Ack::Stop;
      }
      state.subscribed += 1;
    }

    let inner = (self.selector)(item);
    let handle = SingleAssignmentDisposable::new();
    let Some(id) = self.subscription.add(handle.clone()) else {
      return Ack::Stop;
    };
    let inner_observer = InnerObserver { core: self.clone(), id };
    handle.set(inner.unsafe_subscribe(
      Arc::new(inner_observer),
      &self.scheduler,
      &self.subscribe_scheduler,
    ));
    Ack::Continue
  }

  fn on_inner_next(self: &Arc<Self>, item: T) -> Ack {
    {
      let mut state = self.state.lock();
      if state.done || state.error.is_some() {
        return Ack::Stop;
      }
      if state.emitting {
        let reply = AsyncAck::new();
        state.queue.push_back((item, reply.clone()));
        return Ack::Pending(reply);
      }
      state.emitting = true;
    }

    let ack = self.observer.on_next(item);
    self.after_emit(ack.clone());
    ack
  }

  /// Continue the pump once the downstream accepted the last item.
  fn after_emit(self: &Arc<Self>, ack: Ack) {
    match ack.settled() {
      Some(Signal::Continue) => self.drain(),
      Some(Signal::Stop) => self.cancel(),
      None => {
        let this = self.clone();
        ack.on_settled_scheduled(&self.scheduler, move |signal| match signal {
          Signal::Continue => this.drain(),
          Signal::Stop => this.cancel(),
        });
      }
    }
  }

  fn drain(self: &Arc<Self>) {
    loop {
      let (item, reply) = {
        let mut state = self.state.lock();
        if state.done {
          return;
        }
        let next = if state.error.is_some() { None } else { state.queue.pop_front() };
        match next {
          Some(next) => next,
          None => {
            state.emitting = false;
            let stale: Vec<_> = state.queue.drain(..).collect();
            let finish = state.take_finish();
            drop(state);
            stale.into_iter().for_each(|(_, reply)| reply.resolve(Signal::Stop));
            if let Some(finish) = finish {
              self.deliver(finish);
            }
            return;
          }
        }
      };

      let ack = self.observer.on_next(item);
      match ack.settled() {
        Some(signal) => {
          reply.resolve(signal);
          if signal == Signal::Stop {
            self.cancel();
            return;
          }
        }
        None => {
          ack.clone().connect(reply);
          self.after_emit(ack);
          return;
        }
      }
    }
  }

  fn on_inner_completed(&self, id: usize) {
    self.subscription.remove(id);
    let finish = {
      let mut state = self.state.lock();
      state.subscribed = state.subscribed.saturating_sub(1);
      state.take_finish()
    };
    if let Some(finish) = finish {
      self.deliver(finish);
    }
  }

  fn on_outside_completed(&self) {
    let finish = {
      let mut state = self.state.lock();
      state.outside_completed = true;
      state.take_finish()
    };
    if let Some(finish) = finish {
      self.deliver(finish);
    }
  }

  /// Errors from any source win over pending items; an item already in
  /// flight is let through first.
  fn on_any_error(&self, err: RxError) {
    let (finish, stale) = {
      let mut state = self.state.lock();
      if state.done || state.error.is_some() {
        tracing::debug!(%err, "flat_map dropping a second error");
        return;
      }
      state.error = Some(err);
      let stale: Vec<_> = state.queue.drain(..).collect();
      (state.take_finish(), stale)
    };
    for (_, reply) in stale {
      reply.resolve(Signal::Stop);
    }
    if let Some(finish) = finish {
      self.deliver(finish);
    }
  }

  fn deliver(&self, finish: Finish) {
    match finish {
      Finish::Completed => self.observer.on_completed(),
      Finish::Errored(err) => self.observer.on_error(err),
    }
    self.subscription.dispose();
  }

  fn cancel(&self) {
    let stale: Vec<_> = {
      let mut state = self.state.lock();
      state.done = true;
      state.queue.drain(..).collect()
    };
    for (_, reply) in stale {
      reply.resolve(Signal::Stop);
    }
    self.subscription.dispose();
  }
}

// ==================== Observers ====================

struct OutsideObserver<F, T>(Arc<FlatCore<F, T>>);

impl<Item, F, Inner, T> Observer<Item> for OutsideObserver<F, T>
where
  F: Fn(Item) -> Inner + Send + Sync + 'static,
  Inner: Observable<Item = T>,
  T: Send + 'static,
{
  fn on_next(&self, item: Item) -> Ack { self.0.subscribe_inner(item) }

  fn on_error(&self, err: RxError) { self.0.on_any_error(err); }

  fn on_completed(&self) { self.0.on_outside_completed(); }
}

struct InnerObserver<F, T> {
  core: Arc<FlatCore<F, T>>,
  id: usize,
}

impl<F, T> Observer<T> for InnerObserver<F, T>
where
  F: Send + Sync + 'static,
  T: Send + 'static,
{
  fn on_next(&self, item: T) -> Ack { self.core.on_inner_next(item) }

  fn on_error(&self, err: RxError) { self.core.on_any_error(err); }

  fn on_completed(&self) { self.core.on_inner_completed(self.id); }
}
