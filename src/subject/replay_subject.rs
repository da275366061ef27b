use std::sync::Arc;

use parking_lot::Mutex;

use super::{cow_state::CowState, publish_subject::fan_out, ConnectableObserver, Terminal};
use crate::{
  ack::{Ack, Signal},
  disposable::{disposable_fn, BoxedDisposable, CompositeDisposable, DynamicSlots},
  error::RxError,
  observable::{IteratorFeed, Observable},
  observer::{Observer, SharedObserver},
  scheduler::SharedScheduler,
};

struct ReplayState<T> {
  /// Number of buffered items visible to new subscribers.
  replayed: usize,
  subscribers: DynamicSlots<SharedObserver<T>>,
  terminal: Option<Terminal>,
}

impl<T> Clone for ReplayState<T> {
  fn clone(&self) -> Self {
    ReplayState {
      replayed: self.replayed,
      subscribers: self.subscribers.clone(),
      terminal: self.terminal.clone(),
    }
  }
}

struct ReplayInner<T> {
  buffer: Mutex<Vec<T>>,
  state: CowState<ReplayState<T>>,
}

/// A multicast subject that remembers every item.
///
/// Live items fan out exactly like a
/// [`PublishSubject`](super::PublishSubject). A new subscriber first receives
/// the whole buffer, streamed with back-pressure, and is switched to live
/// items once the backlog is acknowledged; live items arriving meanwhile are
/// held back and the producer waits for them. After termination a new
/// subscriber gets the buffer followed by the terminal notification.
///
/// The buffer is unbounded.
pub struct ReplaySubject<T> {
  inner: Arc<ReplayInner<T>>,
}

impl<T> Clone for ReplaySubject<T> {
  fn clone(&self) -> Self { ReplaySubject { inner: self.inner.clone() } }
}

impl<T> Default for ReplaySubject<T> {
  fn default() -> Self {
    let state = ReplayState { replayed: 0, subscribers: DynamicSlots::new(), terminal: None };
    ReplaySubject {
      inner: Arc::new(ReplayInner { buffer: Mutex::new(vec![]), state: CowState::new(state) }),
    }
  }
}

impl<T> ReplaySubject<T> {
  pub fn new() -> Self { Self::default() }

  pub fn buffered_len(&self) -> usize { self.inner.state.load().replayed }

  pub fn subscriber_count(&self) -> usize { self.inner.state.load().subscribers.len() }

  fn unsubscribe(&self, id: usize) {
    self.inner.state.update(|state| {
      if !state.subscribers.contains(id) {
        return None;
      }
      let mut next = state.clone();
      next.subscribers.remove(id);
      Some((next, ()))
    });
  }

  fn terminate(&self, terminal: Terminal) {
    let subscribers = self.inner.state.update(|state| {
      if state.terminal.is_some() {
        return None;
      }
      let next = ReplayState {
        replayed: state.replayed,
        subscribers: DynamicSlots::new(),
        terminal: Some(terminal.clone()),
      };
      Some((next, state.subscribers.clone()))
    });
    match subscribers {
      Some(subscribers) => {
        for (_, observer) in subscribers.iter() {
          terminal.deliver_to(&**observer);
        }
      }
      None => tracing::debug!("replay subject already terminated"),
    }
  }
}

impl<T> Observer<T> for ReplaySubject<T>
where
  T: Clone + Send + 'static,
{
  fn on_next(&self, item: T) -> Ack {
    if self.inner.state.load().terminal.is_some() {
      tracing::debug!("item pushed into a terminated replay subject");
      return Ack::Stop;
    }
    self.inner.buffer.lock().push(item.clone());
    let subscribers = self.inner.state.update(|state| {
      let mut next = state.clone();
      next.replayed += 1;
      Some((next, state.subscribers.clone()))
    });
    let Some(subscribers) = subscribers else { return Ack::Continue };
    let this = self.clone();
    fan_out(subscribers.iter(), item, move |id| this.unsubscribe(id))
  }

  fn on_error(&self, err: RxError) { self.terminate(Terminal::Errored(err)); }

  fn on_completed(&self) { self.terminate(Terminal::Completed); }
}

impl<T> Observable for ReplaySubject<T>
where
  T: Clone + Send + 'static,
{
  type Item = T;

  fn unsafe_subscribe(
    &self, observer: SharedObserver<T>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> BoxedDisposable {
    let connectable = ConnectableObserver::new(observer, scheduler.clone());
    let live: SharedObserver<T> = connectable.clone();

    // Register for live items and learn how much of the buffer precedes them,
    // in one step.
    let (replayed, id) = self
      .inner
      .state
      .update(|state| {
        let mut next = state.clone();
        let id = match &state.terminal {
          Some(_) => None,
          None => Some(next.subscribers.add(live.clone())),
        };
        Some((next, (state.replayed, id)))
      })
      .unwrap_or((0, None));
    if id.is_none() {
      if let Some(terminal) = &self.inner.state.load().terminal {
        terminal.deliver_to(&*live);
      }
    }

    let subscription = CompositeDisposable::new();
    if let Some(id) = id {
      let this = self.clone();
      subscription.add(disposable_fn(move || this.unsubscribe(id)));
    }
    let c_connectable = connectable.clone();
    subscription.add(disposable_fn(move || c_connectable.stop()));

    if replayed == 0 {
      connectable.connect();
      return Box::new(subscription);
    }

    tracing::trace!(replayed, "replaying buffered items");
    let backlog: Vec<T> = self.inner.buffer.lock()[..replayed].to_vec();
    let backlog_observer = Arc::new(BacklogObserver { connectable, last_ack: Mutex::new(Ack::Continue) });
    let feed = IteratorFeed::new(backlog.into_iter(), backlog_observer, scheduler.clone());
    subscription.add(feed.handle());
    subscribe_scheduler.schedule(Box::new(move || feed.start()));
    Box::new(subscription)
  }
}

/// Streams the backlog to the downstream, then connects the live side.
struct BacklogObserver<T> {
  connectable: Arc<ConnectableObserver<T>>,
  last_ack: Mutex<Ack>,
}

impl<T: Send + 'static> Observer<T> for BacklogObserver<T> {
  fn on_next(&self, item: T) -> Ack {
    let ack = self.connectable.downstream().on_next(item);
    let connectable = self.connectable.clone();
    ack.on_settled(move |signal| {
      if signal == Signal::Stop {
        connectable.stop();
      }
    });
    *self.last_ack.lock() = ack.clone();
    ack
  }

  fn on_error(&self, err: RxError) {
    tracing::error!(%err, "replay backlog failed");
    self.connectable.stop();
  }

  fn on_completed(&self) {
    let ack = self.last_ack.lock().clone();
    let connectable = self.connectable.clone();
    ack.on_settled(move |signal| {
      if signal == Signal::Continue {
        connectable.connect();
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    disposable::Disposable,
    scheduler::{TestScheduler, TrampolineScheduler},
    testing::TestObserver,
  };

  fn scheduler() -> SharedScheduler { Arc::new(TrampolineScheduler::new()) }

  #[test]
  fn late_subscriber_gets_backlog_then_live() {
    let sch = scheduler();
    let subject = ReplaySubject::new();
    subject.on_next(1);
    subject.on_next(2);
    assert_eq!(subject.buffered_len(), 2);

    let late = TestObserver::new();
    subject.subscribe(late.clone(), &sch, &sch);
    assert_eq!(late.items(), vec![1, 2]);

    assert!(subject.on_next(3).is_continue());
    assert_eq!(late.items(), vec![1, 2, 3]);
  }

  #[test]
  fn live_items_wait_for_backlog() {
    let test_scheduler = TestScheduler::new();
    let sch: SharedScheduler = Arc::new(test_scheduler.clone());
    let subject = ReplaySubject::new();
    subject.on_next(1);

    let late = TestObserver::new();
    subject.unsafe_subscribe(Arc::new(late.clone()), &sch, &sch);
    let live = subject.on_next(2);
    assert_eq!(live.settled(), None);
    assert!(late.items().is_empty());

    test_scheduler.run_all();
    assert_eq!(late.items(), vec![1, 2]);
    assert!(live.is_continue());
  }

  #[test]
  fn subscriber_after_completion_gets_everything() {
    let sch = scheduler();
    let subject = ReplaySubject::new();
    subject.on_next('a');
    subject.on_next('b');
    subject.on_completed();

    let late = TestObserver::new();
    subject.subscribe(late.clone(), &sch, &sch);
    assert_eq!(late.items(), vec!['a', 'b']);
    assert!(late.is_completed());
    assert_eq!(late.terminal_count(), 1);
  }

  #[test]
  fn subscriber_after_error_without_items() {
    let sch = scheduler();
    let subject = ReplaySubject::<u8>::new();
    subject.on_error(RxError::msg("broken"));

    let late = TestObserver::new();
    subject.subscribe(late.clone(), &sch, &sch);
    assert_eq!(late.error(), Some(RxError::msg("broken")));
  }

  #[test]
  fn backlog_stop_detaches() {
    let sch = scheduler();
    let subject = ReplaySubject::new();
    for i in 0..5 {
      subject.on_next(i);
    }
    let late = TestObserver::stop_after(2);
    subject.subscribe(late.clone(), &sch, &sch);
    assert_eq!(late.items(), vec![0, 1]);

    assert!(subject.on_next(5).is_continue());
    assert_eq!(subject.subscriber_count(), 0);
    assert_eq!(late.items(), vec![0, 1]);
  }

  #[test]
  fn dispose_detaches() {
    let sch = scheduler();
    let subject = ReplaySubject::new();
    let observer = TestObserver::new();
    let handle = subject.subscribe(observer.clone(), &sch, &sch);
    subject.on_next(1);
    handle.dispose();
    subject.on_next(2);
    assert_eq!(observer.items(), vec![1]);
    assert_eq!(subject.subscriber_count(), 0);
  }
}
