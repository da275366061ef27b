use std::sync::Arc;

use super::{cow_state::CowState, Terminal};
use crate::{
  ack::{Ack, PromiseCounter, Signal},
  disposable::{disposable_fn, BoxedDisposable, DynamicSlots},
  error::RxError,
  observable::Observable,
  observer::{Observer, SharedObserver},
  scheduler::SharedScheduler,
};

struct PublishState<T> {
  subscribers: DynamicSlots<SharedObserver<T>>,
  terminal: Option<Terminal>,
}

impl<T> Clone for PublishState<T> {
  fn clone(&self) -> Self {
    PublishState { subscribers: self.subscribers.clone(), terminal: self.terminal.clone() }
  }
}

impl<T> Default for PublishState<T> {
  fn default() -> Self { PublishState { subscribers: DynamicSlots::new(), terminal: None } }
}

/// A hot multicast subject.
///
/// Items are pushed to a snapshot of the current subscribers, one after the
/// other. The returned ack is `Continue` when every subscriber answered
/// synchronously, otherwise it settles once all pending acks did. Subscribers
/// answering `Stop` are removed.
///
/// Subscribing after termination delivers the terminal notification right
/// away, without any item.
pub struct PublishSubject<T> {
  state: Arc<CowState<PublishState<T>>>,
}

impl<T> Clone for PublishSubject<T> {
  fn clone(&self) -> Self { PublishSubject { state: self.state.clone() } }
}

impl<T> Default for PublishSubject<T> {
  fn default() -> Self { PublishSubject { state: Arc::new(CowState::new(PublishState::default())) } }
}

impl<T> PublishSubject<T> {
  pub fn new() -> Self { Self::default() }

  pub fn subscriber_count(&self) -> usize { self.state.load().subscribers.len() }

  pub fn is_terminated(&self) -> bool { self.state.load().terminal.is_some() }

  fn unsubscribe(&self, id: usize) {
    self.state.update(|state| {
      if !state.subscribers.contains(id) {
        return None;
      }
      let mut next = state.clone();
      next.subscribers.remove(id);
      Some((next, ()))
    });
  }

  fn terminate(&self, terminal: Terminal) {
    let subscribers = self.state.update(|state| {
      if state.terminal.is_some() {
        return None;
      }
      let next = PublishState { subscribers: DynamicSlots::new(), terminal: Some(terminal.clone()) };
      Some((next, state.subscribers.clone()))
    });
    match subscribers {
      Some(subscribers) => {
        for (_, observer) in subscribers.iter() {
          terminal.deliver_to(&**observer);
        }
      }
      None => tracing::debug!("publish subject already terminated"),
    }
  }
}

/// Push `item` to every subscriber and combine their acks.
///
/// `unsubscribe` is called with the id of every subscriber whose ack is or
/// becomes `Stop`.
pub(super) fn fan_out<'a, T, F>(
  subscribers: impl Iterator<Item = (usize, &'a SharedObserver<T>)>, item: T, unsubscribe: F,
) -> Ack
where
  T: Clone + 'a,
  F: Fn(usize) + Clone + Send + 'static,
{
  let mut counter: Option<Arc<PromiseCounter>> = None;
  for (id, observer) in subscribers {
    let ack = observer.on_next(item.clone());
    match ack.settled() {
      Some(Signal::Continue) => {}
      Some(Signal::Stop) => unsubscribe(id),
      None => {
        let counter = counter
          .get_or_insert_with(|| Arc::new(PromiseCounter::new(Signal::Continue, 1)))
          .clone();
        counter.acquire();
        let unsubscribe = unsubscribe.clone();
        ack.on_settled(move |signal| {
          if signal == Signal::Stop {
            unsubscribe(id);
          }
          counter.countdown();
        });
      }
    }
  }
  match counter {
    Some(counter) => {
      counter.countdown();
      counter.ack()
    }
    None => Ack::Continue,
  }
}

impl<T> Observer<T> for PublishSubject<T>
where
  T: Clone + Send + 'static,
{
  fn on_next(&self, item: T) -> Ack {
    let state = self.state.load();
    if state.terminal.is_some() {
      tracing::debug!("item pushed into a terminated publish subject");
      return Ack::Stop;
    }
    let this = self.clone();
    fan_out(state.subscribers.iter(), item, move |id| this.unsubscribe(id))
  }

  fn on_error(&self, err: RxError) { self.terminate(Terminal::Errored(err)); }

  fn on_completed(&self) { self.terminate(Terminal::Completed); }
}

impl<T> Observable for PublishSubject<T>
where
  T: Clone + Send + 'static,
{
  type Item = T;

  fn unsafe_subscribe(
    &self, observer: SharedObserver<T>, _: &SharedScheduler, _: &SharedScheduler,
  ) -> BoxedDisposable {
    let added = self.state.update(|state| {
      if state.terminal.is_some() {
        return None;
      }
      let mut next = state.clone();
      let id = next.subscribers.add(observer.clone());
      Some((next, id))
    });
    match added {
      Some(id) => {
        let this = self.clone();
        Box::new(disposable_fn(move || this.unsubscribe(id)))
      }
      None => {
        if let Some(terminal) = &self.state.load().terminal {
          terminal.deliver_to(&*observer);
        }
        Box::new(())
      }
    }
  }
}
