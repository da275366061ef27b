use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

use super::Terminal;
use crate::{
  ack::{Ack, AsyncAck, Signal},
  error::RxError,
  observer::{Observer, SharedObserver},
  scheduler::SharedScheduler,
};

struct ConnectState<T> {
  connected: bool,
  draining: bool,
  stopped: bool,
  queue: VecDeque<(T, AsyncAck)>,
  terminal: Option<Terminal>,
}

/// An observer that holds live notifications back until
/// [`ConnectableObserver::connect`] is called.
///
/// Queued items are answered with pending acks, so the producer stays
/// back-pressured while the downstream is busy with something else, e.g. a
/// replay of older items. After `connect` the queue is drained in order and
/// later notifications are forwarded directly.
pub(crate) struct ConnectableObserver<T> {
  downstream: SharedObserver<T>,
  scheduler: SharedScheduler,
  state: Mutex<ConnectState<T>>,
}

impl<T: Send + 'static> ConnectableObserver<T> {
  pub(crate) fn new(downstream: SharedObserver<T>, scheduler: SharedScheduler) -> Arc<Self> {
    Arc::new(ConnectableObserver {
      downstream,
      scheduler,
      state: Mutex::new(ConnectState {
        connected: false,
        draining: false,
        stopped: false,
        queue: VecDeque::new(),
        terminal: None,
      }),
    })
  }

  pub(crate) fn downstream(&self) -> &SharedObserver<T> { &self.downstream }

  /// Start forwarding. Calling it twice is a no-op.
  pub(crate) fn connect(self: &Arc<Self>) {
    {
      let mut state = self.state.lock();
      if state.connected || state.stopped {
        return;
      }
      state.connected = true;
      state.draining = true;
    }
    self.clone().drain();
  }

  /// The downstream refused further items; answer everything queued with
  /// `Stop`.
  pub(crate) fn stop(&self) {
    let queued: Vec<_> = {
      let mut state = self.state.lock();
      state.stopped = true;
      state.terminal = None;
      state.queue.drain(..).collect()
    };
    for (_, reply) in queued {
      reply.resolve(Signal::Stop);
    }
  }

  fn drain(self: Arc<Self>) {
    loop {
      let (item, reply) = {
        let mut state = self.state.lock();
        if state.stopped {
          state.draining = false;
          return;
        }
        match state.queue.pop_front() {
          Some(next) => next,
          None => {
            state.draining = false;
            let terminal = state.terminal.take();
            drop(state);
            if let Some(terminal) = terminal {
              terminal.deliver_to(&*self.downstream);
            }
            return;
          }
        }
      };

      let ack = self.downstream.on_next(item);
      match ack.settled() {
        Some(Signal::Continue) => reply.resolve(Signal::Continue),
        Some(Signal::Stop) => {
          reply.resolve(Signal::Stop);
          self.stop();
          return;
        }
        None => {
          let scheduler = self.scheduler.clone();
          ack.on_settled_scheduled(&scheduler, move |signal| {
            reply.resolve(signal);
            match signal {
              Signal::Continue => self.drain(),
              Signal::Stop => self.stop(),
            }
          });
          return;
        }
      }
    }
  }

  fn hold_terminal(&self, terminal: Terminal) {
    {
      let mut state = self.state.lock();
      if state.stopped || state.terminal.is_some() {
        return;
      }
      if !state.connected || state.draining {
        state.terminal = Some(terminal);
        return;
      }
    }
    terminal.deliver_to(&*self.downstream);
  }
}

impl<T: Send + 'static> Observer<T> for ConnectableObserver<T> {
  fn on_next(&self, item: T) -> Ack {
    let mut state = self.state.lock();
    if state.stopped {
      return Ack::Stop;
    }
    if !state.connected || state.draining {
      let reply = AsyncAck::new();
      state.queue.push_back((item, reply.clone()));
      return Ack::Pending(reply);
    }
    drop(state);

    let ack = self.downstream.on_next(item);
    if ack.is_stop() {
      self.stop();
    }
    ack
  }

  fn on_error(&self, err: RxError) { self.hold_terminal(Terminal::Errored(err)); }

  fn on_completed(&self) { self.hold_terminal(Terminal::Completed); }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{scheduler::TrampolineScheduler, testing::TestObserver};

  fn connectable(observer: &TestObserver<i32>) -> Arc<ConnectableObserver<i32>> {
    ConnectableObserver::new(Arc::new(observer.clone()), Arc::new(TrampolineScheduler::new()))
  }

  #[test]
  fn queues_until_connected() {
    let observer = TestObserver::new();
    let connectable = connectable(&observer);
    let first = connectable.on_next(1);
    let second = connectable.on_next(2);
    connectable.on_completed();
    assert!(observer.items().is_empty());
    assert_eq!(first.settled(), None);

    connectable.connect();
    assert_eq!(observer.items(), vec![1, 2]);
    assert!(first.is_continue() && second.is_continue());
    assert!(observer.is_completed());
  }

  #[test]
  fn forwards_directly_once_drained() {
    let observer = TestObserver::new();
    let connectable = connectable(&observer);
    connectable.connect();
    assert!(connectable.on_next(3).is_continue());
    assert_eq!(observer.items(), vec![3]);
  }

  #[test]
  fn drain_waits_on_pending_ack() {
    let observer = TestObserver::manual();
    let connectable = connectable(&observer);
    let first = connectable.on_next(1);
    let second = connectable.on_next(2);
    connectable.connect();
    assert_eq!(observer.items(), vec![1]);

    observer.resolve_next(Signal::Continue);
    assert!(first.is_continue());
    assert_eq!(observer.items(), vec![1, 2]);
    assert_eq!(second.settled(), None);

    observer.resolve_next(Signal::Stop);
    assert!(second.is_stop());
    assert!(connectable.on_next(3).is_stop());
  }
}
