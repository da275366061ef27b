use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

use super::Terminal;
use crate::{
  ack::{Ack, AsyncAck, Signal},
  disposable::{disposable_fn, BoxedDisposable, DynamicSlots},
  error::RxError,
  observable::Observable,
  observer::{Observer, SharedObserver},
  scheduler::SharedScheduler,
};

#[derive(Clone)]
enum Entry<T> {
  Next(T),
  Terminal(Terminal),
}

struct Cursor<T> {
  observer: SharedObserver<T>,
  scheduler: SharedScheduler,
  /// Absolute index of the next entry to deliver.
  index: usize,
  /// A pump owns this cursor.
  active: bool,
}

struct CacheState<T> {
  buffer: VecDeque<Entry<T>>,
  /// Absolute index of `buffer[0]`.
  first_idx: usize,
  cursors: DynamicSlots<Cursor<T>>,
  terminal: Option<Terminal>,
  /// Handed to the producer while every subscriber is busy.
  upstream_ack: Option<AsyncAck>,
}

impl<T> CacheState<T> {
  fn last_idx(&self) -> usize { self.first_idx + self.buffer.len() }

  /// Drop entries every cursor has moved past.
  fn evict(&mut self) {
    let min = self
      .cursors
      .iter()
      .map(|(_, cursor)| cursor.index)
      .min()
      .unwrap_or_else(|| self.last_idx());
    while self.first_idx < min && self.buffer.pop_front().is_some() {
      self.first_idx += 1;
    }
  }

  /// Mark idle cursors busy and return their ids; their pumps must be started.
  fn wake_idle(&mut self) -> Vec<usize> {
    self
      .cursors
      .iter_mut()
      .filter(|(_, cursor)| !cursor.active)
      .map(|(id, cursor)| {
        cursor.active = true;
        id
      })
      .collect()
  }

  fn has_idle(&self) -> bool { self.cursors.iter().any(|(_, cursor)| !cursor.active) }
}

/// A hot multicast subject paced by its fastest subscriber.
///
/// Every item is appended to a shared buffer. Each subscriber reads the
/// buffer through its own cursor, with its own back-pressure, so a slow
/// subscriber never holds back a fast one and never misses an item. The
/// producer is acknowledged as soon as one subscriber has caught up with the
/// end of the buffer. Entries are evicted once every cursor moved past them.
///
/// Subscribers start at the end of the buffer. Subscribing after termination
/// delivers the terminal notification only.
pub struct CachedServeFirstSubject<T> {
  state: Arc<Mutex<CacheState<T>>>,
}

impl<T> Clone for CachedServeFirstSubject<T> {
  fn clone(&self) -> Self { CachedServeFirstSubject { state: self.state.clone() } }
}

impl<T> Default for CachedServeFirstSubject<T> {
  fn default() -> Self {
    CachedServeFirstSubject {
      state: Arc::new(Mutex::new(CacheState {
        buffer: VecDeque::new(),
        first_idx: 0,
        cursors: DynamicSlots::new(),
        terminal: None,
        upstream_ack: None,
      })),
    }
  }
}

impl<T> CachedServeFirstSubject<T> {
  pub fn new() -> Self { Self::default() }

  /// Number of retained entries, including a buffered terminal notification.
  pub fn buffered_len(&self) -> usize { self.state.lock().buffer.len() }

  /// Absolute index of the oldest retained entry.
  pub fn first_index(&self) -> usize { self.state.lock().first_idx }

  pub fn subscriber_count(&self) -> usize { self.state.lock().cursors.len() }
}

impl<T> CachedServeFirstSubject<T>
where
  T: Clone + Send + 'static,
{
  fn append(&self, entry: Entry<T>) -> Vec<usize> {
    let mut state = self.state.lock();
    state.buffer.push_back(entry);
    if state.cursors.is_empty() {
      state.evict();
    }
    state.wake_idle()
  }

  fn remove_cursor(&self, id: usize) {
    let release = {
      let mut state = self.state.lock();
      if state.cursors.remove(id).is_none() {
        return;
      }
      state.evict();
      if state.cursors.is_empty() || state.has_idle() {
        state.upstream_ack.take()
      } else {
        None
      }
    };
    if let Some(ack) = release {
      ack.resolve(Signal::Continue);
    }
  }

  /// Deliver buffered entries to one subscriber until it catches up, stops
  /// or has to wait for an ack.
  fn pump(&self, id: usize, mut frame: usize) {
    loop {
      let (entry, observer, scheduler) = {
        let mut state = self.state.lock();
        let last_idx = state.last_idx();
        let first_idx = state.first_idx;
        let Some(cursor) = state.cursors.get_mut(id) else { return };
        if cursor.index >= last_idx {
          cursor.active = false;
          let release = state.upstream_ack.take();
          drop(state);
          if let Some(ack) = release {
            ack.resolve(Signal::Continue);
          }
          return;
        }
        let position = cursor.index - first_idx;
        cursor.index += 1;
        let observer = cursor.observer.clone();
        let scheduler = cursor.scheduler.clone();
        let entry = state.buffer[position].clone();
        state.evict();
        (entry, observer, scheduler)
      };

      let item = match entry {
        Entry::Next(item) => item,
        Entry::Terminal(terminal) => {
          self.remove_cursor(id);
          terminal.deliver_to(&*observer);
          return;
        }
      };

      let ack = observer.on_next(item);
      match ack.settled() {
        Some(Signal::Continue) => {
          frame = scheduler.execution_model().next_frame_index(frame);
          if frame == 0 {
            let this = self.clone();
            scheduler.schedule(Box::new(move || this.pump(id, 0)));
            return;
          }
        }
        Some(Signal::Stop) => {
          self.remove_cursor(id);
          return;
        }
        None => {
          let this = self.clone();
          ack.on_settled_scheduled(&scheduler, move |signal| match signal {
            Signal::Continue => this.pump(id, 0),
            Signal::Stop => this.remove_cursor(id),
          });
          return;
        }
      }
    }
  }

  fn terminate(&self, terminal: Terminal) {
    {
      let mut state = self.state.lock();
      if state.terminal.is_some() {
        tracing::debug!("cached subject already terminated");
        return;
      }
      state.terminal = Some(terminal.clone());
      state.upstream_ack = None;
    }
    for id in self.append(Entry::Terminal(terminal)) {
      self.pump(id, 0);
    }
  }
}

impl<T> Observer<T> for CachedServeFirstSubject<T>
where
  T: Clone + Send + 'static,
{
  fn on_next(&self, item: T) -> Ack {
    if self.state.lock().terminal.is_some() {
      tracing::debug!("item pushed into a terminated cached subject");
      return Ack::Stop;
    }
    for id in self.append(Entry::Next(item)) {
      self.pump(id, 0);
    }

    let mut state = self.state.lock();
    if state.cursors.is_empty() || state.has_idle() {
      return Ack::Continue;
    }
    let ack = state.upstream_ack.get_or_insert_with(AsyncAck::new).clone();
    Ack::Pending(ack)
  }

  fn on_error(&self, err: RxError) { self.terminate(Terminal::Errored(err)); }

  fn on_completed(&self) { self.terminate(Terminal::Completed); }
}

impl<T> Observable for CachedServeFirstSubject<T>
where
  T: Clone + Send + 'static,
{
  type Item = T;

  fn unsafe_subscribe(
    &self, observer: SharedObserver<T>, scheduler: &SharedScheduler, _: &SharedScheduler,
  ) -> BoxedDisposable {
    let id = {
      let mut state = self.state.lock();
      if let Some(terminal) = state.terminal.clone() {
        drop(state);
        terminal.deliver_to(&*observer);
        return Box::new(());
      }
      let index = state.last_idx();
      state.cursors.add(Cursor { observer, scheduler: scheduler.clone(), index, active: false })
    };
    tracing::trace!(id, "cached subject subscriber added");
    let this = self.clone();
    Box::new(disposable_fn(move || this.remove_cursor(id)))
  }
}
