//! Window operator
//!
//! Synchronizes two ordered streams. Every left item opens a window: the
//! left output receives `(left_item, inner)` where `inner` emits the right
//! items that compare equal to `left_item`. The right output receives every
//! right item tagged with whether it matched the open window.
//!
//! For a left item `l` and right item `r`, `is_lower(l, r)` means `r` sorts
//! before `l` and `is_higher(l, r)` means `r` sorts after `l`; neither means
//! they are equal. Each side holds at most one unresolved item:
//!
//! * lower: `(false, r)` goes out on the right output and the next right item
//!   is requested.
//! * equal: `r` goes into the open window and `(true, r)` out on the right
//!   output, then the next right item is requested.
//! * higher: the window completes and the next left item is requested; `r`
//!   stays buffered for it.
//!
//! Right items are matched against a window only after the left output
//! acknowledged the `(left_item, inner)` pair, so an observer that subscribes
//! to `inner` before returning its ack sees every item of the window. Windows
//! are [`PublishSubject`]s: items pushed while nobody listens are dropped.
//!
//! Both outputs share one subscription; the upstreams are connected once
//! both outputs have an observer, and disposing either output disposes both.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::{
  ack::{Ack, AsyncAck, Signal},
  disposable::{BoxedDisposable, CompositeDisposable, Disposable},
  error::RxError,
  observable::{BoxedObservable, Observable},
  observer::{Observer, SharedObserver},
  scheduler::SharedScheduler,
  subject::PublishSubject,
};

/// Window operator, see [`ObservableExt::window`](crate::observable::ObservableExt).
pub struct Window<L, R, Lo, Hi> {
  left: L,
  right: R,
  is_lower: Lo,
  is_higher: Hi,
}

/// Items of the left output: a left item and its window of equal right items.
pub type LeftWindow<L, R> = (L, BoxedObservable<R>);

impl<L, R, Lo, Hi> Window<L, R, Lo, Hi>
where
  L: Observable,
  R: Observable,
{
  pub(crate) fn new(left: L, right: R, is_lower: Lo, is_higher: Hi) -> Self {
    Window { left, right, is_lower, is_higher }
  }

  /// The left output and the right output.
  pub fn split(self) -> (WindowLeft<L, R, Lo, Hi>, WindowRight<L, R, Lo, Hi>) {
    let shared = Arc::new(WindowShared {
      left: self.left,
      right: self.right,
      is_lower: Arc::new(self.is_lower),
      is_higher: Arc::new(self.is_higher),
      left_out: OnceCell::new(),
      right_out: OnceCell::new(),
      connected: OnceCell::new(),
      subscription: CompositeDisposable::new(),
    });
    (WindowLeft { shared: shared.clone() }, WindowRight { shared })
  }
}

// ==================== Outputs ====================

struct WindowShared<L: Observable, R: Observable, Lo, Hi> {
  left: L,
  right: R,
  is_lower: Arc<Lo>,
  is_higher: Arc<Hi>,
  left_out: OnceCell<SharedObserver<LeftWindow<L::Item, R::Item>>>,
  right_out: OnceCell<SharedObserver<(bool, R::Item)>>,
  connected: OnceCell<()>,
  subscription: CompositeDisposable,
}

impl<L, R, Lo, Hi> WindowShared<L, R, Lo, Hi>
where
  L: Observable,
  R: Observable,
  L::Item: Clone,
  R::Item: Clone,
  Lo: Fn(&L::Item, &R::Item) -> bool + Send + Sync + 'static,
  Hi: Fn(&L::Item, &R::Item) -> bool + Send + Sync + 'static,
{
  fn try_connect(&self, scheduler: &SharedScheduler, subscribe_scheduler: &SharedScheduler) {
    let (Some(left_out), Some(right_out)) = (self.left_out.get(), self.right_out.get()) else {
      return;
    };
    if self.connected.set(()).is_err() {
      return;
    }
    tracing::debug!("window outputs subscribed, connecting upstreams");
    let core = Arc::new(WindowCore {
      left_out: left_out.clone(),
      right_out: right_out.clone(),
      is_lower: self.is_lower.clone(),
      is_higher: self.is_higher.clone(),
      scheduler: scheduler.clone(),
      state: Mutex::new(WindowState {
        left: None,
        right: None,
        left_completed: false,
        right_completed: false,
        pumping: false,
        done: false,
      }),
      upstreams: self.subscription.clone(),
    });
    let left =
      self.left.unsafe_subscribe(Arc::new(WindowLeftObserver(core.clone())), scheduler, subscribe_scheduler);
    self.subscription.add(left);
    let right =
      self.right.unsafe_subscribe(Arc::new(WindowRightObserver(core)), scheduler, subscribe_scheduler);
    self.subscription.add(right);
  }
}

fn second_subscription<T>(observer: &SharedObserver<T>) -> BoxedDisposable {
  observer.on_error(RxError::Protocol("window output subscribed twice"));
  Box::new(())
}

/// Left output of [`Window::split`].
pub struct WindowLeft<L: Observable, R: Observable, Lo, Hi> {
  shared: Arc<WindowShared<L, R, Lo, Hi>>,
}

impl<L: Observable, R: Observable, Lo, Hi> Clone for WindowLeft<L, R, Lo, Hi> {
  fn clone(&self) -> Self { WindowLeft { shared: self.shared.clone() } }
}

/// Right output of [`Window::split`].
pub struct WindowRight<L: Observable, R: Observable, Lo, Hi> {
  shared: Arc<WindowShared<L, R, Lo, Hi>>,
}

impl<L: Observable, R: Observable, Lo, Hi> Clone for WindowRight<L, R, Lo, Hi> {
  fn clone(&self) -> Self { WindowRight { shared: self.shared.clone() } }
}

impl<L, R, Lo, Hi> Observable for WindowLeft<L, R, Lo, Hi>
where
  L: Observable,
  R: Observable,
  L::Item: Clone,
  R::Item: Clone,
  Lo: Fn(&L::Item, &R::Item) -> bool + Send + Sync + 'static,
  Hi: Fn(&L::Item, &R::Item) -> bool + Send + Sync + 'static,
{
  type Item = LeftWindow<L::Item, R::Item>;

  fn unsafe_subscribe(
    &self, observer: SharedObserver<Self::Item>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> BoxedDisposable {
    if self.shared.left_out.set(observer.clone()).is_err() {
      return second_subscription(&observer);
    }
    self.shared.try_connect(scheduler, subscribe_scheduler);
    Box::new(self.shared.subscription.clone())
  }
}

impl<L, R, Lo, Hi> Observable for WindowRight<L, R, Lo, Hi>
where
  L: Observable,
  R: Observable,
  L::Item: Clone,
  R::Item: Clone,
  Lo: Fn(&L::Item, &R::Item) -> bool + Send + Sync + 'static,
  Hi: Fn(&L::Item, &R::Item) -> bool + Send + Sync + 'static,
{
  type Item = (bool, R::Item);

  fn unsafe_subscribe(
    &self, observer: SharedObserver<Self::Item>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> BoxedDisposable {
    if self.shared.right_out.set(observer.clone()).is_err() {
      return second_subscription(&observer);
    }
    self.shared.try_connect(scheduler, subscribe_scheduler);
    Box::new(self.shared.subscription.clone())
  }
}

// ==================== Core ====================

struct OpenWindow<L, R> {
  item: L,
  inner: PublishSubject<R>,
  /// The left output acknowledged the pair; right items may be matched.
  ready: bool,
  /// Held by the left upstream until the window closes.
  reply: AsyncAck,
}

struct WindowState<L, R> {
  left: Option<OpenWindow<L, R>>,
  right: Option<(R, AsyncAck)>,
  left_completed: bool,
  right_completed: bool,
  /// A pump owns the right to call the outputs.
  pumping: bool,
  done: bool,
}

enum Step<R> {
  /// A right item that matches no window.
  Unmatched(R, AsyncAck),
  Matched(PublishSubject<R>, R, AsyncAck),
  Close(PublishSubject<R>, AsyncAck),
  Finish,
  Violation,
}

impl<L, R> WindowState<L, R> {
  fn next_step<Lo, Hi>(&mut self, is_lower: &Lo, is_higher: &Hi) -> Option<Step<R>>
  where
    Lo: Fn(&L, &R) -> bool,
    Hi: Fn(&L, &R) -> bool,
  {
    if self.done {
      return None;
    }
    match (&self.left, &self.right) {
      (Some(window), Some((r, _))) if window.ready => {
        let lower = is_lower(&window.item, r);
        let higher = is_higher(&window.item, r);
        if lower && higher {
          return Some(Step::Violation);
        }
        if higher {
          let window = self.left.take()?;
          return Some(Step::Close(window.inner, window.reply));
        }
        let inner = window.inner.clone();
        let (r, reply) = self.right.take()?;
        Some(if lower { Step::Unmatched(r, reply) } else { Step::Matched(inner, r, reply) })
      }
      (Some(window), None) if window.ready && self.right_completed => {
        let window = self.left.take()?;
        Some(Step::Close(window.inner, window.reply))
      }
      (None, Some(_)) if self.left_completed => {
        let (r, reply) = self.right.take()?;
        Some(Step::Unmatched(r, reply))
      }
      (None, None) if self.left_completed || self.right_completed => {
        self.done = true;
        Some(Step::Finish)
      }
      _ => None,
    }
  }

  fn take_replies(&mut self) -> Vec<AsyncAck> {
    let left = self.left.take().map(|window| window.reply);
    let right = self.right.take().map(|(_, reply)| reply);
    left.into_iter().chain(right).collect()
  }
}

struct WindowCore<L, R, Lo, Hi> {
  left_out: SharedObserver<LeftWindow<L, R>>,
  right_out: SharedObserver<(bool, R)>,
  is_lower: Arc<Lo>,
  is_higher: Arc<Hi>,
  scheduler: SharedScheduler,
  state: Mutex<WindowState<L, R>>,
  upstreams: CompositeDisposable,
}

impl<L, R, Lo, Hi> WindowCore<L, R, Lo, Hi>
where
  L: Clone + Send + 'static,
  R: Clone + Send + 'static,
  Lo: Fn(&L, &R) -> bool + Send + Sync + 'static,
  Hi: Fn(&L, &R) -> bool + Send + Sync + 'static,
{
  fn on_left(self: &Arc<Self>, item: L) -> Ack {
    let inner = PublishSubject::new();
    let reply = AsyncAck::new();
    {
      let mut state = self.state.lock();
      if state.done {
        return Ack::Stop;
      }
      if state.left.is_some() {
        drop(state);
        return self.violation("window left upstream emitted before its ack settled");
      }
      state.left = Some(OpenWindow {
        item: item.clone(),
        inner: inner.clone(),
        ready: false,
        reply: reply.clone(),
      });
    }

    tracing::trace!("window opened");
    let inner: BoxedObservable<R> = Arc::new(inner);
    let ack = self.left_out.on_next((item, inner));
    let this = self.clone();
    ack.on_settled_scheduled(&self.scheduler, move |signal| match signal {
      Signal::Continue => {
        if let Some(window) = this.state.lock().left.as_mut() {
          window.ready = true;
        }
        this.pump();
      }
      Signal::Stop => this.cancel(),
    });
    settled_or_pending(reply)
  }

  fn on_right(self: &Arc<Self>, item: R) -> Ack {
    let reply = AsyncAck::new();
    {
      let mut state = self.state.lock();
      if state.done {
        return Ack::Stop;
      }
      if state.right.is_some() {
        drop(state);
        return self.violation("window right upstream emitted before its ack settled");
      }
      state.right = Some((item, reply.clone()));
    }
    self.pump();
    settled_or_pending(reply)
  }

  fn on_side_completed(self: &Arc<Self>, left_side: bool) {
    {
      let mut state = self.state.lock();
      if left_side {
        state.left_completed = true;
      } else {
        state.right_completed = true;
      }
    }
    self.pump();
  }

  /// Run steps until the state has nothing to resolve. Only one pump runs at a
  /// time; a caller finding the pump busy leaves its state change to it.
  fn pump(self: &Arc<Self>) {
    {
      let mut state = self.state.lock();
      if state.pumping {
        return;
      }
      state.pumping = true;
    }
    loop {
      let step = {
        let mut state = self.state.lock();
        match state.next_step(&*self.is_lower, &*self.is_higher) {
          Some(step) => step,
          None => {
            state.pumping = false;
            return;
          }
        }
      };
      match step {
        Step::Unmatched(r, reply) => {
          let ack = self.right_out.on_next((false, r));
          self.forward(ack, reply);
        }
        Step::Matched(inner, r, reply) => {
          let ack = inner.on_next(r.clone()).merge(self.right_out.on_next((true, r)));
          self.forward(ack, reply);
        }
        Step::Close(inner, reply) => {
          tracing::trace!("window closed");
          inner.on_completed();
          reply.resolve(Signal::Continue);
        }
        Step::Finish => {
          tracing::debug!("window completed");
          self.left_out.on_completed();
          self.right_out.on_completed();
          self.upstreams.dispose();
        }
        Step::Violation => {
          self.scheduler.report_failure(RxError::Protocol("window comparators both matched"));
          self.cancel();
        }
      }
    }
  }

  /// Hand the downstream ack of a right item back to the right upstream.
  fn forward(self: &Arc<Self>, ack: Ack, reply: AsyncAck) {
    match ack.settled() {
      Some(Signal::Stop) => {
        reply.resolve(Signal::Stop);
        self.cancel();
      }
      Some(Signal::Continue) => reply.resolve(Signal::Continue),
      None => {
        let this = self.clone();
        ack.on_settled(move |signal| {
          reply.resolve(signal);
          if signal == Signal::Stop {
            this.cancel();
          }
        });
      }
    }
  }

  fn violation(&self, reason: &'static str) -> Ack {
    self.scheduler.report_failure(RxError::Protocol(reason));
    self.cancel();
    Ack::Stop
  }

  fn fail(&self, err: RxError) {
    let (window, replies) = {
      let mut state = self.state.lock();
      if state.done {
        tracing::debug!(%err, "window dropping error after termination");
        return;
      }
      state.done = true;
      let window = state.left.as_ref().map(|window| window.inner.clone());
      (window, state.take_replies())
    };
    if let Some(inner) = window {
      inner.on_error(err.clone());
    }
    self.left_out.on_error(err.clone());
    self.right_out.on_error(err);
    resolve_stop(replies);
    self.upstreams.dispose();
  }

  fn cancel(&self) {
    let replies = {
      let mut state = self.state.lock();
      state.done = true;
      state.take_replies()
    };
    resolve_stop(replies);
    self.upstreams.dispose();
  }
}

fn settled_or_pending(reply: AsyncAck) -> Ack {
  match reply.settled() {
    Some(signal) => signal.into(),
    None => Ack::Pending(reply),
  }
}

fn resolve_stop(replies: Vec<AsyncAck>) {
  for reply in replies {
    reply.try_resolve(Signal::Stop).ok();
  }
}

// ==================== Upstream Observers ====================

struct WindowLeftObserver<L, R, Lo, Hi>(Arc<WindowCore<L, R, Lo, Hi>>);

impl<L, R, Lo, Hi> Observer<L> for WindowLeftObserver<L, R, Lo, Hi>
where
  L: Clone + Send + 'static,
  R: Clone + Send + 'static,
  Lo: Fn(&L, &R) -> bool + Send + Sync + 'static,
  Hi: Fn(&L, &R) -> bool + Send + Sync + 'static,
{
  fn on_next(&self, item: L) -> Ack { self.0.on_left(item) }

  fn on_error(&self, err: RxError) { self.0.fail(err); }

  fn on_completed(&self) { self.0.on_side_completed(true); }
}

struct WindowRightObserver<L, R, Lo, Hi>(Arc<WindowCore<L, R, Lo, Hi>>);

impl<L, R, Lo, Hi> Observer<R> for WindowRightObserver<L, R, Lo, Hi>
where
  L: Clone + Send + 'static,
  R: Clone + Send + 'static,
  Lo: Fn(&L, &R) -> bool + Send + Sync + 'static,
  Hi: Fn(&L, &R) -> bool + Send + Sync + 'static,
{
  fn on_next(&self, item: R) -> Ack { self.0.on_right(item) }

  fn on_error(&self, err: RxError) { self.0.fail(err); }

  fn on_completed(&self) { self.0.on_side_completed(false); }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    observable::{from_iter, ObservableExt},
    observer::AnonymousObserver,
    scheduler::TrampolineScheduler,
    testing::{TestObserver, TestSource},
  };

  fn scheduler() -> SharedScheduler { Arc::new(TrampolineScheduler::new()) }

  /// Subscribes a `TestObserver` to every window before acknowledging it.
  fn collect_windows(
    windows: Arc<Mutex<Vec<(i32, TestObserver<i32>)>>>, sch: SharedScheduler,
  ) -> impl Observer<LeftWindow<i32, i32>> + 'static {
    AnonymousObserver::new(move |(l, inner): LeftWindow<i32, i32>| {
      let observer = TestObserver::new();
      inner.unsafe_subscribe(Arc::new(observer.clone()), &sch, &sch);
      windows.lock().push((l, observer));
      Ack::Continue
    })
  }

  #[test]
  fn matches_by_comparators() {
    let sch = scheduler();
    let (left, right) = (TestSource::new(), TestSource::new());
    let (windows_out, right_out) =
      left.clone().window(right.clone(), |l: &i32, r: &i32| r < l, |l: &i32, r: &i32| l < r).split();
    let windows = Arc::new(Mutex::new(vec![]));
    let tagged = TestObserver::new();
    windows_out.subscribe(collect_windows(windows.clone(), sch.clone()), &sch, &sch);
    right_out.subscribe(tagged.clone(), &sch, &sch);

    let left_ack = left.on_next(5);
    assert_eq!(left_ack.settled(), None);
    assert_eq!(windows.lock().len(), 1);

    assert!(right.on_next(4).is_continue());
    assert_eq!(tagged.items(), vec![(false, 4)]);

    assert!(right.on_next(5).is_continue());
    assert_eq!(tagged.items(), vec![(false, 4), (true, 5)]);
    let window = windows.lock()[0].1.clone();
    assert_eq!(window.items(), vec![5]);
    assert!(!window.is_completed());

    let higher = right.on_next(6);
    assert!(window.is_completed());
    assert!(left_ack.is_continue());
    assert_eq!(higher.settled(), None);
    assert_eq!(tagged.items(), vec![(false, 4), (true, 5)]);

    left.on_next(6);
    assert!(higher.is_continue());
    assert_eq!(tagged.items(), vec![(false, 4), (true, 5), (true, 6)]);
    assert_eq!(windows.lock()[1].1.items(), vec![6]);
  }

  #[test]
  fn connects_after_both_outputs() {
    let sch = scheduler();
    let (left, right) = (TestSource::<i32>::new(), TestSource::<i32>::new());
    let (windows_out, right_out) =
      left.clone().window(right.clone(), |l, r| r < l, |l, r| l < r).split();

    windows_out.subscribe(collect_windows(Arc::new(Mutex::new(vec![])), sch.clone()), &sch, &sch);
    assert!(!left.is_subscribed());
    right_out.subscribe(TestObserver::new(), &sch, &sch);
    assert!(left.is_subscribed() && right.is_subscribed());
  }

  #[test]
  fn streams_of_windows() {
    let sch = scheduler();
    let windows = Arc::new(Mutex::new(vec![]));
    let tagged = TestObserver::new();
    let (windows_out, right_out) = from_iter(vec![1, 3, 5])
      .window(from_iter(vec![1, 1, 2, 3, 5, 5]), |l, r| r < l, |l, r| l < r)
      .split();
    windows_out.subscribe(collect_windows(windows.clone(), sch.clone()), &sch, &sch);
    right_out.subscribe(tagged.clone(), &sch, &sch);

    assert_eq!(
      tagged.items(),
      vec![(true, 1), (true, 1), (false, 2), (true, 3), (true, 5), (true, 5)]
    );
    let windows = windows.lock();
    let contents: Vec<_> = windows.iter().map(|(l, w)| (*l, w.items())).collect();
    assert_eq!(contents, vec![(1, vec![1, 1]), (3, vec![3]), (5, vec![5, 5])]);
    assert!(tagged.is_completed());
    assert!(windows.iter().all(|(_, w)| w.is_completed()));
  }

  #[test]
  fn left_completion_completes_outputs() {
    let sch = scheduler();
    let (left, right) = (TestSource::<i32>::new(), TestSource::<i32>::new());
    let (windows_out, right_out) =
      left.clone().window(right.clone(), |l, r| r < l, |l, r| l < r).split();
    let windows = TestObserver::new();
    let tagged = TestObserver::new();
    windows_out.subscribe(windows.clone(), &sch, &sch);
    right_out.subscribe(tagged.clone(), &sch, &sch);

    left.on_completed();
    assert!(windows.is_completed());
    assert!(tagged.is_completed());
    assert!(right.is_disposed());
  }

  #[test]
  fn right_completion_closes_open_window() {
    let sch = scheduler();
    let (left, right) = (TestSource::new(), TestSource::new());
    let (windows_out, right_out) =
      left.clone().window(right.clone(), |l: &i32, r: &i32| r < l, |l: &i32, r: &i32| l < r).split();
    let windows = Arc::new(Mutex::new(vec![]));
    let tagged = TestObserver::new();
    windows_out.subscribe(collect_windows(windows.clone(), sch.clone()), &sch, &sch);
    right_out.subscribe(tagged.clone(), &sch, &sch);

    let left_ack = left.on_next(5);
    right.on_next(5);
    let window = windows.lock()[0].1.clone();
    assert!(!window.is_completed());

    right.on_completed();
    assert_eq!(window.items(), vec![5]);
    assert!(window.is_completed());
    assert!(left_ack.is_continue());
    assert!(tagged.is_completed());
    assert!(left.is_disposed());
  }

  #[test]
  fn left_completion_flushes_buffered_right() {
    let sch = scheduler();
    let (left, right) = (TestSource::new(), TestSource::new());
    let (windows_out, right_out) =
      left.clone().window(right.clone(), |l: &i32, r: &i32| r < l, |l: &i32, r: &i32| l < r).split();
    let windows = Arc::new(Mutex::new(vec![]));
    let tagged = TestObserver::new();
    windows_out.subscribe(collect_windows(windows.clone(), sch.clone()), &sch, &sch);
    right_out.subscribe(tagged.clone(), &sch, &sch);

    left.on_next(5);
    let buffered = right.on_next(6);
    assert_eq!(buffered.settled(), None);
    assert!(windows.lock()[0].1.is_completed());
    assert!(tagged.items().is_empty());

    left.on_completed();
    assert_eq!(tagged.items(), vec![(false, 6)]);
    assert!(buffered.is_continue());
    assert!(tagged.is_completed());
  }

  #[test]
  fn completion_waits_for_window_ack() {
    let sch = scheduler();
    let (left, right) = (TestSource::new(), TestSource::new());
    let (windows_out, right_out) =
      left.clone().window(right.clone(), |l: &i32, r: &i32| r < l, |l: &i32, r: &i32| l < r).split();
    let windows = TestObserver::manual();
    let tagged = TestObserver::new();
    windows_out.subscribe(windows.clone(), &sch, &sch);
    right_out.subscribe(tagged.clone(), &sch, &sch);

    left.on_next(5);
    right.on_next(5);
    right.on_completed();
    assert!(tagged.items().is_empty());
    assert!(!tagged.is_completed());
    assert!(!windows.is_completed());

    windows.resolve_next(Signal::Continue);
    assert_eq!(tagged.items(), vec![(true, 5)]);
    assert!(tagged.is_completed());
    assert!(windows.is_completed());
  }

  #[test]
  fn upstream_error_reaches_all_outputs() {
    let sch = scheduler();
    let (left, right) = (TestSource::new(), TestSource::<i32>::new());
    let (windows_out, right_out) =
      left.clone().window(right.clone(), |l, r| r < l, |l, r| l < r).split();
    let windows = Arc::new(Mutex::new(vec![]));
    let tagged = TestObserver::new();
    windows_out.subscribe(collect_windows(windows.clone(), sch.clone()), &sch, &sch);
    right_out.subscribe(tagged.clone(), &sch, &sch);

    let pending = left.on_next(1);
    right.on_error(RxError::msg("right failed"));
    assert!(pending.is_stop());
    assert_eq!(tagged.error(), Some(RxError::msg("right failed")));
    assert_eq!(windows.lock()[0].1.error(), Some(RxError::msg("right failed")));
  }

  #[test]
  fn second_subscription_is_rejected() {
    let sch = scheduler();
    let (_, right_out) = TestSource::<i32>::new()
      .window(TestSource::<i32>::new(), |l, r| r < l, |l, r| l < r)
      .split();
    right_out.subscribe(TestObserver::new(), &sch, &sch);
    let second = TestObserver::new();
    right_out.subscribe(second.clone(), &sch, &sch);
    assert!(second.error().is_some_and(|err| err.is_protocol_violation()));
  }
}
