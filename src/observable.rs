//! Observable trait and the operator extension trait
//!
//! An [`Observable`] pushes items into a [`SharedObserver`] and waits on the
//! returned acks. `unsafe_subscribe` wires the observer in directly on the
//! caller's thread; [`Observable::subscribe`] performs the same call as a task
//! on the subscribe scheduler.

use std::sync::Arc;

use crate::{
  disposable::{BoxedDisposable, SingleAssignmentDisposable},
  error::RxError,
  observer::{Observer, SharedObserver},
  ops::{
    cache::Cache, concat_map::ConcatMap, flat_map::FlatMap, window::Window, zip::Zip2,
  },
  scheduler::SharedScheduler,
};

mod from_iter;
mod trivial;

pub(crate) use from_iter::IteratorFeed;
pub use from_iter::{from_iter, just, repeat_value, FromIter};
pub use trivial::{empty, never, throw, Empty, Never, Throw};

// ==================== Observable ====================

/// A push-based source of items.
pub trait Observable: Send + Sync {
  type Item: Send + 'static;

  /// Subscribe `observer` on the calling thread.
  ///
  /// `scheduler` runs every continuation the subscription needs later;
  /// `subscribe_scheduler` is where sources start producing.
  fn unsafe_subscribe(
    &self, observer: SharedObserver<Self::Item>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> BoxedDisposable;

  /// Subscribe `observer` by scheduling [`Observable::unsafe_subscribe`] on
  /// `subscribe_scheduler`.
  ///
  /// The returned handle is valid immediately; disposing it before the task
  /// ran disposes the subscription as soon as it exists.
  fn subscribe<O>(
    &self, observer: O, scheduler: &SharedScheduler, subscribe_scheduler: &SharedScheduler,
  ) -> BoxedDisposable
  where
    Self: Clone + Sized + 'static,
    O: Observer<Self::Item> + 'static,
  {
    let observer: SharedObserver<Self::Item> = Arc::new(observer);
    let handle = SingleAssignmentDisposable::new();
    let source = self.clone();
    let (c_handle, c_scheduler, c_subscribe_scheduler) =
      (handle.clone(), scheduler.clone(), subscribe_scheduler.clone());
    subscribe_scheduler.schedule(Box::new(move || {
      c_handle.set(source.unsafe_subscribe(observer, &c_scheduler, &c_subscribe_scheduler));
    }));
    Box::new(handle)
  }
}

/// A type-erased, cloneable observable.
pub type BoxedObservable<Item> = Arc<dyn Observable<Item = Item>>;

impl<S: Observable + ?Sized> Observable for Arc<S> {
  type Item = S::Item;

  #[inline]
  fn unsafe_subscribe(
    &self, observer: SharedObserver<Self::Item>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> BoxedDisposable {
    (**self).unsafe_subscribe(observer, scheduler, subscribe_scheduler)
  }
}

// ==================== Operators ====================

type PairSelector<L, R> = fn(L, R) -> Result<(L, R), RxError>;

fn pair<L, R>(left: L, right: R) -> Result<(L, R), RxError> { Ok((left, right)) }

/// Operators available on every observable.
pub trait ObservableExt: Observable + Sized {
  /// Erase the concrete type.
  fn boxed(self) -> BoxedObservable<Self::Item>
  where
    Self: 'static,
  {
    Arc::new(self)
  }

  /// Pair items of `self` and `right` strictly by arrival index.
  fn zip2<R>(self, right: R) -> Zip2<Self, R, PairSelector<Self::Item, R::Item>>
  where
    R: Observable,
  {
    Zip2::new(self, right, pair)
  }

  /// Combine items of `self` and `right` pairwise with a fallible selector.
  /// A selector error terminates the stream with that error.
  fn zip2_with<R, F, Out>(self, right: R, selector: F) -> Zip2<Self, R, F>
  where
    R: Observable,
    F: Fn(Self::Item, R::Item) -> Result<Out, RxError> + Send + Sync + 'static,
    Out: Send + 'static,
  {
    Zip2::new(self, right, selector)
  }

  /// Map every item to an inner observable and emit the inner items, one
  /// inner observable at a time.
  fn concat_map<F, Inner>(self, selector: F) -> ConcatMap<Self, F>
  where
    F: Fn(Self::Item) -> Inner + Send + Sync + 'static,
    Inner: Observable + 'static,
  {
    ConcatMap::new(self, selector)
  }

  /// Map every item to an inner observable and merge the inner items; inner
  /// observables run concurrently, their items are delivered one at a time.
  fn flat_map<F, Inner>(self, selector: F) -> FlatMap<Self, F>
  where
    F: Fn(Self::Item) -> Inner + Send + Sync + 'static,
    Inner: Observable + 'static,
  {
    FlatMap::new(self, selector)
  }

  /// Share one upstream subscription between many subscribers; the fastest
  /// subscriber paces the upstream, slower ones read from a buffer.
  fn cache(self) -> Cache<Self>
  where
    Self::Item: Clone,
  {
    Cache::new(self)
  }

  /// Synchronize `self` (left) with `right` by two comparators.
  ///
  /// `is_lower(l, r)` holds when `r` sorts before `l`, `is_higher(l, r)` when
  /// `r` sorts after `l`; otherwise they are equal. Use [`Window::split`] to
  /// get the two outputs.
  fn window<R, Lo, Hi>(self, right: R, is_lower: Lo, is_higher: Hi) -> Window<Self, R, Lo, Hi>
  where
    R: Observable,
    Self::Item: Clone,
    R::Item: Clone,
    Lo: Fn(&Self::Item, &R::Item) -> bool + Send + Sync + 'static,
    Hi: Fn(&Self::Item, &R::Item) -> bool + Send + Sync + 'static,
  {
    Window::new(self, right, is_lower, is_higher)
  }
}

impl<S: Observable + Sized> ObservableExt for S {}
