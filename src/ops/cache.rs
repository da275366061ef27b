//! Cache operator
//!
//! Multicasts one upstream subscription through a
//! [`CachedServeFirstSubject`]. The upstream is connected when the first
//! subscriber arrives and stays connected until [`Cache::disconnect`].

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::{
  disposable::{BoxedDisposable, Disposable},
  observable::Observable,
  observer::SharedObserver,
  scheduler::SharedScheduler,
  subject::CachedServeFirstSubject,
};

struct Shared<T> {
  subject: CachedServeFirstSubject<T>,
  connection: OnceCell<BoxedDisposable>,
}

/// Cache operator, see [`ObservableExt::cache`](crate::observable::ObservableExt).
pub struct Cache<S: Observable> {
  source: S,
  shared: Arc<Shared<S::Item>>,
}

impl<S: Observable + Clone> Clone for Cache<S> {
  fn clone(&self) -> Self { Cache { source: self.source.clone(), shared: self.shared.clone() } }
}

impl<S: Observable> Cache<S> {
  pub(crate) fn new(source: S) -> Self {
    Cache {
      source,
      shared: Arc::new(Shared { subject: CachedServeFirstSubject::new(), connection: OnceCell::new() }),
    }
  }

  /// Whether the upstream subscription has been made.
  pub fn is_connected(&self) -> bool { self.shared.connection.get().is_some() }

  /// Dispose the shared upstream subscription. Subscribers stay attached but
  /// receive nothing more.
  pub fn disconnect(&self) {
    if let Some(connection) = self.shared.connection.get() {
      connection.dispose();
    }
  }
}

impl<S> Observable for Cache<S>
where
  S: Observable,
  S::Item: Clone,
{
  type Item = S::Item;

  fn unsafe_subscribe(
    &self, observer: SharedObserver<S::Item>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> BoxedDisposable {
    let subscription = self.shared.subject.unsafe_subscribe(observer, scheduler, subscribe_scheduler);
    self.shared.connection.get_or_init(|| {
      tracing::debug!("cache connecting upstream");
      self.source.unsafe_subscribe(
        Arc::new(self.shared.subject.clone()),
        scheduler,
        subscribe_scheduler,
      )
    });
    subscription
  }
}
