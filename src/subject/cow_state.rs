use std::sync::Arc;

use parking_lot::Mutex;

/// A copy-on-write state handle.
///
/// Readers take a snapshot with [`CowState::load`] and work on it without
/// holding the lock. Writers build a new snapshot from the one they read and
/// install it only if the handle still points at that exact snapshot;
/// [`CowState::update`] retries until it wins.
pub(crate) struct CowState<S>(Mutex<Arc<S>>);

impl<S> CowState<S> {
  pub(crate) fn new(state: S) -> Self { CowState(Mutex::new(Arc::new(state))) }

  #[inline]
  pub(crate) fn load(&self) -> Arc<S> { self.0.lock().clone() }

  /// Install `next` if the current snapshot is still `current`.
  pub(crate) fn compare_and_swap(&self, current: &Arc<S>, next: Arc<S>) -> bool {
    let mut slot = self.0.lock();
    if Arc::ptr_eq(&slot, current) {
      *slot = next;
      true
    } else {
      false
    }
  }

  /// Derive a new snapshot from the current one and install it.
  ///
  /// `f` returns `None` to leave the state untouched. It may run several
  /// times, so it must not have side effects.
  pub(crate) fn update<R>(&self, mut f: impl FnMut(&S) -> Option<(S, R)>) -> Option<R> {
    loop {
      let current = self.load();
      let (next, out) = f(&current)?;
      if self.compare_and_swap(&current, Arc::new(next)) {
        return Some(out);
      }
    }
  }
}
