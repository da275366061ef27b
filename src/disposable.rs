//! Disposables: handles to release the resources of a subscription.
//!
//! Disposal is cooperative. Producers check [`Disposable::is_disposed`]
//! between items and stop on their own; nothing is interrupted.

use std::{
  fmt::{Debug, Formatter},
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;

mod dynamic;
pub use dynamic::DynamicSlots;

/// A resource that can be released once. `dispose` is idempotent.
pub trait Disposable: Send + Sync {
  fn dispose(&self);

  fn is_disposed(&self) -> bool;
}

pub type BoxedDisposable = Box<dyn Disposable>;

impl Debug for dyn Disposable {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("dyn Disposable")
      .field("is_disposed", &self.is_disposed())
      .finish()
  }
}

/// Nothing to release.
impl Disposable for () {
  #[inline]
  fn dispose(&self) {}

  #[inline]
  fn is_disposed(&self) -> bool { true }
}

impl<T: Disposable + ?Sized> Disposable for Box<T> {
  #[inline]
  fn dispose(&self) { (**self).dispose() }

  #[inline]
  fn is_disposed(&self) -> bool { (**self).is_disposed() }
}

impl<T: Disposable + ?Sized> Disposable for Arc<T> {
  #[inline]
  fn dispose(&self) { (**self).dispose() }

  #[inline]
  fn is_disposed(&self) -> bool { (**self).is_disposed() }
}

// ==================== BooleanDisposable ====================

/// A shared flag. Producers poll it between items.
#[derive(Clone, Debug, Default)]
pub struct BooleanDisposable(Arc<AtomicBool>);

impl BooleanDisposable {
  pub fn new() -> Self { Self::default() }
}

impl Disposable for BooleanDisposable {
  #[inline]
  fn dispose(&self) { self.0.store(true, Ordering::Release); }

  #[inline]
  fn is_disposed(&self) -> bool { self.0.load(Ordering::Acquire) }
}

// ==================== AnonymousDisposable ====================

/// Runs a closure on the first `dispose`.
pub struct AnonymousDisposable {
  teardown: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

pub fn disposable_fn(teardown: impl FnOnce() + Send + 'static) -> AnonymousDisposable {
  AnonymousDisposable { teardown: Mutex::new(Some(Box::new(teardown))) }
}

impl Disposable for AnonymousDisposable {
  fn dispose(&self) {
    let teardown = self.teardown.lock().take();
    if let Some(teardown) = teardown {
      teardown();
    }
  }

  fn is_disposed(&self) -> bool { self.teardown.lock().is_none() }
}

// ==================== SingleAssignmentDisposable ====================

enum Assignment {
  Empty,
  Assigned(BoxedDisposable),
  Disposed,
}

/// A slot for a disposable that only exists after some asynchronous step,
/// e.g. a subscription performed on another scheduler.
///
/// Disposing before the assignment disposes the late value as soon as it
/// arrives.
#[derive(Clone)]
pub struct SingleAssignmentDisposable(Arc<Mutex<Assignment>>);

impl SingleAssignmentDisposable {
  pub fn new() -> Self { SingleAssignmentDisposable(Arc::new(Mutex::new(Assignment::Empty))) }

  pub fn set(&self, disposable: BoxedDisposable) {
    let assigned_twice = {
      let mut slot = self.0.lock();
      match *slot {
        Assignment::Empty => {
          *slot = Assignment::Assigned(disposable);
          return;
        }
        Assignment::Disposed => false,
        Assignment::Assigned(_) => true,
      }
    };
    if assigned_twice {
      tracing::error!("single assignment disposable assigned twice");
    }
    disposable.dispose();
  }
}

impl Default for SingleAssignmentDisposable {
  fn default() -> Self { Self::new() }
}

impl Disposable for SingleAssignmentDisposable {
  fn dispose(&self) {
    let previous = std::mem::replace(&mut *self.0.lock(), Assignment::Disposed);
    if let Assignment::Assigned(inner) = previous {
      inner.dispose();
    }
  }

  fn is_disposed(&self) -> bool { matches!(*self.0.lock(), Assignment::Disposed) }
}

// ==================== CompositeDisposable ====================

struct Inner {
  closed: bool,
  teardown: DynamicSlots<BoxedDisposable>,
}

/// A group of disposables released together.
#[derive(Clone)]
pub struct CompositeDisposable(Arc<Mutex<Inner>>);

impl CompositeDisposable {
  pub fn new() -> Self {
    CompositeDisposable(Arc::new(Mutex::new(Inner { closed: false, teardown: DynamicSlots::new() })))
  }

  /// Add a child. Returns its id, or `None` if the composite is already
  /// disposed, in which case the child is disposed immediately.
  pub fn add<D: Disposable + 'static>(&self, disposable: D) -> Option<usize> {
    let mut inner = self.0.lock();
    if inner.closed {
      drop(inner);
      disposable.dispose();
      None
    } else {
      inner.teardown.retain(|d| !d.is_disposed());
      Some(inner.teardown.add(Box::new(disposable)))
    }
  }

  /// Forget a child without disposing it.
  pub fn remove(&self, id: usize) -> Option<BoxedDisposable> { self.0.lock().teardown.remove(id) }

  pub fn len(&self) -> usize { self.0.lock().teardown.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl Default for CompositeDisposable {
  fn default() -> Self { Self::new() }
}

impl Disposable for CompositeDisposable {
  fn dispose(&self) {
    let children: Vec<_> = {
      let mut inner = self.0.lock();
      if inner.closed {
        return;
      }
      inner.closed = true;
      inner.teardown.drain().collect()
    };
    for child in children {
      child.dispose();
    }
  }

  fn is_disposed(&self) -> bool { self.0.lock().closed }
}
