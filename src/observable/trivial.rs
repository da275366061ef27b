use std::marker::PhantomData;

use crate::{
  disposable::{BooleanDisposable, BoxedDisposable, Disposable},
  error::RxError,
  observable::Observable,
  observer::SharedObserver,
  scheduler::SharedScheduler,
};

/// Creates an observable that emits no items, just terminates with an error.
pub fn throw<Item>(err: RxError) -> Throw<Item> { Throw { err, _hint: PhantomData } }

/// Creates an observable that produces no values and completes immediately.
pub fn empty<Item>() -> Empty<Item> { Empty(PhantomData) }

/// Creates an observable that never emits and never terminates.
pub fn never<Item>() -> Never<Item> { Never(PhantomData) }

pub struct Throw<Item> {
  err: RxError,
  _hint: PhantomData<fn() -> Item>,
}

pub struct Empty<Item>(PhantomData<fn() -> Item>);

pub struct Never<Item>(PhantomData<fn() -> Item>);

impl<Item> Clone for Throw<Item> {
  fn clone(&self) -> Self { Throw { err: self.err.clone(), _hint: PhantomData } }
}

impl<Item> Clone for Empty<Item> {
  fn clone(&self) -> Self { Empty(PhantomData) }
}

impl<Item> Clone for Never<Item> {
  fn clone(&self) -> Self { Never(PhantomData) }
}

/// Runs `emit` on `subscribe_scheduler` unless disposed first.
fn emit_later<Item: Send + 'static>(
  observer: SharedObserver<Item>, subscribe_scheduler: &SharedScheduler,
  emit: impl FnOnce(&SharedObserver<Item>) + Send + 'static,
) -> BoxedDisposable {
  let handle = BooleanDisposable::new();
  let c_handle = handle.clone();
  subscribe_scheduler.schedule(Box::new(move || {
    if !c_handle.is_disposed() {
      c_handle.dispose();
      emit(&observer);
    }
  }));
  Box::new(handle)
}

impl<Item: Send + 'static> Observable for Throw<Item> {
  type Item = Item;

  fn unsafe_subscribe(
    &self, observer: SharedObserver<Item>, _: &SharedScheduler, subscribe_scheduler: &SharedScheduler,
  ) -> BoxedDisposable {
    let err = self.err.clone();
    emit_later(observer, subscribe_scheduler, move |o| o.on_error(err))
  }
}

impl<Item: Send + 'static> Observable for Empty<Item> {
  type Item = Item;

  fn unsafe_subscribe(
    &self, observer: SharedObserver<Item>, _: &SharedScheduler, subscribe_scheduler: &SharedScheduler,
  ) -> BoxedDisposable {
    emit_later(observer, subscribe_scheduler, |o| o.on_completed())
  }
}

impl<Item: Send + 'static> Observable for Never<Item> {
  type Item = Item;

  fn unsafe_subscribe(
    &self, _: SharedObserver<Item>, _: &SharedScheduler, _: &SharedScheduler,
  ) -> BoxedDisposable {
    Box::new(BooleanDisposable::new())
  }
}
