//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

// Acknowledgment
pub use crate::ack::{Ack, AsyncAck, PromiseCounter, Signal};
// Subscription handles
pub use crate::disposable::{
  disposable_fn, AnonymousDisposable, BooleanDisposable, BoxedDisposable, CompositeDisposable,
  Disposable, SingleAssignmentDisposable,
};
pub use crate::error::RxError;
// Sources, core traits and operators
pub use crate::observable::{self, BoxedObservable, Observable, ObservableExt};
pub use crate::observer::{AnonymousObserver, Observer, SharedObserver};
pub use crate::ops::{
  cache::Cache,
  concat_map::ConcatMap,
  flat_map::FlatMap,
  window::{LeftWindow, Window, WindowLeft, WindowRight},
  zip::Zip2,
};
// Schedulers
#[cfg(feature = "futures-scheduler")]
pub use crate::scheduler::ThreadPoolScheduler;
#[cfg(feature = "tokio-scheduler")]
pub use crate::scheduler::TokioScheduler;
pub use crate::scheduler::{
  ExecutionModel, Scheduler, SharedScheduler, Task, TestScheduler, TrampolineScheduler,
};
// Subjects
pub use crate::subject::{CachedServeFirstSubject, PublishSubject, ReplaySubject};
// Test doubles
pub use crate::testing::{AckMode, TestObserver, TestSource};
