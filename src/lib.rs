//! # rxbackpressure: Reactive streams with acknowledgment based back-pressure
//!
//! Every `on_next` returns an [`Ack`]: `Continue`, `Stop`, or a pending
//! acknowledgment that settles later. A producer sends nothing more until the
//! previous ack settled to `Continue`, and gives up on `Stop`.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use rxbackpressure::prelude::*;
//!
//! let scheduler: SharedScheduler = Arc::new(TrampolineScheduler::new());
//! let observer = TestObserver::new();
//! observable::from_iter(vec![1, 2, 3])
//!   .zip2(observable::repeat_value('x'))
//!   .subscribe(observer.clone(), &scheduler, &scheduler);
//!
//! assert_eq!(observer.items(), vec![(1, 'x'), (2, 'x'), (3, 'x')]);
//! assert!(observer.is_completed());
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Ack`] | Back-pressure signal returned by every `on_next` |
//! | [`Observer`] | Consumes items, an error or the completion |
//! | [`Observable`] | Pushes items into an observer, honoring acks |
//! | [`Scheduler`] | Runs continuations once an ack settles |
//! | [`Disposable`] | Handle to cancel a subscription |
//!
//! ## Feature Flags
//!
//! - **`futures-scheduler`** (default): thread pool scheduler backed by
//!   `futures`
//! - **`tokio-scheduler`**: scheduler running tasks on a tokio runtime
//!
//! [`Ack`]: ack::Ack
//! [`Observer`]: observer::Observer
//! [`Observable`]: observable::Observable
//! [`Scheduler`]: scheduler::Scheduler
//! [`Disposable`]: disposable::Disposable

pub mod ack;
pub mod disposable;
pub mod error;
pub mod observable;
pub mod observer;
pub mod ops;
pub mod prelude;
pub mod scheduler;
pub mod subject;
pub mod testing;

// Re-export the prelude module
pub use prelude::*;
