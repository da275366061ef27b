//! Test Scheduler for deterministic testing of asynchronous boundaries.
//!
//! Scheduled tasks are queued and only run when the test asks for it, so a
//! test can observe an operator while it is suspended on a pending ack.
//!
//! # Usage
//!
//! ```rust
//! use rxbackpressure::prelude::*;
//!
//! let scheduler = TestScheduler::new();
//! let shared: SharedScheduler = std::sync::Arc::new(scheduler.clone());
//!
//! shared.schedule(Box::new(|| println!("later")));
//! assert_eq!(scheduler.pending_count(), 1);
//! scheduler.run_all();
//! assert!(scheduler.is_empty());
//! ```

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

use super::{ExecutionModel, Scheduler, Task};
use crate::error::RxError;

#[derive(Default)]
struct TestSchedulerState {
  task_queue: VecDeque<Task>,
  failures: Vec<RxError>,
  executed: usize,
}

/// A manually driven FIFO scheduler. Clones share the same queue.
#[derive(Clone, Default)]
pub struct TestScheduler {
  state: Arc<Mutex<TestSchedulerState>>,
  execution_model: ExecutionModel,
}

impl TestScheduler {
  pub fn new() -> Self { Self::default() }

  pub fn with_execution_model(execution_model: ExecutionModel) -> Self {
    TestScheduler { state: Arc::default(), execution_model }
  }

  /// Get the number of pending tasks in the queue.
  pub fn pending_count(&self) -> usize { self.state.lock().task_queue.len() }

  /// Check if there are no pending tasks.
  pub fn is_empty(&self) -> bool { self.state.lock().task_queue.is_empty() }

  /// Number of tasks executed so far.
  pub fn executed_count(&self) -> usize { self.state.lock().executed }

  /// Failures passed to [`Scheduler::report_failure`].
  pub fn failures(&self) -> Vec<RxError> { self.state.lock().failures.clone() }

  /// Run the oldest pending task. Returns `false` when the queue was empty.
  pub fn run_next(&self) -> bool {
    let task = {
      let mut state = self.state.lock();
      let task = state.task_queue.pop_front();
      if task.is_some() {
        state.executed += 1;
      }
      task
    };
    match task {
      Some(task) => {
        task();
        true
      }
      None => false,
    }
  }

  /// Run tasks until the queue is empty, including tasks scheduled by the
  /// tasks being run.
  pub fn run_all(&self) {
    while self.run_next() {}
  }
}

impl Scheduler for TestScheduler {
  fn schedule(&self, task: Task) { self.state.lock().task_queue.push_back(task); }

  fn report_failure(&self, err: RxError) {
    tracing::error!(%err, "unhandled failure");
    self.state.lock().failures.push(err);
  }

  fn execution_model(&self) -> ExecutionModel { self.execution_model }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  #[test]
  fn tasks_wait_for_run() {
    let scheduler = TestScheduler::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let c_hits = hits.clone();
    scheduler.schedule(Box::new(move || {
      c_hits.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.pending_count(), 1);

    assert!(scheduler.run_next());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!scheduler.run_next());
  }

  #[test]
  fn run_all_drains_rescheduled_work() {
    let scheduler = TestScheduler::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let (c_scheduler, c_hits) = (scheduler.clone(), hits.clone());
    scheduler.schedule(Box::new(move || {
      c_hits.fetch_add(1, Ordering::SeqCst);
      let c_hits = c_hits.clone();
      c_scheduler.schedule(Box::new(move || {
        c_hits.fetch_add(1, Ordering::SeqCst);
      }));
    }));

    scheduler.run_all();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.executed_count(), 2);
  }

  #[test]
  fn records_failures() {
    let scheduler = TestScheduler::new();
    scheduler.report_failure(RxError::msg("lost"));
    assert_eq!(scheduler.failures(), vec![RxError::msg("lost")]);
  }
}
