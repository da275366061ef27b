use std::{cell::RefCell, collections::VecDeque};

use super::{ExecutionModel, Scheduler, Task};

thread_local! {
  /// `Some` while a trampoline is draining on this thread.
  static TRAMPOLINE: RefCell<Option<VecDeque<Task>>> = const { RefCell::new(None) };
}

/// Runs tasks on the calling thread.
///
/// A task scheduled from inside another task is queued and runs after the
/// current one returns, so chains of continuations never grow the stack.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrampolineScheduler {
  execution_model: Option<ExecutionModel>,
}

impl TrampolineScheduler {
  pub fn new() -> Self { Self::default() }

  pub fn with_execution_model(execution_model: ExecutionModel) -> Self {
    TrampolineScheduler { execution_model: Some(execution_model) }
  }
}

/// Resets the thread's trampoline even if a task panics.
struct DrainGuard;

impl Drop for DrainGuard {
  fn drop(&mut self) { TRAMPOLINE.with(|queue| *queue.borrow_mut() = None); }
}

impl Scheduler for TrampolineScheduler {
  fn schedule(&self, task: Task) {
    let run_now = TRAMPOLINE.with(|queue| {
      let mut queue = queue.borrow_mut();
      match queue.as_mut() {
        Some(pending) => {
          pending.push_back(task);
          None
        }
        None => {
          *queue = Some(VecDeque::new());
          Some(task)
        }
      }
    });

    let Some(first) = run_now else { return };
    let _guard = DrainGuard;
    first();
    while let Some(next) = TRAMPOLINE.with(|queue| queue.borrow_mut().as_mut()?.pop_front()) {
      next();
    }
  }

  fn execution_model(&self) -> ExecutionModel { self.execution_model.unwrap_or_default() }
}
