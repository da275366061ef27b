//! Scheduler collaborator
//!
//! Operators never block. Whenever they have to wait for an acknowledgment
//! they hand a continuation to a [`Scheduler`], and long synchronous runs are
//! cut into batches according to the scheduler's [`ExecutionModel`].

use std::sync::Arc;

use crate::error::RxError;

mod test_scheduler;
#[cfg(feature = "futures-scheduler")]
mod thread_pool_scheduler;
#[cfg(feature = "tokio-scheduler")]
mod tokio_scheduler;
mod trampoline_scheduler;

pub use test_scheduler::TestScheduler;
#[cfg(feature = "futures-scheduler")]
pub use thread_pool_scheduler::ThreadPoolScheduler;
#[cfg(feature = "tokio-scheduler")]
pub use tokio_scheduler::TokioScheduler;
pub use trampoline_scheduler::TrampolineScheduler;

/// A zero-argument unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Schedulers are shared by every operator of a subscription.
pub type SharedScheduler = Arc<dyn Scheduler>;

/// A Scheduler is an object to order tasks and schedule their execution.
pub trait Scheduler: Send + Sync {
  /// Submit `task` for execution.
  fn schedule(&self, task: Task);

  /// Report a failure that cannot be delivered to any observer.
  fn report_failure(&self, err: RxError) {
    tracing::error!(%err, "unhandled failure");
  }

  /// How many items may be pushed synchronously before yielding.
  fn execution_model(&self) -> ExecutionModel { ExecutionModel::default() }
}

// ==================== Execution Model ====================

/// Batch policy for synchronous fast loops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionModel {
  /// Never yield.
  Synchronous,
  /// Yield to the scheduler every `n` items; `n` is rounded up to a power of
  /// two.
  Batched(usize),
  /// Yield after every item.
  AlwaysAsync,
}

impl ExecutionModel {
  pub const DEFAULT_BATCH_SIZE: usize = 1024;

  /// The index of the next synchronous frame. `0` means "yield now".
  pub fn next_frame_index(&self, current: usize) -> usize {
    match *self {
      ExecutionModel::Synchronous => 1,
      ExecutionModel::AlwaysAsync => 0,
      ExecutionModel::Batched(size) => {
        let modulus = size.max(1).next_power_of_two() - 1;
        (current + 1) & modulus
      }
    }
  }

  pub fn batch_size(&self) -> usize {
    match *self {
      ExecutionModel::Synchronous => usize::MAX,
      ExecutionModel::AlwaysAsync => 1,
      ExecutionModel::Batched(size) => size.max(1).next_power_of_two(),
    }
  }
}

impl Default for ExecutionModel {
  fn default() -> Self { ExecutionModel::Batched(Self::DEFAULT_BATCH_SIZE) }
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
  #[inline]
  fn schedule(&self, task: Task) { (**self).schedule(task) }

  #[inline]
  fn report_failure(&self, err: RxError) { (**self).report_failure(err) }

  #[inline]
  fn execution_model(&self) -> ExecutionModel { (**self).execution_model() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn batched_yields_every_batch() {
    let em = ExecutionModel::Batched(4);
    let mut idx = 0;
    let mut frames = vec![];
    for _ in 0..8 {
      idx = em.next_frame_index(idx);
      frames.push(idx);
    }
    assert_eq!(frames, vec![1, 2, 3, 0, 1, 2, 3, 0]);
  }

  #[test]
  fn batch_size_rounds_to_power_of_two() {
    assert_eq!(ExecutionModel::Batched(5).batch_size(), 8);
    assert_eq!(ExecutionModel::Batched(0).batch_size(), 1);
    assert_eq!(ExecutionModel::Batched(0).next_frame_index(7), 0);
  }

  #[test]
  fn synchronous_and_async_extremes() {
    assert_eq!(ExecutionModel::Synchronous.next_frame_index(usize::MAX - 1), 1);
    assert_eq!(ExecutionModel::AlwaysAsync.next_frame_index(0), 0);
  }
}
