use tokio::runtime::Handle;

use super::{ExecutionModel, Scheduler, Task};

/// Runs every task on a tokio runtime.
#[derive(Clone)]
pub struct TokioScheduler {
  handle: Handle,
  execution_model: ExecutionModel,
}

impl TokioScheduler {
  /// Bind to the runtime the caller is running in.
  ///
  /// # Panics
  ///
  /// Panics when called outside a tokio runtime.
  pub fn current() -> Self { Self::from_handle(Handle::current()) }

  pub fn from_handle(handle: Handle) -> Self {
    TokioScheduler { handle, execution_model: ExecutionModel::default() }
  }

  pub fn with_execution_model(mut self, execution_model: ExecutionModel) -> Self {
    self.execution_model = execution_model;
    self
  }
}

impl Scheduler for TokioScheduler {
  fn schedule(&self, task: Task) {
    self.handle.spawn(async move { task() });
  }

  fn execution_model(&self) -> ExecutionModel { self.execution_model }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(flavor = "multi_thread")]
  async fn runs_on_runtime() {
    let scheduler = TokioScheduler::current();
    let (tx, rx) = tokio::sync::oneshot::channel();
    scheduler.schedule(Box::new(move || {
      tx.send(42).ok();
    }));
    assert_eq!(rx.await.unwrap(), 42);
  }
}
