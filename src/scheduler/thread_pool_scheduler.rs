use futures::executor::ThreadPool;

use super::{ExecutionModel, Scheduler, Task};
use crate::error::RxError;

/// Runs every task on a `futures` thread pool.
#[derive(Clone)]
pub struct ThreadPoolScheduler {
  pool: ThreadPool,
  execution_model: ExecutionModel,
}

impl ThreadPoolScheduler {
  pub fn new() -> Result<Self, RxError> {
    let pool = ThreadPool::new().map_err(RxError::from_error)?;
    Ok(Self::from_pool(pool))
  }

  pub fn from_pool(pool: ThreadPool) -> Self {
    ThreadPoolScheduler { pool, execution_model: ExecutionModel::default() }
  }

  pub fn with_execution_model(mut self, execution_model: ExecutionModel) -> Self {
    self.execution_model = execution_model;
    self
  }
}

impl Scheduler for ThreadPoolScheduler {
  fn schedule(&self, task: Task) { self.pool.spawn_ok(async move { task() }); }

  fn execution_model(&self) -> ExecutionModel { self.execution_model }
}
