//! Error type carried by `on_error` notifications.
//!
//! Errors travel through the pipeline by value and are replayed by subjects to
//! late subscribers, so the type is cheap to clone.

use std::{error::Error, fmt, sync::Arc};

/// The error delivered to [`Observer::on_error`](crate::observer::Observer).
#[derive(Clone, thiserror::Error)]
pub enum RxError {
  /// An error raised by user code, described by a message.
  #[error("{0}")]
  Message(Arc<str>),

  /// An error raised by user code, wrapping a concrete error value.
  #[error(transparent)]
  Source(Arc<dyn Error + Send + Sync>),

  /// A component broke the observer or acknowledgment protocol.
  #[error("protocol violation: {0}")]
  Protocol(&'static str),
}

impl RxError {
  /// Build an error from a message.
  pub fn msg(message: impl Into<String>) -> Self { RxError::Message(message.into().into()) }

  /// Wrap an arbitrary error value.
  pub fn from_error<E: Error + Send + Sync + 'static>(err: E) -> Self {
    RxError::Source(Arc::new(err))
  }

  #[inline]
  pub fn is_protocol_violation(&self) -> bool { matches!(self, RxError::Protocol(_)) }
}

impl fmt::Debug for RxError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RxError::Message(msg) => f.debug_tuple("Message").field(msg).finish(),
      RxError::Source(err) => f.debug_tuple("Source").field(&err.to_string()).finish(),
      RxError::Protocol(what) => f.debug_tuple("Protocol").field(what).finish(),
    }
  }
}

impl PartialEq for RxError {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (RxError::Message(a), RxError::Message(b)) => a == b,
      (RxError::Source(a), RxError::Source(b)) => Arc::ptr_eq(a, b),
      (RxError::Protocol(a), RxError::Protocol(b)) => a == b,
      _ => false,
    }
  }
}
