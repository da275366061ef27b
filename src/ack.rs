//! Acknowledgment protocol
//!
//! Every `on_next` returns an [`Ack`]. A producer must not send the next item
//! before the previous ack settled to [`Signal::Continue`]; a [`Signal::Stop`]
//! tells it to stop producing and release its resources.
//!
//! An ack is either already settled (`Ack::Continue` / `Ack::Stop`) or an
//! [`AsyncAck`]: a single-assignment cell that runs its continuations exactly
//! once, on the thread that resolves it.

use std::{
  fmt,
  future::Future,
  pin::Pin,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  },
  task::{Context, Poll, Waker},
};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{error::RxError, scheduler::SharedScheduler};

mod promise_counter;
pub use promise_counter::PromiseCounter;

// ==================== Signal ====================

/// The settled value of an acknowledgment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
  /// The consumer is ready for the next item.
  Continue,
  /// The consumer wants no more items.
  Stop,
}

// ==================== Ack ====================

/// The value returned by [`Observer::on_next`](crate::observer::Observer).
#[derive(Clone, Debug)]
pub enum Ack {
  Continue,
  Stop,
  /// Settles later, possibly on another thread.
  Pending(AsyncAck),
}

impl Ack {
  /// The settled value, if known. A pending ack that already resolved reports
  /// its value, so fast loops can keep going synchronously.
  pub fn settled(&self) -> Option<Signal> {
    match self {
      Ack::Continue => Some(Signal::Continue),
      Ack::Stop => Some(Signal::Stop),
      Ack::Pending(ack) => ack.settled(),
    }
  }

  #[inline]
  pub fn is_continue(&self) -> bool { self.settled() == Some(Signal::Continue) }

  #[inline]
  pub fn is_stop(&self) -> bool { self.settled() == Some(Signal::Stop) }

  /// Register a continuation. Runs immediately when the ack is settled,
  /// otherwise on the thread that resolves it.
  pub fn on_settled<F>(&self, f: F)
  where
    F: FnOnce(Signal) + Send + 'static,
  {
    match self {
      Ack::Continue => f(Signal::Continue),
      Ack::Stop => f(Signal::Stop),
      Ack::Pending(ack) => ack.on_settled(f),
    }
  }

  /// Like [`Ack::on_settled`], but the continuation is submitted to
  /// `scheduler` instead of running on the resolving thread.
  pub fn on_settled_scheduled<F>(&self, scheduler: &SharedScheduler, f: F)
  where
    F: FnOnce(Signal) + Send + 'static,
  {
    let scheduler = scheduler.clone();
    self.on_settled(move |signal| scheduler.schedule(Box::new(move || f(signal))));
  }

  /// `Stop` if either side is or becomes `Stop`, `Continue` once both are
  /// `Continue`. Settled sides are evaluated eagerly.
  pub fn merge(self, other: Ack) -> Ack {
    match (self.settled(), other.settled()) {
      (Some(Signal::Stop), _) | (_, Some(Signal::Stop)) => Ack::Stop,
      (Some(Signal::Continue), Some(Signal::Continue)) => Ack::Continue,
      (Some(Signal::Continue), None) => other,
      (None, Some(Signal::Continue)) => self,
      (None, None) => {
        let out = AsyncAck::new();
        let remaining = Arc::new(AtomicUsize::new(2));
        for ack in [self, other] {
          let out = out.clone();
          let remaining = remaining.clone();
          ack.on_settled(move |signal| match signal {
            Signal::Stop => {
              out.try_resolve(Signal::Stop).ok();
            }
            Signal::Continue => {
              if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                out.try_resolve(Signal::Continue).ok();
              }
            }
          });
        }
        Ack::Pending(out)
      }
    }
  }

  /// Forward this ack's eventual value to `out`.
  pub fn connect(self, out: AsyncAck) { self.on_settled(move |signal| out.resolve(signal)); }

  /// Forward to `out`, short-circuiting to `Stop` as soon as `other` stops.
  ///
  /// When `other` is already `Continue` this is a plain [`Ack::connect`];
  /// otherwise both acks are merged.
  pub fn connect_merged(self, other: Ack, out: AsyncAck) {
    match other.settled() {
      Some(Signal::Stop) => out.resolve(Signal::Stop),
      Some(Signal::Continue) => self.connect(out),
      None => self.merge(other).connect(out),
    }
  }
}

impl From<Signal> for Ack {
  fn from(signal: Signal) -> Self {
    match signal {
      Signal::Continue => Ack::Continue,
      Signal::Stop => Ack::Stop,
    }
  }
}

impl From<AsyncAck> for Ack {
  fn from(ack: AsyncAck) -> Self { Ack::Pending(ack) }
}

// ==================== AsyncAck ====================

type Continuation = Box<dyn FnOnce(Signal) + Send>;

enum AckState {
  Pending { continuations: SmallVec<[Continuation; 1]>, wakers: SmallVec<[Waker; 1]> },
  Settled(Signal),
}

/// A single-assignment acknowledgment.
///
/// Clones share the same cell. It can also be awaited as a
/// `Future<Output = Signal>`.
#[derive(Clone)]
pub struct AsyncAck(Arc<Mutex<AckState>>);

impl AsyncAck {
  pub fn new() -> Self {
    AsyncAck(Arc::new(Mutex::new(AckState::Pending {
      continuations: SmallVec::new(),
      wakers: SmallVec::new(),
    })))
  }

  pub fn settled(&self) -> Option<Signal> {
    match &*self.0.lock() {
      AckState::Settled(signal) => Some(*signal),
      AckState::Pending { .. } => None,
    }
  }

  /// Settle the ack and run every registered continuation.
  ///
  /// Fails with [`RxError::Protocol`] when the ack was already settled; the
  /// first value is kept.
  pub fn try_resolve(&self, signal: Signal) -> Result<(), RxError> {
    let (continuations, wakers) = {
      let mut state = self.0.lock();
      match &mut *state {
        AckState::Settled(_) => return Err(RxError::Protocol("acknowledgment resolved twice")),
        AckState::Pending { continuations, wakers } => {
          let taken = (std::mem::take(continuations), std::mem::take(wakers));
          *state = AckState::Settled(signal);
          taken
        }
      }
    };
    wakers.into_iter().for_each(Waker::wake);
    for continuation in continuations {
      continuation(signal);
    }
    Ok(())
  }

  /// Settle the ack. A second resolution is logged and ignored.
  pub fn resolve(&self, signal: Signal) {
    if let Err(err) = self.try_resolve(signal) {
      tracing::error!(%err, ?signal, "ignoring acknowledgment resolution");
    }
  }

  /// Register a continuation; runs immediately if the ack is already settled.
  pub fn on_settled<F>(&self, f: F)
  where
    F: FnOnce(Signal) + Send + 'static,
  {
    let signal = {
      let mut state = self.0.lock();
      match &mut *state {
        AckState::Settled(signal) => *signal,
        AckState::Pending { continuations, .. } => {
          continuations.push(Box::new(f));
          return;
        }
      }
    };
    f(signal);
  }

  #[inline]
  pub fn ptr_eq(&self, other: &AsyncAck) -> bool { Arc::ptr_eq(&self.0, &other.0) }
}

impl Default for AsyncAck {
  fn default() -> Self { Self::new() }
}

impl fmt::Debug for AsyncAck {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("AsyncAck").field(&self.settled()).finish()
  }
}

impl Future for AsyncAck {
  type Output = Signal;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Signal> {
    let mut state = self.0.lock();
    match &mut *state {
      AckState::Settled(signal) => Poll::Ready(*signal),
      AckState::Pending { wakers, .. } => {
        if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
          wakers.push(cx.waker().clone());
        }
        Poll::Pending
      }
    }
  }
}

// ==================== Tests ====================
