//! Subjects: observers that multicast to their own subscribers.
//!
//! A subject is fed through its [`Observer`] side and subscribed to through
//! its [`Observable`](crate::observable::Observable) side. Clones share the
//! same state, so one clone can be handed to the upstream while others are
//! subscribed to.
//!
//! - [`PublishSubject`]: live fan-out, the slowest pending subscriber paces
//!   the upstream.
//! - [`ReplaySubject`]: like `PublishSubject`, and late subscribers first
//!   receive every item seen so far.
//! - [`CachedServeFirstSubject`]: the fastest subscriber paces the upstream,
//!   slower ones read from a shared buffer.

use crate::{error::RxError, observer::Observer};

mod cached_serve_first_subject;
mod connectable_observer;
mod cow_state;
mod publish_subject;
mod replay_subject;

pub use cached_serve_first_subject::CachedServeFirstSubject;
pub(crate) use connectable_observer::ConnectableObserver;
pub use publish_subject::PublishSubject;
pub use replay_subject::ReplaySubject;

/// How a subject terminated. Kept to answer late subscribers.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Terminal {
  Completed,
  Errored(RxError),
}

impl Terminal {
  pub(crate) fn deliver_to<Item>(&self, observer: &dyn Observer<Item>) {
    match self {
      Terminal::Completed => observer.on_completed(),
      Terminal::Errored(err) => observer.on_error(err.clone()),
    }
  }
}
