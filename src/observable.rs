//! The subscribe side of the reactive seam and the marble sources.
//!
//! Anything that can hand notifications to an [`Observer`] implements
//! [`Observable`]; the harness only ever subscribes through it, so streams
//! from any reactive library can be tested by implementing it (or wrapping
//! them in [`create`]).

use crate::{observer::Observer, subscription::Subscription};

pub mod cold;
pub mod create;
pub mod hot;

pub use cold::{ColdObservable, ColdSubscription};
pub use create::{create, Create};
pub use hot::{HotObservable, HotSubscription};

pub trait Observable<Item, Err>: Sized {
  type Unsub: Subscription + 'static;

  fn actual_subscribe<O>(self, observer: O) -> Self::Unsub
  where
    O: Observer<Item, Err> + 'static;
}
